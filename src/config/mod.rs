//! Application Configuration
//!
//! User settings stored in TOML format: canvas dimensions, brush parameters,
//! and classifier asset locations.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::canvas::BrushState;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Drawing surface settings
    pub canvas: CanvasSettings,
    /// Brush parameters
    pub brush: BrushState,
    /// Classifier settings
    pub classifier: ClassifierSettings,
}

/// Drawing surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasSettings {
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
        }
    }
}

/// Classifier settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Path to a local ONNX model; when unset the cached download is used
    pub model_path: Option<PathBuf>,
    /// Path to a local label list; when unset the cached download is used
    pub labels_path: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
