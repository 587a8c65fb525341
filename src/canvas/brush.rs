//! Brush state for stroke compositing
//!
//! The brush is fixed for the duration of a stroke; it may only change
//! between strokes (enforced by the canvas, not here).

use image::Rgba;
use serde::{Deserialize, Serialize};

use super::CanvasError;

/// Pixel blend mode for stroke compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Source-over alpha blending
    #[default]
    Normal,
}

/// Visual parameters applied to every composited segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushState {
    /// Ink color as non-premultiplied RGBA
    pub ink_color: [u8; 4],
    /// Stroke width in device-independent pixels
    pub width: f32,
    /// Overall stroke transparency, baked in once at stroke end (0.0 - 1.0)
    pub opacity: f32,
    /// Blend mode for segment compositing
    pub blend_mode: BlendMode,
}

impl Default for BrushState {
    fn default() -> Self {
        Self {
            ink_color: [0, 0, 0, 255],
            width: 10.0,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
        }
    }
}

impl BrushState {
    /// Ink color as an `image` pixel
    pub fn color(&self) -> Rgba<u8> {
        Rgba(self.ink_color)
    }

    /// Check the brush invariants: width > 0, opacity in [0, 1]
    pub fn validate(&self) -> Result<(), CanvasError> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(CanvasError::InvalidBrush(format!(
                "brush width must be a positive number, got {}",
                self.width
            )));
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(CanvasError::InvalidBrush(format!(
                "brush opacity must be within [0, 1], got {}",
                self.opacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_brush_is_valid() {
        let brush = BrushState::default();
        assert!(brush.validate().is_ok());
        assert_eq!(brush.ink_color, [0, 0, 0, 255]);
        assert!((brush.width - 10.0).abs() < f32::EPSILON);
        assert!((brush.opacity - 1.0).abs() < f32::EPSILON);
        assert_eq!(brush.blend_mode, BlendMode::Normal);
    }

    #[test]
    fn test_rejects_non_positive_width() {
        let brush = BrushState {
            width: 0.0,
            ..Default::default()
        };
        assert!(brush.validate().is_err());

        let brush = BrushState {
            width: f32::NAN,
            ..Default::default()
        };
        assert!(brush.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_opacity() {
        let brush = BrushState {
            opacity: 1.5,
            ..Default::default()
        };
        assert!(brush.validate().is_err());

        let brush = BrushState {
            opacity: -0.1,
            ..Default::default()
        };
        assert!(brush.validate().is_err());
    }

    #[test]
    fn test_brush_serializes_through_toml() {
        let brush = BrushState {
            ink_color: [20, 30, 40, 255],
            width: 6.5,
            opacity: 0.8,
            blend_mode: BlendMode::Normal,
        };

        let serialized = toml::to_string(&brush).unwrap();
        let parsed: BrushState = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed, brush);
    }
}
