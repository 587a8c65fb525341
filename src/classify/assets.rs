//! Classifier asset management
//!
//! Downloads and caches the pretrained shape classifier and its label list
//! under the platform data directory, so first run works without any manual
//! setup. A JSON manifest records what was fetched and its digest.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Environment variable that disables all downloads
const OFFLINE_ENV: &str = "SHAPESKETCH_OFFLINE";

/// Files the classifier needs on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// The ONNX classifier network
    Network,
    /// Label list, one label per line
    Labels,
}

impl AssetKind {
    pub fn filename(&self) -> &'static str {
        match self {
            AssetKind::Network => "shapes.onnx",
            AssetKind::Labels => "labels.txt",
        }
    }

    pub fn download_url(&self) -> &'static str {
        match self {
            AssetKind::Network => {
                "https://huggingface.co/shapesketch/shape-classifier-onnx/resolve/main/shapes.onnx"
            }
            AssetKind::Labels => {
                "https://huggingface.co/shapesketch/shape-classifier-onnx/resolve/main/labels.txt"
            }
        }
    }

    /// Size sanity bounds in bytes; files outside this range are treated as
    /// corrupt partial downloads.
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            AssetKind::Network => (100_000, 200_000_000),
            AssetKind::Labels => (4, 10_000),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AssetKind::Network => "Shape Classifier",
            AssetKind::Labels => "Label List",
        }
    }
}

/// Manifest of fetched assets
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AssetManifest {
    pub entries: Vec<AssetRecord>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AssetRecord {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Unix timestamp of the download
    pub downloaded_at: u64,
}

/// Cache-or-download store for classifier assets
pub struct AssetStore {
    assets_dir: PathBuf,
}

impl AssetStore {
    /// Store rooted at the platform data directory
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    /// Store rooted at a custom directory
    pub fn with_dir(assets_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&assets_dir)?;
        Ok(Self { assets_dir })
    }

    pub fn asset_path(&self, kind: AssetKind) -> PathBuf {
        self.assets_dir.join(kind.filename())
    }

    /// Whether the asset exists on disk with a plausible size
    pub fn is_available(&self, kind: AssetKind) -> bool {
        let path = self.asset_path(kind);
        match std::fs::metadata(&path) {
            Ok(metadata) => {
                let (min, max) = kind.expected_size_range();
                (min..=max).contains(&metadata.len())
            }
            Err(_) => false,
        }
    }

    /// Whether everything the classifier needs is cached
    pub fn is_ready(&self) -> bool {
        self.is_available(AssetKind::Network) && self.is_available(AssetKind::Labels)
    }

    /// Return the on-disk path for an asset, downloading it first if missing.
    pub fn ensure(&self, kind: AssetKind) -> Result<PathBuf> {
        let path = self.asset_path(kind);
        if self.is_available(kind) {
            debug!("{} already cached at {:?}", kind.display_name(), path);
            return Ok(path);
        }

        if std::env::var(OFFLINE_ENV).is_ok() {
            anyhow::bail!(
                "Offline mode: {} is not cached. Download it from {} and place it at {:?}",
                kind.display_name(),
                kind.download_url(),
                path
            );
        }

        info!(
            "Downloading {} from {}",
            kind.display_name(),
            kind.download_url()
        );

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let digest = rt.block_on(download_file(kind.download_url(), &path))?;

        if !self.is_available(kind) {
            anyhow::bail!(
                "Downloaded {} failed the size sanity check",
                kind.display_name()
            );
        }
        self.record(kind, &digest)?;

        info!("{} cached at {:?}", kind.display_name(), path);
        Ok(path)
    }

    /// Load the asset manifest (empty if none exists yet)
    pub fn load_manifest(&self) -> Result<AssetManifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(AssetManifest::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn manifest_path(&self) -> PathBuf {
        self.assets_dir.join("manifest.json")
    }

    fn record(&self, kind: AssetKind, digest: &str) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        let metadata = std::fs::metadata(self.asset_path(kind))?;

        let record = AssetRecord {
            filename: kind.filename().to_string(),
            size_bytes: metadata.len(),
            sha256: digest.to_string(),
            downloaded_at: unix_timestamp_now(),
        };

        if let Some(existing) = manifest
            .entries
            .iter_mut()
            .find(|entry| entry.filename == record.filename)
        {
            *existing = record;
        } else {
            manifest.entries.push(record);
        }

        let content = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(self.manifest_path(), content)?;
        Ok(())
    }
}

/// Stream a URL to disk via a temp file, returning the SHA-256 hex digest.
async fn download_file(url: &str, path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let temp_path = path.with_extension("tmp");
    let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;
    let mut hasher = Sha256::new();

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write chunk")?;
        hasher.update(&chunk);
    }
    file.flush()?;
    drop(file);

    std::fs::rename(&temp_path, path).context("Failed to move download into place")?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn unix_timestamp_now() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_asset_filenames() {
        assert_eq!(AssetKind::Network.filename(), "shapes.onnx");
        assert_eq!(AssetKind::Labels.filename(), "labels.txt");
    }

    #[test]
    fn test_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::with_dir(dir.path().to_path_buf()).unwrap();

        assert!(!store.is_available(AssetKind::Network));
        assert!(!store.is_ready());
        assert!(store.load_manifest().unwrap().entries.is_empty());
    }

    #[test]
    fn test_availability_enforces_size_bounds() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::with_dir(dir.path().to_path_buf()).unwrap();

        // A few bytes cannot be a real network
        std::fs::write(store.asset_path(AssetKind::Network), b"stub").unwrap();
        assert!(!store.is_available(AssetKind::Network));

        std::fs::write(store.asset_path(AssetKind::Labels), b"circle\nsquare\n").unwrap();
        assert!(store.is_available(AssetKind::Labels));
    }

    #[test]
    fn test_cached_asset_is_returned_without_download() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::with_dir(dir.path().to_path_buf()).unwrap();
        std::fs::write(store.asset_path(AssetKind::Labels), b"circle\n").unwrap();

        let path = store.ensure(AssetKind::Labels).unwrap();
        assert_eq!(path, store.asset_path(AssetKind::Labels));
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::with_dir(dir.path().to_path_buf()).unwrap();
        std::fs::write(store.asset_path(AssetKind::Labels), b"circle\n").unwrap();

        store.record(AssetKind::Labels, "deadbeef").unwrap();

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].filename, "labels.txt");
        assert_eq!(manifest.entries[0].sha256, "deadbeef");
    }
}
