//! Storage layer for manifest and configuration files (JSON)

use crate::error::SyncError;
use fastsync_types::{Config, Manifest};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs;

/// Load a sync manifest
pub async fn load_manifest(path: &Path) -> Result<Manifest, SyncError> {
    load_json(path).await
}

/// Load the local configuration
pub async fn load_config(path: &Path) -> Result<Config, SyncError> {
    let config: Config = load_json(path).await?;
    if config.armapath.as_os_str().is_empty() {
        return Err(config_error(path, "armapath must not be empty"));
    }
    Ok(config)
}

/// Write a manifest as pretty JSON, creating parent directories
pub async fn save_manifest(path: &Path, manifest: &Manifest) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(manifest)
        .map_err(|e| config_error(path, e.to_string()))?;
    fs::write(path, content).await?;

    Ok(())
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, SyncError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| config_error(path, e.to_string()))?;

    serde_json::from_str(&content).map_err(|e| config_error(path, e.to_string()))
}

fn config_error(path: &Path, message: impl Into<String>) -> SyncError {
    SyncError::Config {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastsync_types::{FailureKind, ManifestEntry};

    #[tokio::test]
    async fn test_manifest_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync").join("default.a3sync");

        let mut manifest = Manifest::new("http://x/".parse().unwrap());
        manifest.files.push(ManifestEntry::new(
            "/mods/a.pbo",
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".parse().unwrap(),
        ));
        save_manifest(&path, &manifest).await.unwrap();

        let loaded = load_manifest(&path).await.unwrap();
        assert_eq!(loaded.files, manifest.files);
        assert_eq!(loaded.server, manifest.server);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config);
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, r#"{"version": 1, "server": "not a url", "files": []}"#)
            .await
            .unwrap();

        let err = load_manifest(&path).await.unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[tokio::test]
    async fn test_config_requires_armapath() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        tokio::fs::write(&path, r#"{"armapath": ""}"#).await.unwrap();
        assert!(load_config(&path).await.is_err());

        tokio::fs::write(&path, r#"{"armapath": "/games/arma3"}"#)
            .await
            .unwrap();
        let config = load_config(&path).await.unwrap();
        assert_eq!(config.armapath, Path::new("/games/arma3"));
    }
}
