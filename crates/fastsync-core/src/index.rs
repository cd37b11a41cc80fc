//! Manifest generation from a local directory tree

use crate::engine::hash_file;
use crate::error::SyncError;
use fastsync_types::{Manifest, ManifestEntry};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

/// Hash every regular file below `root` into a manifest served from `server`.
///
/// Entry paths use `/` separators with a leading `/` and are sorted.
/// Symlinks and files whose names are not UTF-8 are left out.
pub async fn build_manifest(root: &Path, server: Url) -> Result<Manifest, SyncError> {
    let mut manifest = Manifest::new(server);
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                debug!("Skipping {} (not a regular file)", path.display());
                continue;
            }

            let Some(manifest_path) = manifest_path(root, &path) else {
                warn!("Skipping {} (name is not valid UTF-8)", path.display());
                continue;
            };

            let checksum = hash_file(&path).await?;
            debug!("Indexed {} ({})", manifest_path, checksum);
            manifest.files.push(ManifestEntry::new(manifest_path, checksum));
        }
    }

    manifest.files.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Indexed {} files under {}", manifest.len(), root.display());

    Ok(manifest)
}

fn manifest_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(component.as_os_str().to_str()?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalize_entry_path;

    #[tokio::test]
    async fn test_indexes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        tokio::fs::create_dir_all(root.join("mods/@cba/addons"))
            .await
            .unwrap();
        tokio::fs::write(root.join("mods/a.pbo"), b"hello").await.unwrap();
        tokio::fs::write(root.join("mods/@cba/addons/b.pbo"), b"")
            .await
            .unwrap();

        let manifest = build_manifest(root, "http://x/".parse().unwrap())
            .await
            .unwrap();

        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["/mods/@cba/addons/b.pbo", "/mods/a.pbo"]);
        assert_eq!(
            manifest.files[1].checksum.as_str(),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(
            manifest.files[0].checksum.as_str(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[tokio::test]
    async fn test_indexed_paths_resolve_back_into_the_root() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("x")).await.unwrap();
        tokio::fs::write(dir.path().join("x/y.bin"), b"1").await.unwrap();

        let manifest = build_manifest(dir.path(), "http://x/".parse().unwrap())
            .await
            .unwrap();
        let relative = normalize_entry_path(&manifest.files[0].path).unwrap();
        assert_eq!(dir.path().join(relative), dir.path().join("x/y.bin"));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = build_manifest(dir.path(), "http://x/".parse().unwrap())
            .await
            .unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.version, 1);
    }
}
