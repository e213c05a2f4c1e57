//! Staging folder upload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub destination: PathBuf,
    pub uploaded: usize,
    /// Files already present with identical content.
    pub skipped: usize,
}

/// Delivers the staged listing folder somewhere reviewers can reach it.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, staging_dir: &Path) -> anyhow::Result<UploadSummary>;
}

/// Mirrors the staging folder into `<root>/<package id>/`.
///
/// The package folder is reused when it exists. Files whose SHA-256 matches
/// the destination copy are left alone.
#[derive(Debug, Clone)]
pub struct FolderUploader {
    root: PathBuf,
    package_id: String,
}

impl FolderUploader {
    pub fn new(root: impl Into<PathBuf>, package_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            package_id: package_id.into(),
        }
    }

    pub fn destination(&self) -> PathBuf {
        self.root.join(&self.package_id)
    }
}

async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[async_trait]
impl Uploader for FolderUploader {
    async fn upload(&self, staging_dir: &Path) -> anyhow::Result<UploadSummary> {
        if !staging_dir.is_dir() {
            anyhow::bail!(
                "staging folder {} not found, stage the listing first",
                staging_dir.display()
            );
        }

        let destination = self.destination();
        if destination.is_dir() {
            info!(destination = %destination.display(), "reusing upload folder");
        } else {
            tokio::fs::create_dir_all(&destination).await?;
            info!(destination = %destination.display(), "created upload folder");
        }

        let mut summary = UploadSummary {
            destination: destination.clone(),
            ..UploadSummary::default()
        };

        let mut entries = tokio::fs::read_dir(staging_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let source = entry.path();
            let target = destination.join(entry.file_name());

            if target.is_file() && sha256_file(&source).await? == sha256_file(&target).await? {
                debug!(file = %target.display(), "unchanged, skipping");
                summary.skipped += 1;
                continue;
            }

            tokio::fs::copy(&source, &target).await?;
            debug!(file = %target.display(), "uploaded");
            summary.uploaded += 1;
        }

        info!(
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            destination = %destination.display(),
            "upload finished"
        );
        Ok(summary)
    }
}

/// Stand-in used when upload is enabled but no destination is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredUploader;

#[async_trait]
impl Uploader for UnconfiguredUploader {
    async fn upload(&self, _staging_dir: &Path) -> anyhow::Result<UploadSummary> {
        anyhow::bail!("upload enabled but no upload destination is configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mirror_then_skip_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("StoreListing");
        std::fs::create_dir_all(staging.join("nested")).unwrap();
        std::fs::write(staging.join("icon_512x512.png"), b"icon").unwrap();
        std::fs::write(staging.join("info.txt"), b"notes").unwrap();

        let uploader = FolderUploader::new(dir.path().join("remote"), "com.acme.game");
        let first = uploader.upload(&staging).await.unwrap();
        assert_eq!(first.uploaded, 2);
        assert_eq!(first.skipped, 0);
        assert_eq!(
            std::fs::read(dir.path().join("remote/com.acme.game/info.txt")).unwrap(),
            b"notes"
        );

        std::fs::write(staging.join("info.txt"), b"new notes").unwrap();
        let second = uploader.upload(&staging).await.unwrap();
        assert_eq!(second.uploaded, 1);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn test_missing_staging_folder() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = FolderUploader::new(dir.path(), "com.acme.game");
        let err = uploader.upload(&dir.path().join("absent")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_unconfigured_uploader_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(UnconfiguredUploader.upload(dir.path()).await.is_err());
    }
}
