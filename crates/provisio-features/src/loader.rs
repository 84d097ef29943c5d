//! Directory-backed artifact loader
//!
//! Installs an artifact by copying the file its locator points at into a
//! deploy directory. The handle is the file name inside that directory.
//! Refresh requests are appended to `<deploy>/.refresh`, one line per call,
//! for whatever runtime watches the directory.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use provisio_core::types::{ArtifactHandle, ArtifactRef};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::source::locator_to_path;
use crate::traits::ArtifactLoader;

/// Marker file receiving refresh requests
pub const REFRESH_FILE: &str = ".refresh";

/// Copies artifacts into a deploy directory
#[derive(Debug, Clone)]
pub struct DirectoryArtifactLoader {
    deploy_dir: Utf8PathBuf,
}

impl DirectoryArtifactLoader {
    pub fn new(deploy_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            deploy_dir: deploy_dir.into(),
        }
    }

    /// Deploy directory
    pub fn deploy_dir(&self) -> &Utf8Path {
        &self.deploy_dir
    }

    fn target(&self, handle: &ArtifactHandle) -> Utf8PathBuf {
        self.deploy_dir.join(handle.as_str())
    }
}

#[async_trait]
impl ArtifactLoader for DirectoryArtifactLoader {
    async fn install_or_update(&self, artifact: &ArtifactRef) -> Result<ArtifactHandle> {
        let source = locator_to_path(&artifact.locator)?;
        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow!("Locator has no file name: {}", artifact.locator))?;
        let handle = ArtifactHandle::new(file_name);

        tokio::fs::create_dir_all(&self.deploy_dir)
            .await
            .with_context(|| format!("Failed to create deploy directory {}", self.deploy_dir))?;

        let target = self.target(&handle);
        tokio::fs::copy(&source, &target)
            .await
            .with_context(|| format!("Failed to copy {} to {}", source, target))?;

        debug!("Deployed {} as {}", artifact.locator, handle);
        Ok(handle)
    }

    async fn uninstall(&self, handle: &ArtifactHandle) -> Result<()> {
        let target = self.target(handle);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!("Removed {}", target);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", target)),
        }
    }

    async fn refresh(&self, handles: &[ArtifactHandle]) -> Result<()> {
        tokio::fs::create_dir_all(&self.deploy_dir)
            .await
            .with_context(|| format!("Failed to create deploy directory {}", self.deploy_dir))?;

        let names: Vec<&str> = handles.iter().map(ArtifactHandle::as_str).collect();
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), names.join(" "));

        let path = self.deploy_dir.join(REFRESH_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path))?;
        file.flush().await?;
        Ok(())
    }

    async fn is_installed(&self, handle: &ArtifactHandle) -> bool {
        tokio::fs::try_exists(self.target(handle))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_install_refresh_uninstall() {
        let temp = TempDir::new().unwrap();
        let root = utf8(&temp);
        let bundle = root.join("sshd.jar");
        std::fs::write(&bundle, b"bundle").unwrap();

        let loader = DirectoryArtifactLoader::new(root.join("deploy"));
        let handle = loader
            .install_or_update(&ArtifactRef::new(bundle.as_str()))
            .await
            .unwrap();
        assert_eq!(handle.as_str(), "sshd.jar");
        assert!(loader.is_installed(&handle).await);

        loader.refresh(std::slice::from_ref(&handle)).await.unwrap();
        let refresh = std::fs::read_to_string(root.join("deploy").join(REFRESH_FILE)).unwrap();
        assert!(refresh.trim_end().ends_with("sshd.jar"));

        loader.uninstall(&handle).await.unwrap();
        assert!(!loader.is_installed(&handle).await);

        // Already gone
        loader.uninstall(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let loader = DirectoryArtifactLoader::new(utf8(&temp).join("deploy"));
        let err = loader
            .install_or_update(&ArtifactRef::new("/nonexistent/a.jar"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to copy"));
    }
}
