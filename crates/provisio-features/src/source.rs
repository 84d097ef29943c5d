//! File-backed repository descriptor source

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use provisio_core::types::RepositoryDescriptor;
use tracing::debug;
use url::Url;

use crate::traits::CatalogSource;

/// Map a locator (plain path or `file:` URL) to a filesystem path
pub(crate) fn locator_to_path(locator: &str) -> Result<Utf8PathBuf> {
    if let Some(rest) = locator.strip_prefix("file:") {
        // file:relative/path stays relative to the working directory
        if !rest.starts_with('/') {
            return Ok(Utf8PathBuf::from(rest));
        }
        let url = Url::parse(locator).with_context(|| format!("Invalid URL: {}", locator))?;
        let path = url
            .to_file_path()
            .map_err(|_| anyhow!("Not a local file URL: {}", locator))?;
        return Utf8PathBuf::from_path_buf(path)
            .map_err(|p| anyhow!("Non UTF-8 path: {}", p.display()));
    }

    if let Some((scheme, _)) = locator.split_once(':') {
        // Windows drive letters are single characters
        if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(anyhow!("Unsupported locator scheme '{}': {}", scheme, locator));
        }
    }

    Ok(Utf8PathBuf::from(locator))
}

/// Reads YAML repository descriptors from paths or `file:` URLs
#[derive(Debug, Clone, Default)]
pub struct FileCatalogSource;

impl FileCatalogSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self, uri: &str) -> Result<RepositoryDescriptor> {
        let path = locator_to_path(uri)?;
        debug!("Reading repository descriptor {}", path);

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read repository descriptor {}", path))?;
        let descriptor: RepositoryDescriptor = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse repository descriptor {}", path))?;
        Ok(descriptor)
    }

    fn resolve_reference(&self, base: &str, reference: &str) -> String {
        if base.starts_with("file:/") {
            if let Ok(joined) = Url::parse(base).and_then(|b| b.join(reference)) {
                return joined.to_string();
            }
            return reference.to_string();
        }

        if reference.contains(':') || Utf8Path::new(reference).is_absolute() {
            return reference.to_string();
        }

        let base_path = base.strip_prefix("file:").unwrap_or(base);
        match Utf8Path::new(base_path).parent() {
            Some(dir) if !dir.as_str().is_empty() => dir.join(reference).to_string(),
            _ => reference.to_string(),
        }
    }
}
