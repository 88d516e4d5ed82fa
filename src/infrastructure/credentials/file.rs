#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::CredentialStore;

const CREDENTIAL_KEY: &str = "gemini-api-key";

/// Persists the API key in a small TOML file. The file is read on every
/// lookup so edits made outside the app are picked up.
pub struct FileCredentialStore {
    path: path::PathBuf,
}

impl Default for FileCredentialStore {
    fn default() -> FileCredentialStore {
        return FileCredentialStore::new(path::PathBuf::from(Config::get(
            ConfigKey::CredentialFile,
        )));
    }
}

impl FileCredentialStore {
    pub fn new(path: path::PathBuf) -> FileCredentialStore {
        return FileCredentialStore { path };
    }

    pub fn path(&self) -> &path::Path {
        return &self.path;
    }

    async fn read(&self) -> Result<toml_edit::Document> {
        if !self.path.exists() {
            return Ok(toml_edit::Document::new());
        }

        let toml_str = fs::read_to_string(&self.path).await?;
        return Ok(toml_str.parse::<toml_edit::Document>()?);
    }

    async fn write(&self, doc: &toml_edit::Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        fs::write(&self.path, doc.to_string()).await?;
        return Ok(());
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[allow(clippy::implicit_return)]
    async fn get(&self) -> Result<Option<String>> {
        let doc = self.read().await?;
        let value = doc
            .get(CREDENTIAL_KEY)
            .and_then(|item| return item.as_str())
            .map(|value| return value.trim().to_string())
            .filter(|value| return !value.is_empty());

        return Ok(value);
    }

    #[allow(clippy::implicit_return)]
    async fn set(&self, value: &str) -> Result<()> {
        let mut doc = self.read().await?;
        doc[CREDENTIAL_KEY] = toml_edit::value(value.trim());
        self.write(&doc).await?;

        tracing::debug!(path = ?self.path, "Saved credential");
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let mut doc = self.read().await?;
        doc.remove(CREDENTIAL_KEY);
        self.write(&doc).await?;

        tracing::debug!(path = ?self.path, "Cleared credential");
        return Ok(());
    }
}
