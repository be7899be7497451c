//! [`ConfigStore`] over a single JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use relayhub_app::ports::ConfigStore;
use relayhub_domain::config::{AgentConfig, StoredConfig};
use relayhub_domain::error::RelayError;

use crate::error::JsonStoreError;

/// Configuration persisted as pretty-printed JSON.
///
/// Saves go to a sibling `.tmp` file which is flushed to disk and then
/// renamed over the target, so readers see either the old or the new file.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> JsonStoreError + '_ {
        move |source| JsonStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn read(&self) -> Result<Option<StoredConfig>, JsonStoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Self::io_error(&self.path)(err)),
        };
        let config = serde_json::from_slice(&raw).map_err(|source| JsonStoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(config))
    }

    async fn write(&self, config: &AgentConfig) -> Result<(), JsonStoreError> {
        let body = serde_json::to_vec_pretty(config)?;
        let tmp = self.tmp_path();

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(Self::io_error(&tmp))?;
        file.write_all(&body).await.map_err(Self::io_error(&tmp))?;
        file.sync_all().await.map_err(Self::io_error(&tmp))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(Self::io_error(&self.path))
    }
}

impl ConfigStore for JsonConfigStore {
    async fn load(&self) -> Result<Option<StoredConfig>, RelayError> {
        let config = self.read().await?;
        tracing::debug!(path = %self.path.display(), found = config.is_some(), "configuration read");
        Ok(config)
    }

    async fn save(&self, config: &AgentConfig) -> Result<(), RelayError> {
        self.write(config).await?;
        tracing::info!(
            path = %self.path.display(),
            devices = config.devices.len(),
            "configuration saved"
        );
        Ok(())
    }
}
