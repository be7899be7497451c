//! Configuration store port — durable home of the [`AgentConfig`].

use std::future::Future;

use relayhub_domain::config::{AgentConfig, StoredConfig};
use relayhub_domain::error::RelayError;

/// Loads and persists the agent configuration as a whole.
pub trait ConfigStore {
    /// Read the stored configuration, or `None` when nothing was saved yet.
    fn load(&self) -> impl Future<Output = Result<Option<StoredConfig>, RelayError>> + Send;

    /// Replace the stored configuration.
    ///
    /// Implementations must make the write atomic: a crash leaves either the
    /// previous or the new configuration, never a partial one.
    fn save(&self, config: &AgentConfig) -> impl Future<Output = Result<(), RelayError>> + Send;
}
