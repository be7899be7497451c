//! # relayhub-adapter-storage-json
//!
//! JSON file storage for relayhub.
//!
//! ## Responsibilities
//! - Implement [`ConfigStore`](relayhub_app::ports::ConfigStore) over
//!   `config.json`, replacing the file atomically on every save
//! - Load the read-only pin-mapping table (`gpio_mapping.json`) at startup
//!
//! ## Dependency rule
//! Depends on `relayhub-app` (port traits) and `relayhub-domain` only.

mod config_store;
mod error;
mod pin_mapping;

pub use config_store::JsonConfigStore;
pub use error::JsonStoreError;
pub use pin_mapping::load_pin_mapping;
