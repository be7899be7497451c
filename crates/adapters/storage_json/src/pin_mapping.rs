//! Loader for the provisioned device-number → pin table.

use std::path::Path;

use relayhub_domain::config::PinMapping;

use crate::error::JsonStoreError;

/// Read `gpio_mapping.json`.
///
/// The table is required: the agent cannot place any device without it.
///
/// # Errors
///
/// Returns [`JsonStoreError::Io`] if the file cannot be read, or
/// [`JsonStoreError::Parse`] if it lacks `active_low` or `device_pin_map`.
pub fn load_pin_mapping(path: &Path) -> Result<PinMapping, JsonStoreError> {
    let raw = std::fs::read(path).map_err(|source| JsonStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mapping: PinMapping =
        serde_json::from_slice(&raw).map_err(|source| JsonStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::info!(
        path = %path.display(),
        pins = mapping.gpio_count(),
        active_low = mapping.active_low,
        "pin mapping loaded"
    );
    Ok(mapping)
}
