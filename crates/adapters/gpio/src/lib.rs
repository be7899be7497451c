//! # relayhub-adapter-gpio
//!
//! [`PinIo`](relayhub_app::ports::PinIo) backends.
//!
//! | Backend | Type | Use |
//! |---------|------|-----|
//! | `simulated` | [`SimulatedPins`] | Development machines and tests; pins start HIGH |
//! | `sysfs` | [`SysfsPins`] | Linux boards exposing `/sys/class/gpio` |
//!
//! ## Dependency rule
//!
//! Depends on `relayhub-app` (port traits) and `relayhub-domain` only.

mod error;
mod simulated;
mod sysfs;

use serde::Deserialize;

pub use error::GpioError;
pub use simulated::SimulatedPins;
pub use sysfs::SysfsPins;

/// Which pin backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Simulated,
    Sysfs,
}

impl std::str::FromStr for Backend {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "sysfs" => Ok(Self::Sysfs),
            other => Err(GpioError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated => f.write_str("simulated"),
            Self::Sysfs => f.write_str("sysfs"),
        }
    }
}
