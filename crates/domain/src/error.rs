//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`RelayError`]
//! via `#[from]` (or an explicit `From` impl for adapter errors, which land
//! in [`RelayError::Storage`] / [`RelayError::Transport`]).

use std::error::Error as StdError;

use crate::device::DeviceMode;
use crate::id::{DeviceId, DeviceNumber, PinNumber};

/// Boxed source error coming from an adapter.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Top-level error for every relayhub operation.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A domain invariant was violated.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The referenced item does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// The device is known but has no pin in the current pin map.
    #[error("device {0} has no mapped pin")]
    UnmappedDevice(DeviceId),

    /// The device number is absent from the pin-mapping table.
    #[error("device number {0} has no assigned GPIO pin")]
    UnmappedPin(DeviceNumber),

    /// Talking to a pin failed.
    #[error(transparent)]
    Hardware(#[from] HardwareFault),

    /// An inbound command was malformed or out of policy.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A stored device cannot be acted on as configured.
    #[error("device {device_id} is misconfigured: {reason}")]
    ConfigurationInconsistency {
        device_id: DeviceId,
        reason: &'static str,
    },

    /// The configuration store failed.
    #[error("storage error")]
    Storage(#[source] BoxError),

    /// The message bus failed.
    #[error("transport error")]
    Transport(#[source] BoxError),
}

/// Domain invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// A required field was not provided.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// An `AUTO_POWER` device was configured without a threshold.
    #[error("device {0} is AUTO_POWER but has no power threshold")]
    MissingThreshold(DeviceId),

    /// The threshold is negative or not a finite number.
    #[error("power threshold {value} of device {device_id} must be a non-negative number")]
    InvalidThreshold { device_id: DeviceId, value: f64 },

    /// Another device already uses this id.
    #[error("device {0} already exists")]
    DuplicateDevice(DeviceId),

    /// Another device already drives this pin.
    #[error("pin {pin} is already used by device {device_id}")]
    PinInUse { pin: PinNumber, device_id: DeviceId },
}

/// Lookup failure.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

impl NotFoundError {
    /// Shorthand for a missing device.
    #[must_use]
    pub fn device(id: DeviceId) -> Self {
        Self {
            entity: "device",
            id: id.to_string(),
        }
    }
}

/// Which pin primitive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOperation {
    Setup,
    Read,
    Write,
}

impl std::fmt::Display for PinOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// An I/O error while talking to a physical pin.
#[derive(Debug, thiserror::Error)]
#[error("GPIO {operation} failed on pin {pin}")]
pub struct HardwareFault {
    pub pin: PinNumber,
    pub operation: PinOperation,
    #[source]
    pub source: BoxError,
}

/// Malformed or out-of-policy inbound commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The envelope could not be decoded.
    #[error("invalid command payload")]
    Invalid(#[from] serde_json::Error),

    /// The `command` field names an operation the agent does not support.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// The target device is not in a mode that accepts direct commands.
    #[error("device {device_id} is in {mode} mode and does not accept manual commands")]
    Rejected { device_id: DeviceId, mode: DeviceMode },
}
