//! Command router — validates manual commands against device mode.

use relayhub_domain::device::DeviceMode;
use relayhub_domain::error::{CommandError, NotFoundError, RelayError};
use relayhub_domain::event::Cause;
use relayhub_domain::id::DeviceId;

use crate::ports::{EventPublisher, PinIo};
use crate::reconciler::{Reconciler, Reconciliation};
use crate::registry::DeviceRegistry;

/// Result of routing one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The device is `MANUAL`; this is what the reconciler did.
    Ok(Reconciliation),
    /// The device exists but is not `MANUAL`. Nothing was written.
    Rejected(DeviceMode),
    /// No such device.
    NotFound,
}

impl CommandOutcome {
    /// Express the outcome as a result, for acknowledgements.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Command`] for rejected commands and
    /// [`RelayError::NotFound`] for unknown devices.
    pub fn into_result(self, device_id: DeviceId) -> Result<Reconciliation, RelayError> {
        match self {
            Self::Ok(reconciliation) => Ok(reconciliation),
            Self::Rejected(mode) => Err(CommandError::Rejected { device_id, mode }.into()),
            Self::NotFound => Err(NotFoundError::device(device_id).into()),
        }
    }
}

/// Apply a manual on/off request to one device.
///
/// Only `MANUAL` devices accept commands; any other mode is rejected without
/// touching the pin.
///
/// # Errors
///
/// Returns [`RelayError::UnmappedDevice`] if the device has no pin.
#[tracing::instrument(skip(registry, reconciler, command_id))]
pub async fn apply_command<P, E>(
    registry: &DeviceRegistry,
    reconciler: &Reconciler<P, E>,
    device_id: DeviceId,
    requested_on: bool,
    command_id: Option<String>,
) -> Result<CommandOutcome, RelayError>
where
    P: PinIo,
    E: EventPublisher,
{
    let Some(device) = registry.get(device_id) else {
        tracing::warn!("command for unknown device");
        return Ok(CommandOutcome::NotFound);
    };
    if !device.is_manual() {
        tracing::warn!(mode = %device.mode, "command rejected, device is not MANUAL");
        return Ok(CommandOutcome::Rejected(device.mode));
    }
    let reconciliation = reconciler
        .reconcile(device, requested_on, Cause::Manual { command_id })
        .await?;
    Ok(CommandOutcome::Ok(reconciliation))
}
