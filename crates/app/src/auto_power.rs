//! Auto-power policy — turning power readings into desired device states.

use relayhub_domain::device::Device;
use relayhub_domain::error::{NotFoundError, RelayError};
use relayhub_domain::event::Cause;
use relayhub_domain::id::DeviceId;
use relayhub_domain::power::{PowerReading, Watts};

use crate::ports::{EventPublisher, PinIo};
use crate::reconciler::{Reconciler, Reconciliation};
use crate::registry::DeviceRegistry;

/// Desired logical state of `device` for a power value.
///
/// ON exactly when both the power and a valid threshold are known and
/// `power >= threshold`; anything missing or invalid yields OFF.
#[must_use]
pub fn desired_state(device: &Device, power: Option<Watts>) -> bool {
    match (power, device.power_threshold) {
        (Some(power), Some(threshold)) if threshold.is_valid_threshold() => power >= threshold,
        _ => false,
    }
}

/// Apply one reading to every `AUTO_POWER` device it targets.
///
/// Returns one entry per targeted device, in id order, followed by
/// [`RelayError::NotFound`] entries for listed ids that are not configured.
/// A missing power value forces the targeted devices OFF. A device with no
/// threshold is reported as a configuration inconsistency and left alone.
pub async fn apply_reading<P, E>(
    registry: &DeviceRegistry,
    reconciler: &Reconciler<P, E>,
    reading: &PowerReading,
) -> Vec<(DeviceId, Result<Reconciliation, RelayError>)>
where
    P: PinIo,
    E: EventPublisher,
{
    let mut outcomes = Vec::new();

    for device in registry.devices() {
        if !device.is_auto_power() || !reading.applies_to(device.id) {
            continue;
        }
        let outcome = match (reading.power, device.power_threshold) {
            (None, _) => reconciler.reconcile(device, false, Cause::PowerMissing).await,
            (Some(_), None) => Err(inconsistent(
                device.id,
                "AUTO_POWER device has no power threshold",
            )),
            (Some(_), Some(threshold)) if !threshold.is_valid_threshold() => Err(inconsistent(
                device.id,
                "AUTO_POWER device has a negative or non-finite power threshold",
            )),
            (Some(power), Some(_)) => {
                let desired = desired_state(device, Some(power));
                reconciler
                    .reconcile(device, desired, Cause::AutoTrigger { power })
                    .await
            }
        };
        outcomes.push((device.id, outcome));
    }

    for id in reading.device_ids.iter().flatten() {
        if !registry.contains(*id) {
            tracing::warn!(device_id = %id, "power reading names an unknown device");
            outcomes.push((*id, Err(NotFoundError::device(*id).into())));
        }
    }

    outcomes
}

fn inconsistent(device_id: DeviceId, reason: &'static str) -> RelayError {
    let err = RelayError::ConfigurationInconsistency { device_id, reason };
    tracing::error!(%err, "skipping power reading");
    err
}
