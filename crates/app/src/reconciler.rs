//! State reconciler — the single path by which a desired state reaches a pin.
//!
//! Read the pin, compare with the desired logical state, write only on a
//! mismatch. Reconciliations are serialised by one actuation gate, which a
//! configuration reload also takes so it never interleaves with a write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use relayhub_domain::device::Device;
use relayhub_domain::error::RelayError;
use relayhub_domain::event::{Cause, OutboundEvent, StateChange};
use relayhub_domain::id::DeviceId;

use crate::pin_controller::PinController;
use crate::ports::{EventPublisher, PinIo};

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The pin was written.
    Applied,
    /// The pin already matched; nothing was written.
    Skipped,
    /// The write failed; the fault has been logged.
    Failed,
}

/// Drives pins toward desired states and reports state changes.
pub struct Reconciler<P, E> {
    pins: Arc<PinController<P>>,
    publisher: E,
    gate: AsyncMutex<()>,
    commanded: Mutex<HashMap<DeviceId, bool>>,
}

impl<P, E> Reconciler<P, E>
where
    P: PinIo,
    E: EventPublisher,
{
    pub fn new(pins: Arc<PinController<P>>, publisher: E) -> Self {
        Self {
            pins,
            publisher,
            gate: AsyncMutex::new(()),
            commanded: Mutex::new(HashMap::new()),
        }
    }

    /// Bring `device` to `desired_on`.
    ///
    /// A hardware fault during the write yields [`Reconciliation::Failed`]
    /// rather than an error so callers iterating several devices carry on.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnmappedDevice`] if the device has no pin.
    #[tracing::instrument(skip(self, device, cause), fields(device_id = %device.id))]
    pub async fn reconcile(
        &self,
        device: &Device,
        desired_on: bool,
        cause: Cause,
    ) -> Result<Reconciliation, RelayError> {
        let gate = self.gate.lock().await;

        let observed_on = self.pins.is_on(device.id)?;
        if observed_on == desired_on {
            tracing::debug!(is_on = observed_on, "already in desired state");
            return Ok(Reconciliation::Skipped);
        }

        match self.pins.write(device.id, desired_on) {
            Ok(()) => {}
            Err(RelayError::Hardware(err)) => {
                tracing::error!(%err, desired_on, "failed to switch device");
                return Ok(Reconciliation::Failed);
            }
            Err(other) => return Err(other),
        }
        self.lock_commanded().insert(device.id, desired_on);
        drop(gate);

        tracing::info!(is_on = desired_on, ?cause, "device switched");
        let event = OutboundEvent::StateChanged(StateChange {
            device_id: device.id,
            is_on: desired_on,
            cause,
        });
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish state change");
        }
        Ok(Reconciliation::Applied)
    }

    /// Hold the actuation gate, keeping every reconciliation out.
    pub async fn exclusive(&self) -> AsyncMutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Last state the agent successfully commanded for `id`.
    #[must_use]
    pub fn last_commanded(&self, id: DeviceId) -> Option<bool> {
        self.lock_commanded().get(&id).copied()
    }

    /// Drop cached states of devices for which `keep` is false.
    pub fn retain(&self, keep: impl Fn(DeviceId) -> bool) {
        self.lock_commanded().retain(|id, _| keep(*id));
    }

    pub fn pins(&self) -> &Arc<PinController<P>> {
        &self.pins
    }

    pub fn publisher(&self) -> &E {
        &self.publisher
    }

    fn lock_commanded(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceId, bool>> {
        self.commanded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
