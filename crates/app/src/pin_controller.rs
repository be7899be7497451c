//! Pin controller — owns the device → pin map and every pin access.
//!
//! All reads and writes go through here so the polarity policy is applied in
//! one place and the drift tracker sees each of the agent's own writes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relayhub_domain::error::RelayError;
use relayhub_domain::id::{DeviceId, PinNumber};
use relayhub_domain::polarity::{Level, Polarity};

use crate::drift::DriftTracker;
use crate::ports::PinIo;
use crate::registry::{DeviceRegistry, SnapshotCell};

/// One generation of the device → pin assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    version: u64,
    polarity: Polarity,
    pins: BTreeMap<DeviceId, PinNumber>,
}

impl PinMap {
    fn from_registry(registry: &DeviceRegistry) -> Self {
        Self {
            version: registry.version(),
            polarity: registry.polarity(),
            pins: registry.devices().map(|d| (d.id, d.pin)).collect(),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    #[must_use]
    pub fn pin_of(&self, id: DeviceId) -> Option<PinNumber> {
        self.pins.get(&id).copied()
    }

    /// `(device, pin)` pairs ordered by device id.
    pub fn pins(&self) -> impl Iterator<Item = (DeviceId, PinNumber)> + '_ {
        self.pins.iter().map(|(id, pin)| (*id, *pin))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Reads and drives relay pins on behalf of devices.
pub struct PinController<P> {
    pub(crate) io: P,
    pub(crate) map: SnapshotCell<PinMap>,
    pub(crate) tracker: Mutex<DriftTracker>,
}

impl<P: PinIo> PinController<P> {
    /// A controller with no pins mapped yet.
    pub fn new(io: P, polarity: Polarity) -> Self {
        Self {
            io,
            map: SnapshotCell::new(PinMap {
                version: 0,
                polarity,
                pins: BTreeMap::new(),
            }),
            tracker: Mutex::new(DriftTracker::new(0)),
        }
    }

    /// Rebuild the pin map from `registry`, configuring every pin as output.
    ///
    /// Reloading the same registry again changes nothing but the drift
    /// baseline. A pin that fails setup stays mapped; later writes to it
    /// surface as hardware faults. Returns the number of pins set up.
    #[tracing::instrument(skip_all, fields(version = registry.version()))]
    pub fn load(&self, registry: &DeviceRegistry) -> usize {
        let map = PinMap::from_registry(registry);
        let mut ready = 0;
        for (device_id, pin) in map.pins() {
            match self.io.setup_output(pin) {
                Ok(()) => ready += 1,
                Err(err) => tracing::error!(%err, %device_id, %pin, "pin setup failed"),
            }
        }

        let mut tracker = self.lock_tracker();
        tracker.reset(map.version);
        self.map.replace(map);
        drop(tracker);

        tracing::info!(pins = ready, "pin map loaded");
        ready
    }

    /// The pin map in effect.
    #[must_use]
    pub fn map(&self) -> Arc<PinMap> {
        self.map.load()
    }

    /// Borrow the underlying backend.
    pub fn io(&self) -> &P {
        &self.io
    }

    /// Raw level of the device's pin.
    ///
    /// A read fault is logged and reported as the OFF level so callers never
    /// act on a guessed ON state.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnmappedDevice`] if the device has no pin.
    pub fn read(&self, id: DeviceId) -> Result<Level, RelayError> {
        let map = self.map();
        let pin = map.pin_of(id).ok_or(RelayError::UnmappedDevice(id))?;
        Ok(self.io.read(pin).unwrap_or_else(|err| {
            tracing::warn!(%err, device_id = %id, %pin, "pin read failed, assuming OFF");
            map.polarity.off_level()
        }))
    }

    /// Logical state of the device's pin.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnmappedDevice`] if the device has no pin.
    pub fn is_on(&self, id: DeviceId) -> Result<bool, RelayError> {
        let polarity = self.map().polarity;
        self.read(id).map(|raw| polarity.to_logical(raw))
    }

    /// Drive the device's pin to the raw level encoding `on`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnmappedDevice`] if the device has no pin, or
    /// [`RelayError::Hardware`] when the write fails.
    pub fn write(&self, id: DeviceId, on: bool) -> Result<(), RelayError> {
        let map = self.map();
        let pin = map.pin_of(id).ok_or(RelayError::UnmappedDevice(id))?;
        let raw = map.polarity.to_raw(on);

        // the tracker must learn about the write before the next sweep reads
        let mut tracker = self.lock_tracker();
        self.io.write(pin, raw)?;
        tracker.expect(pin, on);
        drop(tracker);

        tracing::debug!(device_id = %id, %pin, level = %raw, "pin written");
        Ok(())
    }

    pub(crate) fn lock_tracker(&self) -> MutexGuard<'_, DriftTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
