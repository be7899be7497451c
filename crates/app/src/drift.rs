//! Drift detection — noticing pins that change without the agent writing them.
//!
//! The tracker remembers the last known logical state of every mapped pin.
//! [`PinController::write`] updates it under the same lock it writes under,
//! so a sweep never mistakes one of our own writes for drift. The first
//! observation after a (re)load only records a baseline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use relayhub_domain::event::{DriftEvent, OutboundEvent};
use relayhub_domain::id::PinNumber;

use crate::pin_controller::PinController;
use crate::ports::{EventPublisher, PinIo};

/// Last known logical state per pin, for one pin-map generation.
#[derive(Debug)]
pub(crate) struct DriftTracker {
    version: u64,
    known: HashMap<PinNumber, bool>,
}

impl DriftTracker {
    pub(crate) fn new(version: u64) -> Self {
        Self {
            version,
            known: HashMap::new(),
        }
    }

    pub(crate) fn reset(&mut self, version: u64) {
        self.version = version;
        self.known.clear();
    }

    /// Record a state the agent itself just wrote.
    pub(crate) fn expect(&mut self, pin: PinNumber, is_on: bool) {
        self.known.insert(pin, is_on);
    }

    /// Record an observed state; `true` when it differs from the last known one.
    fn observe(&mut self, pin: PinNumber, is_on: bool) -> bool {
        match self.known.insert(pin, is_on) {
            Some(previous) => previous != is_on,
            None => false,
        }
    }
}

impl<P: PinIo> PinController<P> {
    /// Read every mapped pin once and report those that drifted.
    ///
    /// Never writes. Pins that fail to read are skipped for this sweep.
    pub fn sweep(&self) -> Vec<DriftEvent> {
        let mut tracker = self.lock_tracker();
        let map = self.map();
        if tracker.version != map.version() {
            tracker.reset(map.version());
        }

        let mut drifted = Vec::new();
        for (device_id, pin) in map.pins() {
            let raw = match self.io.read(pin) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(%err, %device_id, %pin, "skipping pin in drift sweep");
                    continue;
                }
            };
            let is_on = map.polarity().to_logical(raw);
            if tracker.observe(pin, is_on) {
                tracing::info!(%device_id, %pin, is_on, "pin drifted");
                drifted.push(DriftEvent { pin, is_on });
            }
        }
        drifted
    }
}

/// Periodic drift sweep publishing `gpio_change` events.
pub struct DriftMonitor<P, E> {
    pins: Arc<PinController<P>>,
    publisher: E,
    interval: Duration,
}

impl<P, E> DriftMonitor<P, E>
where
    P: PinIo,
    E: EventPublisher,
{
    pub fn new(pins: Arc<PinController<P>>, publisher: E, interval: Duration) -> Self {
        Self {
            pins,
            publisher,
            interval,
        }
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis(), "drift monitor started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            for event in self.pins.sweep() {
                if let Err(err) = self.publisher.publish(OutboundEvent::Drift(event)).await {
                    tracing::warn!(%err, pin = %event.pin, "failed to publish drift event");
                }
            }
        }

        tracing::info!("drift monitor stopped");
    }
}
