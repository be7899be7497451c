//! In-memory pins for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use relayhub_app::ports::PinIo;
use relayhub_domain::error::HardwareFault;
use relayhub_domain::id::PinNumber;
use relayhub_domain::polarity::Level;

/// Simulated pins.
///
/// A pin reads HIGH until something writes it, matching relay boards whose
/// inputs idle pulled up. [`set_level`](Self::set_level) changes a level
/// without counting as a write, which is how tests inject drift.
#[derive(Debug, Default)]
pub struct SimulatedPins {
    levels: Mutex<HashMap<PinNumber, Level>>,
    writes: AtomicUsize,
}

impl SimulatedPins {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of `pin`, if it was ever set up or written.
    #[must_use]
    pub fn level(&self, pin: PinNumber) -> Option<Level> {
        self.lock_levels().get(&pin).copied()
    }

    /// Change a pin's level from outside the agent.
    pub fn set_level(&self, pin: PinNumber, level: Level) {
        tracing::debug!(%pin, %level, "simulated pin changed externally");
        self.lock_levels().insert(pin, level);
    }

    /// Number of writes performed through [`PinIo::write`].
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn lock_levels(&self) -> MutexGuard<'_, HashMap<PinNumber, Level>> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PinIo for SimulatedPins {
    fn setup_output(&self, pin: PinNumber) -> Result<(), HardwareFault> {
        tracing::debug!(%pin, "simulated pin set up as output");
        self.lock_levels().entry(pin).or_insert(Level::High);
        Ok(())
    }

    fn write(&self, pin: PinNumber, level: Level) -> Result<(), HardwareFault> {
        self.lock_levels().insert(pin, level);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read(&self, pin: PinNumber) -> Result<Level, HardwareFault> {
        Ok(self.level(pin).unwrap_or(Level::High))
    }
}
