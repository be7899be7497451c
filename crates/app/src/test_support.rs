//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use relayhub_domain::config::{AgentConfig, StoredConfig};
use relayhub_domain::device::{Device, DeviceMode};
use relayhub_domain::error::{HardwareFault, PinOperation, RelayError};
use relayhub_domain::id::{DeviceId, PinNumber};
use relayhub_domain::polarity::Level;
use relayhub_domain::power::Watts;

use crate::ports::{ConfigStore, PinIo};

/// Pins that start HIGH and remember every write.
#[derive(Default)]
pub struct FakePins {
    levels: Mutex<HashMap<PinNumber, Level>>,
    writes: Mutex<Vec<(PinNumber, Level)>>,
    setups: Mutex<Vec<PinNumber>>,
    broken_reads: Mutex<HashSet<PinNumber>>,
    broken_writes: Mutex<HashSet<PinNumber>>,
}

impl FakePins {
    pub fn level(&self, pin: u16) -> Level {
        self.levels
            .lock()
            .unwrap()
            .get(&PinNumber::new(pin))
            .copied()
            .unwrap_or(Level::High)
    }

    /// Change a level behind the agent's back.
    pub fn force(&self, pin: u16, level: Level) {
        self.levels.lock().unwrap().insert(PinNumber::new(pin), level);
    }

    pub fn break_reads(&self, pin: u16) {
        self.broken_reads.lock().unwrap().insert(PinNumber::new(pin));
    }

    pub fn break_writes(&self, pin: u16) {
        self.broken_writes.lock().unwrap().insert(PinNumber::new(pin));
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn writes(&self) -> Vec<(PinNumber, Level)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn setups(&self) -> Vec<PinNumber> {
        self.setups.lock().unwrap().clone()
    }

    fn fault(pin: PinNumber, operation: PinOperation) -> HardwareFault {
        HardwareFault {
            pin,
            operation,
            source: "injected fault".into(),
        }
    }
}

impl PinIo for FakePins {
    fn setup_output(&self, pin: PinNumber) -> Result<(), HardwareFault> {
        self.setups.lock().unwrap().push(pin);
        Ok(())
    }

    fn write(&self, pin: PinNumber, level: Level) -> Result<(), HardwareFault> {
        if self.broken_writes.lock().unwrap().contains(&pin) {
            return Err(Self::fault(pin, PinOperation::Write));
        }
        self.levels.lock().unwrap().insert(pin, level);
        self.writes.lock().unwrap().push((pin, level));
        Ok(())
    }

    fn read(&self, pin: PinNumber) -> Result<Level, HardwareFault> {
        if self.broken_reads.lock().unwrap().contains(&pin) {
            return Err(Self::fault(pin, PinOperation::Read));
        }
        Ok(self.level(pin.get()))
    }
}

/// Config store holding a single value in memory.
#[derive(Default)]
pub struct InMemoryStore {
    config: Mutex<Option<StoredConfig>>,
    saves: AtomicUsize,
    broken: AtomicBool,
}

impl InMemoryStore {
    pub fn with(config: AgentConfig) -> Self {
        Self::with_stored(config.into())
    }

    pub fn with_stored(stored: StoredConfig) -> Self {
        Self {
            config: Mutex::new(Some(stored)),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<StoredConfig> {
        self.config.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn break_saves(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

impl ConfigStore for InMemoryStore {
    fn load(&self) -> impl Future<Output = Result<Option<StoredConfig>, RelayError>> + Send {
        let config = self.config.lock().unwrap().clone();
        async move { Ok(config) }
    }

    fn save(&self, config: &AgentConfig) -> impl Future<Output = Result<(), RelayError>> + Send {
        let result = if self.broken.load(Ordering::SeqCst) {
            Err(RelayError::Storage("disk full".into()))
        } else {
            *self.config.lock().unwrap() = Some(config.clone().into());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        async move { result }
    }
}

pub fn manual(id: u32, pin: u16) -> Device {
    Device::builder()
        .id(DeviceId::new(id))
        .pin(PinNumber::new(pin))
        .build()
        .unwrap()
}

pub fn auto_power(id: u32, pin: u16, threshold: f64) -> Device {
    Device::builder()
        .id(DeviceId::new(id))
        .pin(PinNumber::new(pin))
        .mode(DeviceMode::AutoPower)
        .power_threshold(Some(Watts::new(threshold)))
        .build()
        .unwrap()
}
