//! Linux sysfs GPIO (`/sys/class/gpio`).
//!
//! Each pin is exported by writing its number to `export`, after which
//! `gpio<N>/direction` and `gpio<N>/value` control it.

use std::fs;
use std::path::{Path, PathBuf};

use relayhub_app::ports::PinIo;
use relayhub_domain::error::{HardwareFault, PinOperation};
use relayhub_domain::id::PinNumber;
use relayhub_domain::polarity::Level;

use crate::error::GpioError;

/// Default sysfs GPIO root.
pub const DEFAULT_ROOT: &str = "/sys/class/gpio";

/// Pins driven through the sysfs interface.
#[derive(Debug, Clone)]
pub struct SysfsPins {
    root: PathBuf,
}

impl Default for SysfsPins {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl SysfsPins {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pin_dir(&self, pin: PinNumber) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn export(&self, pin: PinNumber) -> Result<(), GpioError> {
        if self.pin_dir(pin).exists() {
            return Ok(());
        }
        tracing::debug!(%pin, "exporting pin");
        write_attr(&self.root.join("export"), &pin.to_string())
    }
}

impl PinIo for SysfsPins {
    fn setup_output(&self, pin: PinNumber) -> Result<(), HardwareFault> {
        self.export(pin)
            .and_then(|()| write_attr(&self.pin_dir(pin).join("direction"), "out"))
            .map_err(|err| err.into_fault(pin, PinOperation::Setup))
    }

    fn write(&self, pin: PinNumber, level: Level) -> Result<(), HardwareFault> {
        let value = if level.is_high() { "1" } else { "0" };
        write_attr(&self.pin_dir(pin).join("value"), value)
            .map_err(|err| err.into_fault(pin, PinOperation::Write))
    }

    fn read(&self, pin: PinNumber) -> Result<Level, HardwareFault> {
        let path = self.pin_dir(pin).join("value");
        read_level(&path).map_err(|err| err.into_fault(pin, PinOperation::Read))
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), GpioError> {
    fs::write(path, value).map_err(|source| GpioError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_level(path: &Path) -> Result<Level, GpioError> {
    let raw = fs::read_to_string(path).map_err(|source| GpioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match raw.trim() {
        "0" => Ok(Level::Low),
        "1" => Ok(Level::High),
        other => Err(GpioError::InvalidValue {
            path: path.to_path_buf(),
            value: other.to_string(),
        }),
    }
}
