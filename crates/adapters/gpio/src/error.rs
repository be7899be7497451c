//! GPIO adapter error types.

use std::path::PathBuf;

use relayhub_domain::error::{HardwareFault, PinOperation};
use relayhub_domain::id::PinNumber;

/// Errors specific to the GPIO backends.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    /// A sysfs attribute could not be read or written.
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sysfs `value` file held something other than `0` or `1`.
    #[error("unexpected value {value:?} in {}", path.display())]
    InvalidValue { path: PathBuf, value: String },

    /// The configured backend name is not supported.
    #[error("unknown GPIO backend `{0}`")]
    UnknownBackend(String),
}

impl GpioError {
    /// Attach the pin and operation, producing the fault the port reports.
    #[must_use]
    pub fn into_fault(self, pin: PinNumber, operation: PinOperation) -> HardwareFault {
        HardwareFault {
            pin,
            operation,
            source: Box::new(self),
        }
    }
}
