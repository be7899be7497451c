//! Pin I/O port — the three primitives every GPIO backend provides.
//!
//! Implementations deal in raw [`Level`]s only. Translation to logical
//! on/off happens in [`PinController`](crate::pin_controller::PinController)
//! through the polarity policy.

use std::sync::Arc;

use relayhub_domain::error::HardwareFault;
use relayhub_domain::id::PinNumber;
use relayhub_domain::polarity::Level;

/// Raw access to GPIO pins.
///
/// Calls are short and synchronous; callers hold locks across them.
pub trait PinIo: Send + Sync {
    /// Configure `pin` as an output. Relay pins are never inputs.
    ///
    /// # Errors
    ///
    /// Returns a [`HardwareFault`] if the backend rejects the pin.
    fn setup_output(&self, pin: PinNumber) -> Result<(), HardwareFault>;

    /// Drive `pin` to `level`.
    ///
    /// # Errors
    ///
    /// Returns a [`HardwareFault`] on I/O failure.
    fn write(&self, pin: PinNumber, level: Level) -> Result<(), HardwareFault>;

    /// Sample the current level of `pin`.
    ///
    /// # Errors
    ///
    /// Returns a [`HardwareFault`] on I/O failure.
    fn read(&self, pin: PinNumber) -> Result<Level, HardwareFault>;
}

impl<T: PinIo + ?Sized> PinIo for Arc<T> {
    fn setup_output(&self, pin: PinNumber) -> Result<(), HardwareFault> {
        (**self).setup_output(pin)
    }

    fn write(&self, pin: PinNumber, level: Level) -> Result<(), HardwareFault> {
        (**self).write(pin, level)
    }

    fn read(&self, pin: PinNumber) -> Result<Level, HardwareFault> {
        (**self).read(pin)
    }
}
