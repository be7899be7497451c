//! Power readings, normalised to one canonical unit: watts.
//!
//! Thresholds are always stored in watts. Inbound readings may be reported in
//! kilowatts and are converted with [`PowerUnit::to_watts`] before any
//! comparison takes place.

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;

/// Active power in watts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watts(f64);

impl Watts {
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// Finite and not below zero.
    #[must_use]
    pub fn is_valid_threshold(self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

impl std::fmt::Display for Watts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} W", self.0)
    }
}

/// Unit an inbound reading is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerUnit {
    #[default]
    #[serde(rename = "W", alias = "w")]
    Watt,
    #[serde(rename = "kW", alias = "kw", alias = "KW")]
    Kilowatt,
}

impl PowerUnit {
    /// Convert a raw value in this unit to [`Watts`].
    #[must_use]
    pub fn to_watts(self, value: f64) -> Watts {
        match self {
            Self::Watt => Watts(value),
            Self::Kilowatt => Watts(value * 1000.0),
        }
    }
}

/// A normalised power measurement, ready for threshold comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
    /// `None` when the meter could not report a value.
    pub power: Option<Watts>,
    /// Devices this reading is relevant to; `None` means every
    /// `AUTO_POWER` device.
    pub device_ids: Option<Vec<DeviceId>>,
}

impl PowerReading {
    /// Whether this reading should drive the given device.
    #[must_use]
    pub fn applies_to(&self, id: DeviceId) -> bool {
        self.device_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&id))
    }
}
