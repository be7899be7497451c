//! Polarity policy — the only place where raw pin levels and logical
//! on/off states are translated into each other.
//!
//! Relay boards are commonly "low-trigger": driving the input LOW energises
//! the coil. With `active_low = true` a raw [`Level::Low`] therefore means
//! logical ON.

use serde::{Deserialize, Serialize};

/// Raw two-valued signal level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Whether the level is [`High`](Self::High).
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("LOW"),
            Self::High => f.write_str("HIGH"),
        }
    }
}

/// Map a raw level to a logical state.
#[must_use]
pub const fn to_logical(raw: Level, active_low: bool) -> bool {
    raw.is_high() != active_low
}

/// Map a logical state to the raw level that encodes it.
#[must_use]
pub const fn to_raw(logical_on: bool, active_low: bool) -> Level {
    if logical_on != active_low {
        Level::High
    } else {
        Level::Low
    }
}

/// Process-wide polarity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polarity {
    pub active_low: bool,
}

impl Polarity {
    /// Low-trigger relays: LOW means ON.
    pub const ACTIVE_LOW: Self = Self { active_low: true };
    /// High-trigger relays: HIGH means ON.
    pub const ACTIVE_HIGH: Self = Self { active_low: false };

    #[must_use]
    pub const fn new(active_low: bool) -> Self {
        Self { active_low }
    }

    #[must_use]
    pub const fn to_logical(self, raw: Level) -> bool {
        to_logical(raw, self.active_low)
    }

    #[must_use]
    pub const fn to_raw(self, logical_on: bool) -> Level {
        to_raw(logical_on, self.active_low)
    }

    /// Raw level that means OFF, the fail-safe value.
    #[must_use]
    pub const fn off_level(self) -> Level {
        self.to_raw(false)
    }
}
