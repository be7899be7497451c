//! Wall-clock helpers for heartbeat timestamps.

use chrono::{DateTime, Utc};

/// UTC timestamp carried by heartbeats.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
