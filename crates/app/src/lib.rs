//! # relayhub-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `PinIo` — setup, read and write raw GPIO levels
//!   - `ConfigStore` — load and atomically save the agent configuration
//!   - `EventPublisher` — publish outbound events
//! - Hold the **device registry** as an immutable, versioned snapshot
//! - Reconcile pins: `PinController` (polarity, pin map, drift tracking),
//!   `Reconciler` (read, compare, write once), `DriftMonitor`
//! - Derive desired states: `auto_power` (threshold policy) and
//!   `command_router` (manual commands)
//! - Orchestrate everything behind the `Agent` facade, plus heartbeat and the
//!   retrying `Outbox`
//!
//! ## Dependency rule
//! Depends on `relayhub-domain` only (plus `tokio` for sync and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod agent;
pub mod auto_power;
pub mod command_router;
pub mod drift;
pub mod event_bus;
pub mod heartbeat;
pub mod outbox;
pub mod pin_controller;
pub mod ports;
pub mod reconciler;
pub mod registry;
pub mod services;

#[cfg(test)]
mod test_support;
