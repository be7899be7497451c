//! # relayhub-domain
//!
//! Pure domain model for the relayhub GPIO relay agent.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define the **polarity policy** (raw pin level ⇄ logical on/off)
//! - Define **Devices** (logical switches bound to one relay pin each)
//! - Define **power readings** in one canonical unit (watts)
//! - Define the **bus envelopes**: inbound commands and outbound events
//! - Define the **persisted configuration** and the device-number → pin table
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod command;
pub mod config;
pub mod device;
pub mod event;
pub mod polarity;
pub mod power;
