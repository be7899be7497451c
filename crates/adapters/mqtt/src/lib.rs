//! # relayhub-adapter-mqtt
//!
//! MQTT transport for relayhub.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker and keep the connection alive
//! - Subscribe to `<base_topic>/<uuid>/events` and hand every envelope to
//!   the agent through a channel
//! - Publish outbound events to `<base_topic>/<uuid>/<kind>`
//!
//! ## Dependency rule
//! Same as other adapters: depends on `relayhub-app` and `relayhub-domain`.

mod bus;
pub mod config;
pub mod error;
pub mod topics;

pub use bus::{MqttInbound, MqttPublisher, connect};
pub use config::MqttConfig;
pub use error::MqttError;
pub use topics::Topics;
