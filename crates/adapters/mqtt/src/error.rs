//! MQTT adapter error types.

use relayhub_domain::error::RelayError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client rejected a request.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to serialise an outbound event.
    #[error("failed to encode MQTT payload")]
    Payload(#[source] serde_json::Error),

    /// A domain-level error passed through the adapter.
    #[error("domain error")]
    Domain(#[source] RelayError),
}

impl MqttError {
    /// Convert into a [`RelayError::Transport`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> RelayError {
        match self {
            Self::Domain(err) => err,
            other => RelayError::Transport(Box::new(other)),
        }
    }
}

impl From<MqttError> for RelayError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
