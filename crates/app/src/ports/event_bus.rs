//! Event bus port — publishing outbound events.

use std::future::Future;

use relayhub_domain::error::RelayError;
use relayhub_domain::event::OutboundEvent;

/// Publishes outbound events to whoever listens.
pub trait EventPublisher {
    /// Publish an event.
    fn publish(&self, event: OutboundEvent) -> impl Future<Output = Result<(), RelayError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: OutboundEvent) -> impl Future<Output = Result<(), RelayError>> + Send {
        (**self).publish(event)
    }
}
