//! In-process event bus backed by a tokio broadcast channel.
//!
//! Used when no broker is configured and by tests that need to observe what
//! the agent publishes.

use std::future::Future;

use tokio::sync::broadcast;

use relayhub_domain::error::RelayError;
use relayhub_domain::event::OutboundEvent;

use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
pub struct InProcessEventBus {
    sender: broadcast::Sender<OutboundEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: OutboundEvent) -> impl Future<Output = Result<(), RelayError>> + Send {
        // only fails with zero receivers
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}
