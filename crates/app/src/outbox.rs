//! Outbox — decouples event producers from a possibly slow message bus.
//!
//! Producers hand events to an [`Outbox`] without waiting. A single
//! [`Dispatcher`] task forwards them to the real publisher, retrying with
//! bounded exponential backoff. An event that still fails after
//! [`RetryPolicy::max_attempts`] is dropped with a warning.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relayhub_domain::error::RelayError;
use relayhub_domain::event::OutboundEvent;

use crate::ports::EventPublisher;

/// Why the outbox could not take or deliver an event.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("outbox is full")]
    Full,
    #[error("outbox dispatcher has stopped")]
    Closed,
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

impl From<OutboxError> for RelayError {
    fn from(err: OutboxError) -> Self {
        RelayError::Transport(Box::new(err))
    }
}

/// Bounded exponential backoff for publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            max_attempts: 4,
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Non-blocking publisher feeding a [`Dispatcher`].
#[derive(Clone)]
pub struct Outbox {
    sender: mpsc::Sender<OutboundEvent>,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` pending events, and the
    /// dispatcher that drains it into `publisher`.
    pub fn new<E: EventPublisher>(
        capacity: usize,
        publisher: E,
        policy: RetryPolicy,
    ) -> (Self, Dispatcher<E>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self { sender },
            Dispatcher {
                receiver,
                publisher,
                policy,
            },
        )
    }
}

impl EventPublisher for Outbox {
    fn publish(&self, event: OutboundEvent) -> impl Future<Output = Result<(), RelayError>> + Send {
        let result: Result<(), RelayError> = self.sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(event) => {
                tracing::warn!(kind = event.kind().subject(), "outbox full, dropping event");
                OutboxError::Full.into()
            }
            mpsc::error::TrySendError::Closed(_) => OutboxError::Closed.into(),
        });
        async move { result }
    }
}

/// Drains an [`Outbox`] into the real publisher.
pub struct Dispatcher<E> {
    receiver: mpsc::Receiver<OutboundEvent>,
    publisher: E,
    policy: RetryPolicy,
}

impl<E: EventPublisher> Dispatcher<E> {
    /// Forward events until `cancel` fires, then flush what is still queued.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(event) => self.deliver(event).await,
                    None => return,
                },
            }
        }

        self.receiver.close();
        while let Ok(event) = self.receiver.try_recv() {
            self.deliver(event).await;
        }
        tracing::debug!("outbox dispatcher stopped");
    }

    /// Publish one event, retrying per the policy.
    async fn deliver(&self, event: OutboundEvent) {
        let kind = event.kind().subject();
        for attempt in 1..=self.policy.max_attempts {
            let outcome = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.publisher.publish(event.clone()),
            )
            .await;
            let err = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(_) => OutboxError::Timeout(self.policy.attempt_timeout).into(),
            };
            if attempt == self.policy.max_attempts {
                tracing::warn!(%err, kind, attempt, "giving up on event");
                return;
            }
            let delay = self.policy.backoff(attempt);
            tracing::warn!(%err, kind, attempt, ?delay, "publish failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
