//! Broker connection: an [`EventPublisher`] for outbound events and an
//! inbound loop that forwards raw envelopes to the agent.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relayhub_app::ports::EventPublisher;
use relayhub_domain::error::RelayError;
use relayhub_domain::event::OutboundEvent;
use relayhub_domain::id::AgentId;

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::topics::Topics;

/// Pending requests the client may queue before `publish` waits.
const REQUEST_CAPACITY: usize = 100;
/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Upper bound for sending queued requests on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Create a client for `agent` without connecting yet.
///
/// The connection is established, and re-established after failures, by
/// [`MqttInbound::run`]; nothing is sent or received until it runs.
#[must_use]
pub fn connect(config: &MqttConfig, agent: AgentId) -> (MqttPublisher, MqttInbound) {
    let mut options =
        MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
    let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let topics = Topics::new(&config.base_topic, agent);

    tracing::info!(
        host = %config.broker_host,
        port = config.broker_port,
        inbound = %topics.inbound(),
        "MQTT client created"
    );

    (
        MqttPublisher {
            client: client.clone(),
            topics: topics.clone(),
        },
        MqttInbound {
            client,
            event_loop,
            topics,
        },
    )
}

/// Publishes outbound events to per-kind topics.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topics: Topics,
}

impl MqttPublisher {
    async fn send(&self, event: OutboundEvent) -> Result<(), MqttError> {
        let payload = event.to_payload().map_err(MqttError::Payload)?;
        let topic = self.topics.outbound(event.kind());
        tracing::debug!(%topic, bytes = payload.len(), "publishing");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(MqttError::Client)
    }
}

impl EventPublisher for MqttPublisher {
    fn publish(&self, event: OutboundEvent) -> impl Future<Output = Result<(), RelayError>> + Send {
        async move { self.send(event).await.map_err(MqttError::into_domain) }
    }
}

/// Drives the MQTT connection and yields inbound payloads.
pub struct MqttInbound {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: Topics,
}

impl MqttInbound {
    /// Poll the connection until `cancel` fires or `sink` is closed.
    ///
    /// Subscribes to the inbound topic on every (re)connection and forwards
    /// each message body on that topic to `sink`. On the way out, publishes
    /// still queued in the client are sent ahead of the disconnect, so cancel
    /// only once nothing publishes anymore.
    pub async fn run(mut self, sink: mpsc::Sender<Vec<u8>>, cancel: CancellationToken) {
        let inbound = self.topics.inbound();
        tracing::info!("starting MQTT event loop");

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = self.event_loop.poll() => event,
            };
            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!(topic = %inbound, "MQTT connected, subscribing");
                    if let Err(err) = self
                        .client
                        .try_subscribe(inbound.as_str(), QoS::AtLeastOnce)
                    {
                        tracing::warn!(%err, "failed to subscribe to inbound topic");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != inbound {
                        tracing::debug!(topic = %publish.topic, "ignoring message on foreign topic");
                        continue;
                    }
                    if sink.send(publish.payload.to_vec()).await.is_err() {
                        tracing::warn!("inbound channel closed, stopping MQTT event loop");
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, "MQTT connection error, retrying in 5s");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        if let Err(err) = self.client.try_disconnect() {
            tracing::debug!(%err, "MQTT disconnect request failed");
        } else {
            self.flush().await;
        }
        tracing::info!("MQTT event loop stopped");
    }

    /// Poll until the disconnect queued behind pending requests went out.
    async fn flush(&mut self) {
        let drain = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(FLUSH_TIMEOUT, drain).await.is_err() {
            tracing::warn!("timed out sending queued MQTT requests");
        }
    }
}
