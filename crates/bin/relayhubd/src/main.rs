//! # relayhubd — relayhub daemon
//!
//! Composition root that wires the adapters together and runs the agent.
//!
//! ## Responsibilities
//! - Load configuration (TOML file, env vars)
//! - Read the pin-mapping table and open the persisted device configuration
//! - Pick the GPIO backend and the transport (MQTT or local log)
//! - Drive every device OFF, then start drift detection and heartbeats
//! - Feed inbound envelopes to the agent
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use relayhub_adapter_gpio::{Backend, SimulatedPins, SysfsPins};
use relayhub_adapter_mqtt::{MqttInbound, MqttPublisher};
use relayhub_adapter_storage_json::{JsonConfigStore, load_pin_mapping};
use relayhub_app::agent::Agent;
use relayhub_app::drift::DriftMonitor;
use relayhub_app::event_bus::InProcessEventBus;
use relayhub_app::heartbeat;
use relayhub_app::outbox::{Outbox, RetryPolicy};
use relayhub_app::ports::{EventPublisher, PinIo};
use relayhub_app::services::ConfigService;
use relayhub_domain::event::OutboundEvent;
use relayhub_domain::id::AgentId;

use crate::config::Config;

/// Events waiting for the dispatcher.
const OUTBOX_CAPACITY: usize = 256;
/// Inbound envelopes waiting for the agent.
const INBOUND_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {:?}: {err}", config.logging.filter);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let id = config.agent.uuid.unwrap_or_else(|| {
        let id = AgentId::new();
        tracing::info!(agent = %id, "no agent uuid configured, using a random one");
        id
    });

    let mapping = load_pin_mapping(&config.agent.pin_mapping_path)?;
    let store = JsonConfigStore::new(&config.agent.config_path);
    let service = ConfigService::new(store, mapping);

    let mqtt = if config.mqtt.enabled {
        Some(relayhub_adapter_mqtt::connect(&config.mqtt, id))
    } else {
        tracing::warn!("MQTT disabled, outbound events are only logged");
        None
    };

    tracing::info!(agent = %id, backend = %config.gpio.backend, "starting relayhubd");
    match config.gpio.backend {
        Backend::Simulated => serve(&config, id, SimulatedPins::new(), service, mqtt).await,
        Backend::Sysfs => {
            let io = SysfsPins::new(&config.gpio.sysfs_root);
            serve(&config, id, io, service, mqtt).await
        }
    }
}

async fn serve<P>(
    config: &Config,
    id: AgentId,
    io: P,
    service: ConfigService<JsonConfigStore>,
    mqtt: Option<(MqttPublisher, MqttInbound)>,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: PinIo + 'static,
{
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let policy = RetryPolicy {
        attempt_timeout: config.publish_timeout(),
        ..RetryPolicy::default()
    };

    let (outbox, inbound) = match mqtt {
        Some((publisher, inbound)) => {
            (spawn_outbox(publisher, policy, &mut tasks, &cancel), Some(inbound))
        }
        None => {
            let bus = Arc::new(InProcessEventBus::new(OUTBOX_CAPACITY));
            tasks.spawn(log_events(bus.subscribe(), cancel.clone()));
            (spawn_outbox(bus, policy, &mut tasks, &cancel), None)
        }
    };

    let agent = Arc::new(Agent::start(id, io, service, outbox).await?);
    if config.agent.startup_off {
        agent.force_all_off().await;
    }

    let monitor = DriftMonitor::new(
        Arc::clone(agent.pins()),
        agent.publisher().clone(),
        config.drift_interval(),
    );
    tasks.spawn(monitor.run(cancel.clone()));
    tasks.spawn(heartbeat::run(
        Arc::clone(&agent),
        config.heartbeat_interval(),
        cancel.clone(),
    ));

    // the inbound loop also drives outgoing MQTT traffic, so it stops last
    let inbound_cancel = CancellationToken::new();
    let (sender, mut receiver) = mpsc::channel(INBOUND_CAPACITY);
    let inbound_task = inbound.map(|inbound| {
        let task = tokio::spawn(inbound.run(sender, inbound_cancel.clone()));
        (inbound_cancel, task)
    });

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            next = receiver.recv() => match next {
                Some(payload) => agent.handle_payload(&payload).await,
                None => {
                    (&mut shutdown).await;
                    break;
                }
            },
        }
    }

    tracing::info!("shutting down");
    cancel.cancel();
    drain(tasks, receiver, inbound_task).await;
    tracing::info!("relayhubd stopped");
    Ok(())
}

/// Wait for the background tasks, then stop the inbound loop.
///
/// The dispatcher flushes its queue once cancelled; MQTT only sends what the
/// inbound loop polls, so that loop is cancelled after everything else ended.
async fn drain(
    mut tasks: JoinSet<()>,
    mut receiver: mpsc::Receiver<Vec<u8>>,
    inbound: Option<(CancellationToken, JoinHandle<()>)>,
) {
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Err(err)) => tracing::error!(%err, "background task failed"),
                Some(Ok(())) => {}
                None => break,
            },
            Some(_) = receiver.recv() => {
                tracing::debug!("dropping inbound message received during shutdown");
            }
        }
    }
    if let Some((cancel, task)) = inbound {
        cancel.cancel();
        if let Err(err) = task.await {
            tracing::error!(%err, "MQTT task failed");
        }
    }
}

fn spawn_outbox<E>(
    publisher: E,
    policy: RetryPolicy,
    tasks: &mut JoinSet<()>,
    cancel: &CancellationToken,
) -> Outbox
where
    E: EventPublisher + Send + Sync + 'static,
{
    let (outbox, dispatcher) = Outbox::new(OUTBOX_CAPACITY, publisher, policy);
    tasks.spawn(dispatcher.run(cancel.clone()));
    outbox
}

async fn log_events(mut events: broadcast::Receiver<OutboundEvent>, cancel: CancellationToken) {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = events.recv() => next,
        };
        match next {
            Ok(event) => match event.to_payload() {
                Ok(payload) => tracing::info!(
                    kind = event.kind().subject(),
                    payload = %String::from_utf8_lossy(&payload),
                    "event"
                ),
                Err(err) => tracing::warn!(%err, "failed to serialise event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
