//! Heartbeat — periodic liveness report with a live read of every device.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use relayhub_domain::event::{DeviceStatus, Heartbeat, OutboundEvent};
use relayhub_domain::id::AgentId;
use relayhub_domain::time;

use crate::agent::Agent;
use crate::pin_controller::PinController;
use crate::ports::{ConfigStore, EventPublisher, PinIo};
use crate::registry::DeviceRegistry;

/// Status reported while the agent runs.
pub const STATUS_ONLINE: &str = "online";

/// Build a heartbeat from the current registry and live pin levels.
///
/// Devices whose pin cannot be read are reported OFF.
pub fn build<P: PinIo>(
    uuid: AgentId,
    registry: &DeviceRegistry,
    pins: &PinController<P>,
    gpio_count: usize,
) -> Heartbeat {
    let devices: Vec<DeviceStatus> = registry
        .devices()
        .map(|device| DeviceStatus {
            device_id: device.id,
            pin: device.pin,
            is_on: pins.is_on(device.id).unwrap_or(false),
            mode: device.mode,
            threshold: device.power_threshold,
        })
        .collect();
    Heartbeat {
        uuid,
        status: STATUS_ONLINE.to_string(),
        device_count: devices.len(),
        devices,
        gpio_count,
        timestamp: time::now(),
    }
}

/// Publish a heartbeat every `interval` until `cancel` fires.
///
/// The first heartbeat goes out immediately. A failed publish is logged and
/// the loop carries on with the next tick.
pub async fn run<P, S, E>(agent: Arc<Agent<P, S, E>>, interval: Duration, cancel: CancellationToken)
where
    P: PinIo,
    S: ConfigStore,
    E: EventPublisher,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = interval.as_secs(), "heartbeat started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let heartbeat = agent.heartbeat();
        tracing::debug!(devices = heartbeat.device_count, "sending heartbeat");
        if let Err(err) = agent
            .publisher()
            .publish(OutboundEvent::Heartbeat(heartbeat))
            .await
        {
            tracing::warn!(%err, "failed to publish heartbeat");
        }
    }

    tracing::info!("heartbeat stopped");
}
