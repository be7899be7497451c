//! Agent — the use-case facade the transport drives.
//!
//! Owns the registry snapshot, the pin controller and the reconciler, and
//! turns each inbound envelope into one of the operations below. Results of
//! commands and configuration changes are acknowledged on the bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex as AsyncMutex;

use relayhub_domain::command::{
    DeviceCommand, DeviceCreated, DeviceDeleted, DeviceUpdated, InboundEvent,
};
use relayhub_domain::config::AgentConfig;
use relayhub_domain::error::RelayError;
use relayhub_domain::event::{Ack, Cause, Heartbeat, OutboundEvent};
use relayhub_domain::id::{AgentId, DeviceId};
use relayhub_domain::power::PowerReading;

use crate::auto_power;
use crate::command_router;
use crate::heartbeat;
use crate::pin_controller::PinController;
use crate::ports::{ConfigStore, EventPublisher, PinIo};
use crate::reconciler::{Reconciler, Reconciliation};
use crate::registry::{DeviceRegistry, SnapshotCell};
use crate::services::ConfigService;

/// Per-device results of a batch operation.
pub type Outcomes = Vec<(DeviceId, Result<Reconciliation, RelayError>)>;

/// A running relay agent.
pub struct Agent<P, S, E> {
    id: AgentId,
    registry: SnapshotCell<DeviceRegistry>,
    reconciler: Reconciler<P, E>,
    config: ConfigService<S>,
    changes: AsyncMutex<()>,
    version: AtomicU64,
}

impl<P, S, E> Agent<P, S, E>
where
    P: PinIo,
    S: ConfigStore,
    E: EventPublisher,
{
    /// Load the stored configuration and map its pins.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored configuration cannot be read or is
    /// invalid.
    #[tracing::instrument(skip_all, fields(agent = %id))]
    pub async fn start(
        id: AgentId,
        io: P,
        config: ConfigService<S>,
        publisher: E,
    ) -> Result<Self, RelayError> {
        let initial = config.load().await?;
        let pins = Arc::new(PinController::new(io, initial.polarity()));
        let agent = Self {
            id,
            registry: SnapshotCell::new(DeviceRegistry::empty(initial.polarity())),
            reconciler: Reconciler::new(pins, publisher),
            config,
            changes: AsyncMutex::new(()),
            version: AtomicU64::new(0),
        };
        agent.apply(&initial).await;
        Ok(agent)
    }

    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// The registry generation in effect.
    #[must_use]
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.registry.load()
    }

    pub fn pins(&self) -> &Arc<PinController<P>> {
        self.reconciler.pins()
    }

    pub fn publisher(&self) -> &E {
        self.reconciler.publisher()
    }

    /// Drive every registered device OFF.
    pub async fn force_all_off(&self) -> Outcomes {
        let registry = self.registry();
        let mut outcomes = Vec::with_capacity(registry.len());
        for device in registry.devices() {
            let outcome = self.reconciler.reconcile(device, false, Cause::Startup).await;
            if let Err(err) = &outcome {
                tracing::error!(%err, device_id = %device.id, "fail-safe OFF failed");
            }
            outcomes.push((device.id, outcome));
        }
        tracing::info!(devices = outcomes.len(), "fail-safe OFF applied");
        outcomes
    }

    /// Add a device and reload.
    ///
    /// # Errors
    ///
    /// See [`ConfigService::create`]. Nothing changes on error.
    pub async fn create_device(&self, created: &DeviceCreated) -> Result<(), RelayError> {
        let _changes = self.changes.lock().await;
        let next = self.config.create(&self.current_config(), created).await?;
        self.apply(&next).await;
        Ok(())
    }

    /// Change a device's mode and threshold and reload.
    ///
    /// # Errors
    ///
    /// See [`ConfigService::update`]. Nothing changes on error.
    pub async fn update_device(&self, updated: &DeviceUpdated) -> Result<(), RelayError> {
        let _changes = self.changes.lock().await;
        let next = self.config.update(&self.current_config(), updated).await?;
        self.apply(&next).await;
        Ok(())
    }

    /// Remove a device and reload.
    ///
    /// # Errors
    ///
    /// See [`ConfigService::delete`]. Nothing changes on error.
    pub async fn delete_device(&self, deleted: &DeviceDeleted) -> Result<(), RelayError> {
        let _changes = self.changes.lock().await;
        let next = self.config.delete(&self.current_config(), deleted).await?;
        self.apply(&next).await;
        Ok(())
    }

    /// Apply a manual command.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Command`] for unknown commands and non-`MANUAL`
    /// devices, [`RelayError::NotFound`] for unknown devices, or
    /// [`RelayError::UnmappedDevice`].
    pub async fn apply_command(
        &self,
        command: &DeviceCommand,
    ) -> Result<Reconciliation, RelayError> {
        let requested_on = command.requested_state()?;
        let registry = self.registry();
        command_router::apply_command(
            &registry,
            &self.reconciler,
            command.device_id,
            requested_on,
            command.command_id.clone(),
        )
        .await?
        .into_result(command.device_id)
    }

    /// Apply a power reading to the `AUTO_POWER` devices it targets.
    pub async fn apply_reading(&self, reading: &PowerReading) -> Outcomes {
        let registry = self.registry();
        auto_power::apply_reading(&registry, &self.reconciler, reading).await
    }

    /// Current heartbeat.
    #[must_use]
    pub fn heartbeat(&self) -> Heartbeat {
        heartbeat::build(
            self.id,
            &self.registry(),
            self.pins(),
            self.config.mapping().gpio_count(),
        )
    }

    /// Decode and handle a raw envelope. Malformed input is logged and dropped.
    pub async fn handle_payload(&self, payload: &[u8]) {
        match InboundEvent::from_slice(payload) {
            Ok(event) => self.handle(event).await,
            Err(err) => tracing::warn!(%err, "dropping malformed inbound message"),
        }
    }

    /// Handle one inbound event, acknowledging commands and configuration
    /// changes.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::DeviceCreated(created) => {
                let result = self.create_device(&created).await;
                self.ack_config(created.device_id, result).await;
            }
            InboundEvent::DeviceUpdated(updated) => {
                let result = self.update_device(&updated).await;
                self.ack_config(updated.device_id, result).await;
            }
            InboundEvent::DeviceDeleted(deleted) => {
                let result = self.delete_device(&deleted).await;
                self.ack_config(deleted.device_id, result).await;
            }
            InboundEvent::PowerReading(payload) => {
                self.apply_reading(&payload.normalize()).await;
            }
            InboundEvent::DeviceCommand(command) => {
                let result = self.apply_command(&command).await;
                let ack = match result {
                    Ok(Reconciliation::Applied | Reconciliation::Skipped) => {
                        Ack::ok(command.device_id)
                    }
                    Ok(Reconciliation::Failed) => Ack::failed(
                        command.device_id,
                        &format!("GPIO write failed for device {}", command.device_id),
                    ),
                    Err(err) => {
                        tracing::warn!(%err, device_id = %command.device_id, "command failed");
                        Ack::failed(command.device_id, &err)
                    }
                };
                self.send(OutboundEvent::CommandAck(ack)).await;
            }
        }
    }

    fn current_config(&self) -> AgentConfig {
        self.registry().to_config()
    }

    /// Install `config` as the next registry generation.
    async fn apply(&self, config: &AgentConfig) {
        let _gate = self.reconciler.exclusive().await;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let registry = DeviceRegistry::from_config(version, config);
        self.pins().load(&registry);
        self.reconciler.retain(|id| registry.contains(id));
        let devices = registry.len();
        self.registry.replace(registry);
        tracing::info!(version, devices, "configuration applied");
    }

    async fn ack_config(&self, device_id: DeviceId, result: Result<(), RelayError>) {
        let ack = match result {
            Ok(()) => Ack::ok(device_id),
            Err(err) => {
                tracing::warn!(%err, %device_id, "configuration change rejected");
                Ack::failed(device_id, &err)
            }
        };
        self.send(OutboundEvent::ConfigAck(ack)).await;
    }

    async fn send(&self, event: OutboundEvent) {
        if let Err(err) = self.publisher().publish(event).await {
            tracing::warn!(%err, "failed to publish acknowledgement");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use tokio::sync::broadcast;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::event_bus::InProcessEventBus;
    use crate::test_support::{FakePins, InMemoryStore, auto_power, manual};
    use relayhub_domain::config::PinMapping;
    use relayhub_domain::device::DeviceMode;
    use relayhub_domain::event::StateChange;
    use relayhub_domain::id::{DeviceNumber, PinNumber};
    use relayhub_domain::polarity::Level;
    use relayhub_domain::power::Watts;

    type TestAgent = Agent<FakePins, InMemoryStore, Arc<InProcessEventBus>>;

    const A: DeviceId = DeviceId::new(1);
    const B: DeviceId = DeviceId::new(2);

    fn mapping(active_low: bool) -> PinMapping {
        PinMapping {
            active_low,
            device_pin_map: BTreeMap::from([
                (DeviceNumber::new(1), PinNumber::new(5)),
                (DeviceNumber::new(2), PinNumber::new(6)),
                (DeviceNumber::new(3), PinNumber::new(13)),
            ]),
        }
    }

    async fn start(active_low: bool) -> (TestAgent, broadcast::Receiver<OutboundEvent>) {
        let store = InMemoryStore::with(AgentConfig {
            active_low,
            devices: vec![manual(1, 5), auto_power(2, 6, 500.0)],
        });
        let bus = Arc::new(InProcessEventBus::new(64));
        let rx = bus.subscribe();
        let agent = Agent::start(
            AgentId::new(),
            FakePins::default(),
            ConfigService::new(store, mapping(active_low)),
            bus,
        )
        .await
        .unwrap();
        (agent, rx)
    }

    fn reading(power: Option<f64>, ids: Option<Vec<DeviceId>>) -> PowerReading {
        PowerReading {
            power: power.map(Watts::new),
            device_ids: ids,
        }
    }

    #[tokio::test]
    async fn should_switch_manual_device_and_acknowledge() {
        let (agent, mut rx) = start(true).await;

        agent
            .handle_payload(
                br#"{"event_type": "DEVICE_COMMAND", "payload": {"device_id": 1, "command": "SET_STATE", "is_on": true}}"#,
            )
            .await;

        assert_eq!(
            agent.pins().io().writes(),
            vec![(PinNumber::new(5), Level::Low)]
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::StateChanged(StateChange {
                device_id: A,
                is_on: true,
                cause: Cause::Manual { command_id: None },
            })
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::CommandAck(Ack::ok(A))
        );
    }

    #[tokio::test]
    async fn should_write_once_when_power_crosses_threshold() {
        let (agent, _rx) = start(true).await;

        for power in [499.0, 500.0, 501.0] {
            agent.apply_reading(&reading(Some(power), None)).await;
        }

        assert_eq!(
            agent.pins().io().writes(),
            vec![(PinNumber::new(6), Level::Low)]
        );
        assert!(agent.pins().is_on(B).unwrap());
    }

    #[tokio::test]
    async fn should_force_device_off_when_power_missing() {
        let (agent, mut rx) = start(true).await;
        agent.apply_reading(&reading(Some(800.0), None)).await;
        rx.recv().await.unwrap();

        agent.apply_reading(&reading(None, Some(vec![B]))).await;

        assert!(!agent.pins().is_on(B).unwrap());
        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::StateChanged(StateChange {
                device_id: B,
                is_on: false,
                cause: Cause::PowerMissing,
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_write_each_pin_once_under_concurrent_requests() {
        let (agent, _rx) = start(true).await;
        let agent = Arc::new(agent);
        let command = |agent: Arc<TestAgent>| {
            tokio::spawn(async move {
                agent
                    .apply_command(&DeviceCommand {
                        device_id: A,
                        command: "SET_STATE".to_string(),
                        is_on: true,
                        command_id: None,
                    })
                    .await
            })
        };
        let power = |agent: Arc<TestAgent>| {
            tokio::spawn(async move { agent.apply_reading(&reading(Some(800.0), None)).await })
        };

        let (c1, p1, c2, p2, c3, p3) = tokio::join!(
            command(Arc::clone(&agent)),
            power(Arc::clone(&agent)),
            command(Arc::clone(&agent)),
            power(Arc::clone(&agent)),
            command(Arc::clone(&agent)),
            power(Arc::clone(&agent)),
        );
        for result in [c1, c2, c3] {
            assert!(result.unwrap().is_ok());
        }
        for outcomes in [p1, p2, p3] {
            assert!(outcomes.unwrap().iter().all(|(_, outcome)| outcome.is_ok()));
        }

        let writes = agent.pins().io().writes();
        let count = |pin: u16| writes.iter().filter(|(p, _)| *p == PinNumber::new(pin)).count();
        assert_eq!(count(5), 1);
        assert_eq!(count(6), 1);
        assert!(agent.pins().is_on(A).unwrap());
        assert!(agent.pins().is_on(B).unwrap());
    }

    #[tokio::test]
    async fn should_hold_reload_until_actuation_gate_is_free() {
        let (agent, _rx) = start(true).await;
        let agent = Arc::new(agent);
        let before = agent.registry().version();

        let gate = agent.reconciler.exclusive().await;
        let reload = tokio::spawn({
            let agent = Arc::clone(&agent);
            async move {
                let next = AgentConfig {
                    active_low: true,
                    devices: vec![manual(1, 5)],
                };
                agent.apply(&next).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!reload.is_finished());
        assert_eq!(agent.registry().version(), before);
        assert!(agent.registry().contains(B));

        drop(gate);
        reload.await.unwrap();

        assert_eq!(agent.registry().version(), before + 1);
        assert!(!agent.registry().contains(B));
    }

    #[tokio::test]
    async fn should_reject_command_for_auto_power_device() {
        let (agent, mut rx) = start(true).await;

        agent
            .handle(InboundEvent::DeviceCommand(DeviceCommand {
                device_id: B,
                command: "SET_STATE".to_string(),
                is_on: true,
                command_id: None,
            }))
            .await;

        assert_eq!(agent.pins().io().write_count(), 0);
        let OutboundEvent::CommandAck(ack) = rx.recv().await.unwrap() else {
            panic!("expected command ack");
        };
        assert!(!ack.ok);
        assert!(ack.error.unwrap().contains("AUTO_POWER"));
    }

    #[tokio::test]
    async fn should_reject_unknown_command_name() {
        let (agent, mut rx) = start(true).await;

        agent
            .handle(InboundEvent::DeviceCommand(DeviceCommand {
                device_id: A,
                command: "TOGGLE".to_string(),
                is_on: true,
                command_id: None,
            }))
            .await;

        assert_eq!(agent.pins().io().write_count(), 0);
        let OutboundEvent::CommandAck(ack) = rx.recv().await.unwrap() else {
            panic!("expected command ack");
        };
        assert!(!ack.ok);
    }

    #[tokio::test]
    async fn should_drive_every_device_off_at_startup() {
        // with active-high relays the HIGH default level means ON
        let (agent, mut rx) = start(false).await;

        let outcomes = agent.force_all_off().await;

        assert!(outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, Ok(Reconciliation::Applied))));
        assert_eq!(agent.pins().io().level(5), Level::Low);
        assert_eq!(agent.pins().io().level(6), Level::Low);
        let OutboundEvent::StateChanged(change) = rx.recv().await.unwrap() else {
            panic!("expected state change");
        };
        assert_eq!(change.cause, Cause::Startup);
    }

    #[tokio::test]
    async fn should_create_device_and_reload() {
        let (agent, mut rx) = start(true).await;
        let before = agent.registry().version();

        agent
            .handle_payload(
                br#"{"event_type": "DEVICE_CREATED", "payload": {"device_id": 3, "device_number": 3, "mode": "MANUAL"}}"#,
            )
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::ConfigAck(Ack::ok(DeviceId::new(3)))
        );
        let registry = agent.registry();
        assert!(registry.version() > before);
        assert_eq!(
            registry.get(DeviceId::new(3)).unwrap().pin,
            PinNumber::new(13)
        );
        assert_eq!(
            agent.pins().map().pin_of(DeviceId::new(3)),
            Some(PinNumber::new(13))
        );
    }

    #[tokio::test]
    async fn should_acknowledge_unmapped_device_number_as_failure() {
        let (agent, mut rx) = start(true).await;

        agent
            .handle(InboundEvent::DeviceCreated(DeviceCreated {
                device_id: DeviceId::new(3),
                device_number: Some(DeviceNumber::new(9)),
                mode: DeviceMode::Manual,
                threshold: None,
            }))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::ConfigAck(Ack::failed(
                DeviceId::new(3),
                &"device number 9 has no assigned GPIO pin"
            ))
        );
        assert!(!agent.registry().contains(DeviceId::new(3)));
    }

    #[tokio::test]
    async fn should_refuse_commands_for_deleted_device() {
        let (agent, mut rx) = start(true).await;
        agent.delete_device(&DeviceDeleted { device_id: A }).await.unwrap();

        agent
            .handle(InboundEvent::DeviceCommand(DeviceCommand {
                device_id: A,
                command: "SET_STATE".to_string(),
                is_on: true,
                command_id: None,
            }))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundEvent::CommandAck(Ack::failed(A, &"device 1 not found"))
        );
        assert_eq!(agent.pins().map().pin_of(A), None);
    }

    #[tokio::test]
    async fn should_stop_auto_power_after_switch_to_manual() {
        let (agent, _rx) = start(true).await;
        agent
            .update_device(&DeviceUpdated {
                device_id: B,
                mode: DeviceMode::Manual,
                threshold: None,
            })
            .await
            .unwrap();

        agent.apply_reading(&reading(Some(900.0), None)).await;

        assert_eq!(agent.pins().io().write_count(), 0);
    }

    #[tokio::test]
    async fn should_drop_malformed_payload_silently() {
        let (agent, mut rx) = start(true).await;

        agent.handle_payload(b"not json").await;

        assert!(rx.try_recv().is_err());
        assert_eq!(agent.pins().io().write_count(), 0);
    }

    #[tokio::test]
    async fn should_report_devices_in_heartbeat() {
        let (agent, _rx) = start(true).await;
        agent.apply_reading(&reading(Some(800.0), None)).await;

        let heartbeat = agent.heartbeat();

        assert_eq!(heartbeat.device_count, 2);
        assert_eq!(heartbeat.gpio_count, 3);
        assert!(!heartbeat.devices[0].is_on);
        assert!(heartbeat.devices[1].is_on);
    }

    #[tokio::test(start_paused = true)]
    async fn should_publish_heartbeats_until_cancelled() {
        let (agent, mut rx) = start(true).await;
        let agent = Arc::new(agent);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(heartbeat::run(
            Arc::clone(&agent),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        let OutboundEvent::Heartbeat(first) = rx.recv().await.unwrap() else {
            panic!("expected heartbeat");
        };
        assert_eq!(first.uuid, agent.id());

        cancel.cancel();
        task.await.unwrap();
    }
}
