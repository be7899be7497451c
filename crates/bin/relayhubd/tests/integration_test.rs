//! End-to-end tests for the relayhubd stack.
//!
//! Each test wires the real adapters (simulated pins, JSON storage in a temp
//! directory, outbox and dispatcher) around the agent and drives it with raw
//! bus envelopes. No broker is involved: outbound events land on an
//! in-process bus the test subscribes to.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relayhub_adapter_gpio::SimulatedPins;
use relayhub_adapter_storage_json::{JsonConfigStore, load_pin_mapping};
use relayhub_app::agent::Agent;
use relayhub_app::drift::DriftMonitor;
use relayhub_app::event_bus::InProcessEventBus;
use relayhub_app::outbox::{Outbox, RetryPolicy};
use relayhub_app::services::ConfigService;
use relayhub_domain::device::DeviceMode;
use relayhub_domain::event::{Cause, OutboundEvent};
use relayhub_domain::id::{AgentId, DeviceId, PinNumber};
use relayhub_domain::polarity::Level;
use relayhub_domain::power::Watts;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type TestAgent = Agent<Arc<SimulatedPins>, JsonConfigStore, Outbox>;

const MAPPING: &str = r#"{"active_low": true, "device_pin_map": {"1": 17, "2": 27}}"#;

/// A running agent plus the handles a test needs to observe it.
struct Stack {
    agent: Arc<TestAgent>,
    pins: Arc<SimulatedPins>,
    events: broadcast::Receiver<OutboundEvent>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl Stack {
    /// Start an agent whose files live in `dir`.
    async fn start(dir: &Path) -> Self {
        let mapping_path = dir.join("gpio_mapping.json");
        if !mapping_path.exists() {
            std::fs::write(&mapping_path, MAPPING).expect("mapping should be writable");
        }
        let mapping = load_pin_mapping(&mapping_path).expect("mapping should load");
        let service = ConfigService::new(JsonConfigStore::new(dir.join("config.json")), mapping);

        let bus = Arc::new(InProcessEventBus::new(64));
        let events = bus.subscribe();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let (outbox, dispatcher) = Outbox::new(64, bus, RetryPolicy::default());
        tasks.spawn(dispatcher.run(cancel.clone()));

        let pins = Arc::new(SimulatedPins::new());
        let agent = Agent::start(AgentId::new(), Arc::clone(&pins), service, outbox)
            .await
            .expect("agent should start");
        let agent = Arc::new(agent);

        let monitor = DriftMonitor::new(
            Arc::clone(agent.pins()),
            agent.publisher().clone(),
            Duration::from_millis(20),
        );
        tasks.spawn(monitor.run(cancel.clone()));

        Self {
            agent,
            pins,
            events,
            cancel,
            tasks,
        }
    }

    async fn send(&self, envelope: &str) {
        self.agent.handle_payload(envelope.as_bytes()).await;
    }

    /// Wait for the first event matching `pred`, skipping the others.
    async fn wait_for(&mut self, pred: impl Fn(&OutboundEvent) -> bool) -> OutboundEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = self.events.recv().await.expect("bus should stay open");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event should arrive in time")
    }

    async fn stop(mut self) {
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}

fn create_envelope(device_id: u32, number: u32, extra: &str) -> String {
    format!(
        r#"{{"event_type": "DEVICE_CREATED", "payload": {{"device_id": {device_id}, "device_number": {number}{extra}}}}}"#
    )
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_persist_created_device_across_restart() {
    let dir = TempDir::new().unwrap();
    let mut stack = Stack::start(dir.path()).await;

    stack.send(&create_envelope(10, 1, "")).await;
    let ack = stack
        .wait_for(|e| matches!(e, OutboundEvent::ConfigAck(_)))
        .await;
    let OutboundEvent::ConfigAck(ack) = ack else {
        unreachable!()
    };
    assert!(ack.ok);
    assert_eq!(ack.device_id, DeviceId::new(10));
    stack.stop().await;

    let stored = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored["active_low"], true);
    assert_eq!(stored["devices"][0]["device_id"], 10);
    assert_eq!(stored["devices"][0]["pin_number"], 17);

    let restarted = Stack::start(dir.path()).await;
    let registry = restarted.agent.registry();
    let device = registry.get(DeviceId::new(10)).expect("device should survive restart");
    assert_eq!(device.pin, PinNumber::new(17));
    assert_eq!(device.mode, DeviceMode::Manual);
    restarted.stop().await;
}

#[tokio::test]
async fn should_start_from_config_written_by_older_agent() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"pins": [{"device_id": 4, "pin_number": 22, "mode": "AUTO_POWER", "power_threshold_w": 300}]}"#,
    )
    .unwrap();

    let stack = Stack::start(dir.path()).await;

    let registry = stack.agent.registry();
    let device = registry.get(DeviceId::new(4)).expect("legacy device should load");
    assert_eq!(device.mode, DeviceMode::AutoPower);
    assert_eq!(device.power_threshold, Some(Watts::new(300.0)));
    assert!(registry.polarity().active_low);
    stack.stop().await;
}

#[tokio::test]
async fn should_reject_device_on_unmapped_number() {
    let dir = TempDir::new().unwrap();
    let mut stack = Stack::start(dir.path()).await;

    stack.send(&create_envelope(10, 9, "")).await;
    let OutboundEvent::ConfigAck(ack) = stack
        .wait_for(|e| matches!(e, OutboundEvent::ConfigAck(_)))
        .await
    else {
        unreachable!()
    };
    assert!(!ack.ok);
    assert!(ack.error.is_some());
    assert!(stack.agent.registry().is_empty());
    assert!(!dir.path().join("config.json").exists());
    stack.stop().await;
}

#[tokio::test]
async fn should_fail_when_pin_mapping_is_missing() {
    let dir = TempDir::new().unwrap();
    assert!(load_pin_mapping(&dir.path().join("gpio_mapping.json")).is_err());
}

// ---------------------------------------------------------------------------
// Actuation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_switch_manual_device_and_acknowledge_command() {
    let dir = TempDir::new().unwrap();
    let mut stack = Stack::start(dir.path()).await;
    stack.send(&create_envelope(10, 1, "")).await;

    stack
        .send(
            r#"{"event_type": "DEVICE_COMMAND", "payload": {"device_id": 10, "command": "SET_STATE", "is_on": true, "command_id": "c-1"}}"#,
        )
        .await;

    let OutboundEvent::StateChanged(change) = stack
        .wait_for(|e| matches!(e, OutboundEvent::StateChanged(_)))
        .await
    else {
        unreachable!()
    };
    assert_eq!(change.device_id, DeviceId::new(10));
    assert!(change.is_on);
    assert_eq!(
        change.cause,
        Cause::Manual {
            command_id: Some("c-1".to_string())
        }
    );

    let OutboundEvent::CommandAck(ack) = stack
        .wait_for(|e| matches!(e, OutboundEvent::CommandAck(_)))
        .await
    else {
        unreachable!()
    };
    assert!(ack.ok);
    // active-low board: ON drives the pin LOW
    assert_eq!(stack.pins.level(PinNumber::new(17)), Some(Level::Low));
    stack.stop().await;
}

#[tokio::test]
async fn should_switch_auto_power_device_on_reading_above_threshold() {
    let dir = TempDir::new().unwrap();
    let mut stack = Stack::start(dir.path()).await;
    stack
        .send(&create_envelope(
            20,
            2,
            r#", "mode": "AUTO_POWER", "threshold": 500"#,
        ))
        .await;

    stack
        .send(r#"{"event_type": "POWER_READING", "payload": {"power": 750}}"#)
        .await;

    let OutboundEvent::StateChanged(change) = stack
        .wait_for(|e| matches!(e, OutboundEvent::StateChanged(_)))
        .await
    else {
        unreachable!()
    };
    assert_eq!(change.device_id, DeviceId::new(20));
    assert!(change.is_on);
    assert_eq!(
        change.cause,
        Cause::AutoTrigger {
            power: Watts::new(750.0)
        }
    );
    assert_eq!(stack.pins.level(PinNumber::new(27)), Some(Level::Low));
    stack.stop().await;
}

#[tokio::test]
async fn should_ignore_malformed_envelope() {
    let dir = TempDir::new().unwrap();
    let stack = Stack::start(dir.path()).await;

    stack.send("{not json").await;
    stack
        .send(r#"{"event_type": "REBOOT", "payload": {}}"#)
        .await;

    assert!(stack.agent.registry().is_empty());
    assert_eq!(stack.pins.write_count(), 0);
    stack.stop().await;
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_report_pin_changed_outside_the_agent() {
    let dir = TempDir::new().unwrap();
    let mut stack = Stack::start(dir.path()).await;
    stack.send(&create_envelope(10, 1, "")).await;
    // let the monitor record a baseline for the new pin map
    tokio::time::sleep(Duration::from_millis(100)).await;

    stack.pins.set_level(PinNumber::new(17), Level::Low);

    let OutboundEvent::Drift(drift) = stack
        .wait_for(|e| matches!(e, OutboundEvent::Drift(_)))
        .await
    else {
        unreachable!()
    };
    assert_eq!(drift.pin, PinNumber::new(17));
    assert!(drift.is_on);
    stack.stop().await;
}
