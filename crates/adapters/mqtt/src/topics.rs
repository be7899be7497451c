//! Topic layout: `<base_topic>/<uuid>/events` in, `<base_topic>/<uuid>/<kind>` out.

use relayhub_domain::event::EventKind;
use relayhub_domain::id::AgentId;

/// Topic names for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    #[must_use]
    pub fn new(base_topic: &str, agent: AgentId) -> Self {
        Self {
            prefix: format!("{}/{agent}", base_topic.trim_end_matches('/')),
        }
    }

    /// Where the backend sends commands and configuration changes.
    #[must_use]
    pub fn inbound(&self) -> String {
        format!("{}/events", self.prefix)
    }

    /// Where events of `kind` are published.
    #[must_use]
    pub fn outbound(&self, kind: EventKind) -> String {
        format!("{}/{}", self.prefix, kind.subject())
    }
}
