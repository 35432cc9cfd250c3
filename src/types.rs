use std::fmt;

use serde::{Deserialize, Serialize};

const SHORT_ID_LEN: usize = 10;

/// The task bound to one view: which image it runs and what the platform calls it.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TaskContext {
    pub identifier: String,
    pub task_name: String,
}

impl TaskContext {
    pub fn new(identifier: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            task_name: task_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct InstanceRecord {
    pub identifier: String,
    pub instance_id: String,
    pub host: String,
    /// `port/proto` entries in the order the backend reported them.
    pub ports: Vec<String>,
    pub expires_at_epoch_seconds: i64,
}

impl InstanceRecord {
    /// First ten characters of the instance id, falling back to the identifier
    /// when the backend did not report one.
    pub fn short_id(&self) -> String {
        let source = if self.instance_id.trim().is_empty() {
            self.identifier.as_str()
        } else {
            self.instance_id.as_str()
        };

        source
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
            .take(SHORT_ID_LEN)
            .collect()
    }

    pub fn countdown_region(&self) -> RegionId {
        RegionId(format!("{}_expiry_timer", self.short_id()))
    }

    pub fn expires_at_epoch_millis(&self) -> i64 {
        self.expires_at_epoch_seconds.saturating_mul(1000)
    }

    pub fn links(&self) -> Vec<ConnectionLink> {
        self.ports
            .iter()
            .filter_map(|entry| ConnectionLink::from_port_entry(&self.host, entry))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ConnectionLink {
    pub address: String,
    pub url: String,
    pub protocol: Option<String>,
}

impl ConnectionLink {
    pub fn from_port_entry(host: &str, entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (port, protocol) = match entry.split_once('/') {
            Some((port, protocol)) => (port.trim(), Some(protocol.trim().to_string())),
            None => (entry, None),
        };
        if port.is_empty() {
            return None;
        }

        let address = format!("{host}:{port}");
        Some(Self {
            url: format!("http://{address}"),
            address,
            protocol: protocol.filter(|value| !value.is_empty()),
        })
    }
}

/// Stable name of the countdown display for one instance.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct RegionId(String);

impl RegionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub enum UiState {
    NoInstance,
    InstanceActive(InstanceRecord),
    Expired,
}

impl UiState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiState::NoInstance => "no_instance",
            UiState::InstanceActive(_) => "instance_active",
            UiState::Expired => "expired",
        }
    }

    pub fn record(&self) -> Option<&InstanceRecord> {
        match self {
            UiState::InstanceActive(record) => Some(record),
            _ => None,
        }
    }
}

/// What the status endpoint answered, already reduced to typed records.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StatusReport {
    pub success: bool,
    pub records: Vec<InstanceRecord>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InstanceRequest {
    pub identifier: String,
    pub task_name: String,
    pub stop: bool,
}

impl InstanceRequest {
    pub fn start(context: &TaskContext) -> Self {
        Self {
            identifier: context.identifier.clone(),
            task_name: context.task_name.clone(),
            stop: false,
        }
    }

    pub fn stop(context: &TaskContext) -> Self {
        Self {
            stop: true,
            ..Self::start(context)
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ActionReply {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ActionOutcome {
    Started,
    Stopped,
    Declined,
    Failed(String),
}
