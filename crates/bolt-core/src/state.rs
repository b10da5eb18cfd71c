use serde::{Deserialize, Serialize};

/// Opaque status code reported by a peer's remote instance.
///
/// Status codes are unique per `(stage, phase)` within one [`crate::StageFlow`],
/// but the same code may be reused across unrelated flows — always interpret
/// one against the flow in effect rather than globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceStatus(pub String);

impl InstanceStatus {
    /// Build a status code from anything string-like.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceStatus {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Snapshot of one peer's remote instance, as returned by `update_instance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoltState {
    /// The instance's current status code.
    pub status: InstanceStatus,
    /// Publisher network addresses, present once a joint stage has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ips: Option<Vec<String>>,
    /// Publisher TLS certificate, present once a joint stage has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,
    /// Publisher hostnames, present once a joint stage has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hostnames: Option<Vec<String>>,
}

impl BoltState {
    /// Build a state snapshot carrying only a status, with no networking context.
    pub fn with_status(status: InstanceStatus) -> Self {
        Self {
            status,
            server_ips: None,
            ca_certificate: None,
            server_hostnames: None,
        }
    }
}
