use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a managed environment as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Launching,
    Updating,
    Ready,
    Terminating,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launching => "Launching",
            Self::Updating => "Updating",
            Self::Ready => "Ready",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
            Self::Unknown => "Unknown",
        }
    }
}

/// A deployable environment managed by the platform.
///
/// Fetched per invocation and discarded at exit; the platform is the
/// system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Opaque environment identifier (e.g., "e-1a2b3c")
    pub id: String,
    /// Human name, also the link back to tracker keys (e.g., "AJ123")
    pub name: String,
    /// Current lifecycle state
    pub status: LifecycleState,
    /// When the environment was created
    pub created_at: DateTime<Utc>,
    /// Scheduled resume time, if an external trigger set one
    #[serde(default)]
    pub resume_after: Option<DateTime<Utc>>,
}

/// Filter for environment listing calls.
#[derive(Debug, Default)]
pub struct EnvironmentQuery {
    /// Restrict to these names; empty means all environments
    pub names: Vec<String>,
    /// Also return recently terminated environments
    pub include_deleted: bool,
    /// Oldest deletion time still included when `include_deleted` is set
    pub deleted_back_to: Option<DateTime<Utc>>,
}

/// Configuration variables of a single environment.
pub type EnvironmentSettings = BTreeMap<String, String>;

/// The compute instance currently serving an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    /// Network interface a reserved address can be bound to
    pub network_interface_id: String,
}

/// A reserved public address tagged with an environment name.
///
/// Environments get fresh instances on every rebuild; the reserved
/// address is the stable endpoint DNS records point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedAddress {
    pub allocation_id: String,
    pub public_ip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_deserializes_known_and_unknown() {
        let env: Environment = serde_json::from_str(
            r#"{
                "id": "e-1a2b",
                "name": "AJ123",
                "status": "Ready",
                "created_at": "2024-03-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(env.status, LifecycleState::Ready);
        assert!(env.resume_after.is_none());

        let env: Environment = serde_json::from_str(
            r#"{
                "id": "e-9z8y",
                "name": "AJ124",
                "status": "Hibernated",
                "created_at": "2024-03-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(env.status, LifecycleState::Unknown);
    }
}
