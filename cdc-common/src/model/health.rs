use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One component's health, as returned by `HealthProbe.checkDatabase()` /
/// `.checkBroker()` / `.checkEngine()` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Up,
    Degraded,
    Down,
    Unknown,
}

impl HealthState {
    /// Aggregate rule (spec §3): `DOWN` if any component is `DOWN`, else
    /// `DEGRADED` if any is `DEGRADED`, else `UNKNOWN` if any is `UNKNOWN`,
    /// else `UP`.
    pub fn aggregate(states: impl IntoIterator<Item = HealthState>) -> HealthState {
        let mut saw_degraded = false;
        let mut saw_unknown = false;
        let mut saw_any = false;

        for state in states {
            saw_any = true;
            match state {
                HealthState::Down => return HealthState::Down,
                HealthState::Degraded => saw_degraded = true,
                HealthState::Unknown => saw_unknown = true,
                HealthState::Up => {}
            }
        }

        if !saw_any {
            return HealthState::Unknown;
        }
        if saw_degraded {
            HealthState::Degraded
        } else if saw_unknown {
            HealthState::Unknown
        } else {
            HealthState::Up
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub state: HealthState,
    pub message: String,
    #[serde(with = "crate::iso8601")]
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl HealthCheck {
    pub fn up(message: impl Into<String>) -> Self {
        HealthCheck { state: HealthState::Up, message: message.into(), checked_at: Utc::now(), extras: None, error_message: None }
    }

    pub fn down(message: impl Into<String>, error: impl Into<String>) -> Self {
        HealthCheck { state: HealthState::Down, message: message.into(), checked_at: Utc::now(), extras: None, error_message: Some(error.into()) }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        HealthCheck { state: HealthState::Degraded, message: message.into(), checked_at: Utc::now(), extras: None, error_message: None }
    }
}
