//! Alert domain types and the role-gated lifecycle.

pub mod lifecycle;
pub mod registry;

pub use lifecycle::{AlertLifecycleManager, OpenResult};
pub use registry::{DeviceRecord, DeviceRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::physio::VitalsSample;

/// Errors from lifecycle and evidence operations.
///
/// Every variant leaves the alert untouched; none is retried internally.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    #[error("Actor {actor} ({role:?}) is not authorized for this operation")]
    Forbidden { actor: Uuid, role: Role },

    #[error("Unknown alert {0}")]
    UnknownAlert(Uuid),

    #[error("Unknown device {0}")]
    UnknownDevice(String),
}

/// Caller identity. Every lifecycle operation takes one explicitly;
/// nothing is read from ambient session state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Wearer,
    Guardian,
    Police,
    Admin,
}

impl Role {
    /// Police and admin may resolve alerts and see everything
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Police | Role::Admin)
    }
}

/// Why an alert was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertReason {
    /// Audio-led trigger over the combined threshold
    AutoStress,
    /// Wearer pressed the SOS button
    ManualSos,
    /// Vitals alone crossed the threshold
    VitalsThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    New,
    InProgress,
    Resolved,
    FalseAlarm,
}

impl AlertStatus {
    /// Open alerts block new ones for the same device
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::New | AlertStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Legal transitions: NEW -> IN_PROGRESS, and any open state into
    /// either terminal state. Terminal states accept nothing.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        match (self, next) {
            (AlertStatus::New, AlertStatus::InProgress) => true,
            (AlertStatus::New, AlertStatus::Resolved) => true,
            (AlertStatus::New, AlertStatus::FalseAlarm) => true,
            (AlertStatus::InProgress, AlertStatus::Resolved) => true,
            (AlertStatus::InProgress, AlertStatus::FalseAlarm) => true,
            _ => false,
        }
    }
}

/// Alert severity, derived from the decision that raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Elevated,
    High,
    Critical,
}

impl Severity {
    /// Manual SOS is always critical; scored triggers use the ladder
    pub fn from_score(combined: f64, manual: bool, critical_at: f64, high_at: f64) -> Self {
        if manual || combined >= critical_at {
            Severity::Critical
        } else if combined >= high_at {
            Severity::High
        } else {
            Severity::Elevated
        }
    }
}

/// A GPS coordinate pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lng: f64,
}

/// GPS and vitals captured at trigger time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    pub gps: Option<GpsFix>,
    pub vitals: VitalsSample,
}

/// The central durable record. Mutated only through the lifecycle
/// manager's transition API and never deleted - terminal alerts are
/// retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub device_id: String,
    pub reason: AlertReason,
    pub status: AlertStatus,
    pub severity: Severity,
    pub combined_score: f64,
    pub gps: Option<GpsFix>,
    pub vitals: VitalsSample,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who closed the alert (resolve or false alarm)
    pub resolved_by: Option<Uuid>,
    pub notes: Option<String>,
}

impl Alert {
    pub(crate) fn open(
        device_id: String,
        reason: AlertReason,
        severity: Severity,
        combined_score: f64,
        snapshot: TriggerSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            device_id,
            reason,
            status: AlertStatus::New,
            severity,
            combined_score,
            gps: snapshot.gps,
            vitals: snapshot.vitals,
            created_at: now,
            updated_at: now,
            acknowledged_at: None,
            resolved_at: None,
            resolved_by: None,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_states() {
        assert!(AlertStatus::New.is_open());
        assert!(AlertStatus::InProgress.is_open());
        assert!(AlertStatus::Resolved.is_terminal());
        assert!(AlertStatus::FalseAlarm.is_terminal());
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for terminal in [AlertStatus::Resolved, AlertStatus::FalseAlarm] {
            for next in [
                AlertStatus::New,
                AlertStatus::InProgress,
                AlertStatus::Resolved,
                AlertStatus::FalseAlarm,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_new_cannot_be_reopened() {
        assert!(!AlertStatus::InProgress.can_transition_to(AlertStatus::New));
        assert!(!AlertStatus::New.can_transition_to(AlertStatus::New));
    }

    #[test]
    fn test_severity_ladder() {
        assert_eq!(Severity::from_score(0.9, false, 0.8, 0.65), Severity::Critical);
        assert_eq!(Severity::from_score(0.7, false, 0.8, 0.65), Severity::High);
        assert_eq!(Severity::from_score(0.55, false, 0.8, 0.65), Severity::Elevated);
        // Manual SOS outranks the score
        assert_eq!(Severity::from_score(0.0, true, 0.8, 0.65), Severity::Critical);
    }

    #[test]
    fn test_reason_serde_names() {
        let json = serde_json::to_string(&AlertReason::ManualSos).unwrap();
        assert_eq!(json, "\"MANUAL_SOS\"");
        let json = serde_json::to_string(&AlertStatus::FalseAlarm).unwrap();
        assert_eq!(json, "\"FALSE_ALARM\"");
    }
}
