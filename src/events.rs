//! Boundary events for notification and storage collaborators.

use serde::Serialize;
use uuid::Uuid;

use crate::alert::{AlertReason, AlertStatus, GpsFix, Severity};
use crate::physio::VitalsSample;

/// Channel half handed to the lifecycle manager at construction
pub type EventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineEvent>;

/// Create an event channel for the engine
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Events emitted by the alert lifecycle.
///
/// `AlertOpened` fires once per alert actually created - dedup hits are
/// silent. `StatusChanged` fires on every successful transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    AlertOpened {
        alert_id: Uuid,
        device_id: String,
        reason: AlertReason,
        status: AlertStatus,
        severity: Severity,
        combined_score: f64,
        gps: Option<GpsFix>,
        vitals: VitalsSample,
    },
    StatusChanged {
        alert_id: Uuid,
        old_status: AlertStatus,
        new_status: AlertStatus,
        actor_id: Uuid,
    },
}
