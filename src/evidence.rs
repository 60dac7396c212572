//! Evidence capture.
//!
//! Associates uploaded artifacts (audio clips, images) with an alert and
//! exposes retrieval under the alert's visibility rules. The vault is
//! append-only - evidence is never mutated or removed here; retention is
//! an external concern. Attachment takes its own lock, so it neither
//! blocks nor is blocked by lifecycle transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::alert::{Actor, AlertLifecycleManager, GpsFix, LifecycleError};

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("Unknown alert {0}")]
    UnknownAlert(Uuid),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceKind {
    Audio,
    Image,
}

/// One captured artifact, owned by exactly one alert.
///
/// `payload_ref` is an opaque identifier for the storage collaborator;
/// the engine never inspects the bytes behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub kind: EvidenceKind,
    pub payload_ref: String,
    pub mime_type: Option<String>,
    pub gps: Option<GpsFix>,
    pub captured_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
}

/// Evidence vault keyed by alert id
pub struct EvidenceVault {
    alerts: Arc<AlertLifecycleManager>,
    by_alert: Mutex<HashMap<Uuid, Vec<Evidence>>>,
}

impl EvidenceVault {
    pub fn new(alerts: Arc<AlertLifecycleManager>) -> Self {
        Self {
            alerts,
            by_alert: Mutex::new(HashMap::new()),
        }
    }

    /// Attach an artifact to an alert.
    ///
    /// The alert must exist but may be in any state - evidence that
    /// arrives after resolution is kept for audit completeness. The
    /// append is idempotent per payload reference: re-attaching the same
    /// `payload_ref` returns the existing record instead of duplicating
    /// it.
    pub fn attach(
        &self,
        alert_id: Uuid,
        kind: EvidenceKind,
        payload_ref: &str,
        captured_at: DateTime<Utc>,
        gps: Option<GpsFix>,
        mime_type: Option<String>,
    ) -> Result<Evidence, EvidenceError> {
        if !self.alerts.contains(alert_id) {
            return Err(EvidenceError::UnknownAlert(alert_id));
        }

        let mut by_alert = self.lock();
        let records = by_alert.entry(alert_id).or_default();

        if let Some(existing) = records.iter().find(|e| e.payload_ref == payload_ref) {
            debug!(
                "Evidence {} already attached to alert {}",
                payload_ref, alert_id
            );
            return Ok(existing.clone());
        }

        let evidence = Evidence {
            id: Uuid::new_v4(),
            alert_id,
            kind,
            payload_ref: payload_ref.to_string(),
            mime_type,
            gps,
            captured_at,
            uploaded_at: Utc::now(),
        };
        records.push(evidence.clone());

        info!(
            "Evidence {} ({:?}) attached to alert {}",
            evidence.id, kind, alert_id
        );
        Ok(evidence)
    }

    /// Evidence for an alert, oldest capture first.
    ///
    /// Disclosure follows the alert's own visibility rule, never looser:
    /// the actor must be able to `get` the alert.
    pub fn list_for_alert(
        &self,
        alert_id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<Evidence>, EvidenceError> {
        // Reuses the lifecycle gate so the two can never drift apart
        self.alerts.get(alert_id, actor)?;

        let by_alert = self.lock();
        let mut records = by_alert.get(&alert_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| a.captured_at.cmp(&b.captured_at));
        Ok(records)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Vec<Evidence>>> {
        match self.by_alert.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
