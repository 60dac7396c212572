//! Alert lifecycle manager.
//!
//! Sole owner of alert state: creation goes through `open_if_absent`,
//! every mutation goes through a role-gated transition, and nothing is
//! ever deleted. The alert table sits behind one mutex, so the
//! check-and-create in `open_if_absent` is atomic - two decisions racing
//! to open an alert for the same device cannot both create one.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::{EngineEvent, EventSender};

use super::registry::DeviceRegistry;
use super::{Actor, Alert, AlertReason, AlertStatus, LifecycleError, Severity, TriggerSnapshot};

/// Outcome of `open_if_absent`
#[derive(Debug, Clone)]
pub struct OpenResult {
    pub alert: Alert,
    /// False when the call deduplicated onto an existing open alert
    pub created: bool,
}

#[derive(Debug, Default)]
struct AlertTable {
    by_id: HashMap<Uuid, Alert>,
    /// At most one entry per device: its currently open alert
    open_by_device: HashMap<String, Uuid>,
}

pub struct AlertLifecycleManager {
    registry: Arc<DeviceRegistry>,
    table: Mutex<AlertTable>,
    events: Option<EventSender>,
}

impl AlertLifecycleManager {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            table: Mutex::new(AlertTable::default()),
            events: None,
        }
    }

    pub fn with_events(registry: Arc<DeviceRegistry>, events: EventSender) -> Self {
        Self {
            registry,
            table: Mutex::new(AlertTable::default()),
            events: Some(events),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Open an alert for the device unless one is already open.
    ///
    /// Idempotent dedup: if the device has an alert in NEW or IN_PROGRESS,
    /// that alert is returned unchanged and no event fires. Otherwise a
    /// new alert is created in NEW, stamped with the decision's reason and
    /// trigger snapshot, and `AlertOpened` is emitted.
    pub fn open_if_absent(
        &self,
        device_id: &str,
        reason: AlertReason,
        severity: Severity,
        combined_score: f64,
        snapshot: TriggerSnapshot,
    ) -> Result<OpenResult, LifecycleError> {
        if !self.registry.contains(device_id) {
            return Err(LifecycleError::UnknownDevice(device_id.to_string()));
        }

        let mut table = self.lock_table();

        if let Some(open_id) = table.open_by_device.get(device_id) {
            if let Some(existing) = table.by_id.get(open_id) {
                info!(
                    "Dedup: device {} already has open alert {}",
                    device_id, existing.id
                );
                return Ok(OpenResult {
                    alert: existing.clone(),
                    created: false,
                });
            }
            // Index points at a missing alert; fall through and repair
            warn!("Open-alert index for {} was stale", device_id);
        }

        let alert = Alert::open(
            device_id.to_string(),
            reason,
            severity,
            combined_score,
            snapshot,
        );
        info!(
            "ALERT OPENED: {} for device {} ({:?}, {:?}, score {:.3})",
            alert.id, device_id, reason, severity, combined_score
        );

        table.open_by_device.insert(device_id.to_string(), alert.id);
        table.by_id.insert(alert.id, alert.clone());
        drop(table);

        self.emit(EngineEvent::AlertOpened {
            alert_id: alert.id,
            device_id: alert.device_id.clone(),
            reason: alert.reason,
            status: alert.status,
            severity: alert.severity,
            combined_score: alert.combined_score,
            gps: alert.gps,
            vitals: alert.vitals,
        });

        Ok(OpenResult {
            alert,
            created: true,
        })
    }

    /// NEW -> IN_PROGRESS. Guardian of the device, police or admin.
    pub fn acknowledge(&self, alert_id: Uuid, actor: &Actor) -> Result<Alert, LifecycleError> {
        self.transition(alert_id, actor, AlertStatus::InProgress, None, |registry, alert, actor| {
            actor.role.is_elevated() || registry.is_guardian(&alert.device_id, actor.id)
        })
    }

    /// Open -> RESOLVED. Police or admin only; guardians may view but not
    /// close.
    pub fn resolve(
        &self,
        alert_id: Uuid,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<Alert, LifecycleError> {
        self.transition(alert_id, actor, AlertStatus::Resolved, notes, |_, _, actor| {
            actor.role.is_elevated()
        })
    }

    /// Open -> FALSE_ALARM. Same gate as `resolve`.
    pub fn mark_false_alarm(&self, alert_id: Uuid, actor: &Actor) -> Result<Alert, LifecycleError> {
        self.transition(alert_id, actor, AlertStatus::FalseAlarm, None, |_, _, actor| {
            actor.role.is_elevated()
        })
    }

    /// Fetch an alert, gated by the visibility rule
    pub fn get(&self, alert_id: Uuid, actor: &Actor) -> Result<Alert, LifecycleError> {
        let table = self.lock_table();
        let alert = table
            .by_id
            .get(&alert_id)
            .ok_or(LifecycleError::UnknownAlert(alert_id))?;

        if !self.registry.can_view(&alert.device_id, actor) {
            return Err(LifecycleError::Forbidden {
                actor: actor.id,
                role: actor.role,
            });
        }
        Ok(alert.clone())
    }

    /// All alerts for a device, newest first, same visibility rule
    pub fn alerts_for_device(
        &self,
        device_id: &str,
        actor: &Actor,
    ) -> Result<Vec<Alert>, LifecycleError> {
        if !self.registry.contains(device_id) {
            return Err(LifecycleError::UnknownDevice(device_id.to_string()));
        }
        if !self.registry.can_view(device_id, actor) {
            return Err(LifecycleError::Forbidden {
                actor: actor.id,
                role: actor.role,
            });
        }

        let table = self.lock_table();
        let mut alerts: Vec<Alert> = table
            .by_id
            .values()
            .filter(|a| a.device_id == device_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    /// The device's currently open alert, if any. Trusted-boundary query
    /// for collaborators; not actor-gated.
    pub fn open_alert_for_device(&self, device_id: &str) -> Option<Alert> {
        let table = self.lock_table();
        let id = table.open_by_device.get(device_id)?;
        table.by_id.get(id).cloned()
    }

    /// Referential check used by evidence attachment (any state counts)
    pub fn contains(&self, alert_id: Uuid) -> bool {
        self.lock_table().by_id.contains_key(&alert_id)
    }

    /// Shared transition path: existence, then authorization, then
    /// transition validity; mutate and emit only when all three pass.
    fn transition(
        &self,
        alert_id: Uuid,
        actor: &Actor,
        to: AlertStatus,
        notes: Option<String>,
        authorized: impl Fn(&DeviceRegistry, &Alert, &Actor) -> bool,
    ) -> Result<Alert, LifecycleError> {
        let mut table = self.lock_table();
        let alert = table
            .by_id
            .get_mut(&alert_id)
            .ok_or(LifecycleError::UnknownAlert(alert_id))?;

        if !authorized(&self.registry, alert, actor) {
            return Err(LifecycleError::Forbidden {
                actor: actor.id,
                role: actor.role,
            });
        }

        let from = alert.status;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        alert.status = to;
        alert.updated_at = now;
        match to {
            AlertStatus::InProgress => alert.acknowledged_at = Some(now),
            AlertStatus::Resolved | AlertStatus::FalseAlarm => {
                alert.resolved_at = Some(now);
                alert.resolved_by = Some(actor.id);
                if notes.is_some() {
                    alert.notes = notes;
                }
            }
            AlertStatus::New => {}
        }

        let updated = alert.clone();
        if to.is_terminal() {
            table.open_by_device.remove(&updated.device_id);
        }
        drop(table);

        info!(
            "Alert {}: {:?} -> {:?} by {} ({:?})",
            alert_id, from, to, actor.id, actor.role
        );
        self.emit(EngineEvent::StatusChanged {
            alert_id,
            old_status: from,
            new_status: to,
            actor_id: actor.id,
        });

        Ok(updated)
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, AlertTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
