//! Anomaly alerts, their open/resolved lifecycle and the emitter contract.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::boundary::BoundaryError;
use crate::decision::Outcome;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    SpoofAttempt,
    UnknownPerson,
}

impl AnomalyType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyType::SpoofAttempt => "spoof_attempt",
            AnomalyType::UnknownPerson => "unknown_person",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlertState {
    Open,
    Resolved {
        resolved_by: String,
        resolved_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub id: Uuid,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub identity: Option<Uuid>,
    pub message: String,
    /// The decision that raised this alert, as it was at decision time.
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: AlertState,
}

impl AnomalyAlert {
    pub fn is_open(&self) -> bool {
        matches!(self.state, AlertState::Open)
    }
}

/// External notifier for anomalies. Delivery retries belong to the
/// implementation.
pub trait AlertEmitter: Send + Sync {
    fn emit(&self, alert: &AnomalyAlert) -> Result<(), BoundaryError>;
}

/// Writes each alert as a structured `warn` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertEmitter;

impl AlertEmitter for TracingAlertEmitter {
    fn emit(&self, alert: &AnomalyAlert) -> Result<(), BoundaryError> {
        warn!(
            alert_id = %alert.id,
            anomaly = alert.anomaly_type.as_str(),
            severity = alert.severity.as_str(),
            identity = ?alert.identity,
            confidence = alert.outcome.confidence_score,
            liveness = alert.outcome.liveness_score,
            "{}",
            alert.message
        );
        Ok(())
    }
}

impl<T: AlertEmitter + ?Sized> AlertEmitter for Arc<T> {
    fn emit(&self, alert: &AnomalyAlert) -> Result<(), BoundaryError> {
        (**self).emit(alert)
    }
}

/// In-memory record of raised alerts, at most one per outcome.
#[derive(Debug, Default)]
pub struct AlertLedger {
    alerts: DashMap<Uuid, AnomalyAlert>,
    by_outcome: DashMap<Uuid, Uuid>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `alert` unless its outcome already raised one. Returns whether
    /// the alert was stored.
    pub fn record(&self, alert: AnomalyAlert) -> bool {
        match self.by_outcome.entry(alert.outcome.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(alert.id);
                self.alerts.insert(alert.id, alert);
                true
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<AnomalyAlert> {
        self.alerts.get(&id).map(|entry| entry.value().clone())
    }

    pub fn resolve(&self, id: Uuid, operator: &str) -> AppResult<AnomalyAlert> {
        let operator = operator.trim();
        if operator.is_empty() {
            return Err(AppError::InvalidInput(
                "resolving operator cannot be empty".into(),
            ));
        }
        let mut alert = self.alerts.get_mut(&id).ok_or(AppError::AlertNotFound(id))?;
        if !alert.is_open() {
            return Err(AppError::AlertAlreadyResolved(id));
        }
        alert.state = AlertState::Resolved {
            resolved_by: operator.to_string(),
            resolved_at: Utc::now(),
        };
        info!(alert_id = %id, operator, "anomaly alert resolved");
        Ok(alert.clone())
    }

    /// Open alerts, newest first.
    pub fn open_alerts(&self) -> Vec<AnomalyAlert> {
        let mut open: Vec<_> = self
            .alerts
            .iter()
            .filter(|entry| entry.is_open())
            .map(|entry| entry.value().clone())
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    pub fn raised_on(&self, date: NaiveDate) -> Vec<AnomalyAlert> {
        self.alerts
            .iter()
            .filter(|entry| entry.created_at.date_naive() == date)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drops alerts resolved before `cutoff`. Open alerts are kept regardless
    /// of age, and retention counts from resolution, not creation.
    pub fn prune_resolved_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.alerts.len();
        self.alerts.retain(|_, alert| match &alert.state {
            AlertState::Open => true,
            AlertState::Resolved { resolved_at, .. } => *resolved_at >= cutoff,
        });
        self.by_outcome
            .retain(|_, alert_id| self.alerts.contains_key(alert_id));
        before - self.alerts.len()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
