//! Attendance ledger: at most one record per identity and calendar day.
//!
//! Commits for the same (identity, date) race on the map entry for that key.
//! The map is sharded, so unrelated identities never wait on each other.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::decision::{LivenessStatus, Outcome, Status};
use crate::errors::{AppError, AppResult};
use crate::mask::MaskStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub identity: Uuid,
    pub date: NaiveDate,
    pub outcome: Uuid,
    pub mask_status: MaskStatus,
    pub liveness_status: LivenessStatus,
    pub confidence_score: f64,
    pub liveness_score: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AttendanceLedger {
    records: DashMap<(Uuid, NaiveDate), AttendanceRecord>,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a present outcome for `date`. Exactly one concurrent caller
    /// per key succeeds; the others get [`AppError::AlreadyMarked`].
    pub fn commit(&self, outcome: &Outcome, date: NaiveDate) -> AppResult<AttendanceRecord> {
        let identity = match (outcome.status, outcome.identity) {
            (Status::Present, Some(identity)) => identity,
            (Status::Rejected, _) => {
                return Err(AppError::IneligibleOutcome {
                    outcome: outcome.id,
                    reason: format!("status is rejected ({})", outcome.rule),
                })
            }
            (Status::Present, None) => {
                return Err(AppError::IneligibleOutcome {
                    outcome: outcome.id,
                    reason: "no identity attached".into(),
                })
            }
        };

        match self.records.entry((identity, date)) {
            Entry::Occupied(_) => Err(AppError::AlreadyMarked { identity, date }),
            Entry::Vacant(slot) => {
                let record = AttendanceRecord {
                    id: Uuid::new_v4(),
                    identity,
                    date,
                    outcome: outcome.id,
                    mask_status: outcome.mask_status,
                    liveness_status: outcome.liveness_status,
                    confidence_score: outcome.confidence_score,
                    liveness_score: outcome.liveness_score,
                    recorded_at: Utc::now(),
                };
                slot.insert(record.clone());
                info!(%identity, %date, record = %record.id, "attendance recorded");
                Ok(record)
            }
        }
    }

    pub fn get(&self, identity: Uuid, date: NaiveDate) -> Option<AttendanceRecord> {
        self.records
            .get(&(identity, date))
            .map(|entry| entry.value().clone())
    }

    pub fn records_on(&self, date: NaiveDate) -> Vec<AttendanceRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.key().1 == date)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        records
    }

    /// Removes records dated before `cutoff`.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let before = self.records.len();
        self.records.retain(|(_, date), _| *date >= cutoff);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
