use chrono::NaiveDate;
use serde::Serialize;

use crate::alerts::AlertLedger;
use crate::decision::LivenessStatus;
use crate::faces::EmbeddingStore;
use crate::ledger::AttendanceLedger;
use crate::mask::MaskStatus;

/// Attendance figures for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub active_identities: usize,
    pub present: usize,
    /// Active identities without a record that day.
    pub absent: usize,
    /// Percentage of the day's records captured with a mask; 0 without records.
    pub mask_compliance: f64,
    /// Percentage of the day's records whose liveness check passed.
    pub liveness_success: f64,
    pub open_alerts: usize,
}

impl DailySummary {
    pub fn compute(
        store: &EmbeddingStore,
        ledger: &AttendanceLedger,
        alerts: &AlertLedger,
        date: NaiveDate,
    ) -> Self {
        let snapshot = store.snapshot();
        let active_identities = snapshot.active_count();
        let records = ledger.records_on(date);
        let present = records.len();
        let present_active = records
            .iter()
            .filter(|record| {
                snapshot
                    .identity(record.identity)
                    .is_some_and(|identity| identity.active)
            })
            .count();

        let percentage = |count: usize| {
            if present == 0 {
                0.0
            } else {
                count as f64 / present as f64 * 100.0
            }
        };
        let masked = records
            .iter()
            .filter(|record| record.mask_status == MaskStatus::WithMask)
            .count();
        let live = records
            .iter()
            .filter(|record| record.liveness_status == LivenessStatus::Live)
            .count();
        let open_alerts = alerts
            .raised_on(date)
            .iter()
            .filter(|alert| alert.is_open())
            .count();

        Self {
            date,
            active_identities,
            present,
            absent: active_identities.saturating_sub(present_active),
            mask_compliance: percentage(masked),
            liveness_success: percentage(live),
            open_alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::decision::DecisionEngine;
    use crate::faces::{EnrollmentRequest, GallerySettings, MatchResult};
    use crate::liveness::{LivenessReason, LivenessVerdict};

    fn enroll(store: &EmbeddingStore, embedding: Vec<f64>) -> Uuid {
        let identity = Uuid::new_v4();
        store
            .enroll(EnrollmentRequest {
                identity,
                label: None,
                embedding,
                source: None,
            })
            .unwrap();
        identity
    }

    #[test]
    fn summary_counts_present_absent_and_masks() {
        let store = EmbeddingStore::new(GallerySettings::default());
        let ada = enroll(&store, vec![1.0, 0.0, 0.0]);
        let bob = enroll(&store, vec![0.0, 1.0, 0.0]);
        enroll(&store, vec![0.0, 0.0, 1.0]);

        let ledger = AttendanceLedger::new();
        let alerts = AlertLedger::new();
        let today = Utc::now().date_naive();
        let engine = DecisionEngine::default();
        let live = LivenessVerdict::external(true, 0.9, LivenessReason::Ok);

        let masked = engine.decide(&MatchResult::known(ada, 0.9), &live, Some(MaskStatus::WithMask));
        let bare = engine.decide(&MatchResult::known(bob, 0.9), &live, Some(MaskStatus::WithoutMask));
        ledger.commit(&masked, today).unwrap();
        ledger.commit(&bare, today).unwrap();

        let spoof = engine.decide(
            &MatchResult::unknown(),
            &LivenessVerdict::external(false, 0.0, LivenessReason::NoBlinkNoMotion),
            None,
        );
        alerts.record(spoof.alert().unwrap());

        let summary = DailySummary::compute(&store, &ledger, &alerts, today);
        assert_eq!(summary.active_identities, 3);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.absent, 1);
        assert!((summary.mask_compliance - 50.0).abs() < 1e-9);
        assert!((summary.liveness_success - 100.0).abs() < 1e-9);
        assert_eq!(summary.open_alerts, 1);
    }

    #[test]
    fn records_of_inactive_identities_do_not_hide_absences() {
        let store = EmbeddingStore::new(GallerySettings::default());
        let ada = enroll(&store, vec![1.0, 0.0, 0.0]);
        enroll(&store, vec![0.0, 1.0, 0.0]);
        let carl = enroll(&store, vec![0.0, 0.0, 1.0]);

        let ledger = AttendanceLedger::new();
        let today = Utc::now().date_naive();
        let engine = DecisionEngine::default();
        let live = LivenessVerdict::external(true, 0.9, LivenessReason::Ok);
        ledger
            .commit(&engine.decide(&MatchResult::known(carl, 0.9), &live, None), today)
            .unwrap();
        ledger
            .commit(&engine.decide(&MatchResult::known(Uuid::new_v4(), 0.9), &live, None), today)
            .unwrap();
        store.set_active(carl, false).unwrap();

        let summary = DailySummary::compute(&store, &ledger, &AlertLedger::new(), today);
        assert_eq!(summary.active_identities, 2);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.absent, 2);

        ledger
            .commit(&engine.decide(&MatchResult::known(ada, 0.9), &live, None), today)
            .unwrap();
        let summary = DailySummary::compute(&store, &ledger, &AlertLedger::new(), today);
        assert_eq!(summary.absent, 1);
    }

    #[test]
    fn empty_day_has_zero_rates() {
        let store = EmbeddingStore::new(GallerySettings::default());
        let summary = DailySummary::compute(
            &store,
            &AttendanceLedger::new(),
            &AlertLedger::new(),
            Utc::now().date_naive(),
        );
        assert_eq!(summary.present, 0);
        assert_eq!(summary.mask_compliance, 0.0);
    }
}
