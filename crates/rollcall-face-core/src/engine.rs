//! One recognition attempt end to end: extract, match, sample, evaluate,
//! classify, decide, commit and alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rollcall_config::ResolvedConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alerts::{AlertEmitter, AlertLedger, AnomalyAlert, TracingAlertEmitter};
use crate::boundary::{
    call_with_timeout, CapturedImage, EmbeddingExtractor, LandmarkDetector, ALERT_STAGE,
    DETECTOR_STAGE, EXTRACTOR_STAGE, MASK_STAGE,
};
use crate::decision::{DecisionEngine, DecisionPolicy, Outcome};
use crate::errors::{AppError, AppResult};
use crate::faces::{BoundingBox, DistanceMetric, EmbeddingStore, GallerySettings, MatchResult};
use crate::ledger::{AttendanceLedger, AttendanceRecord};
use crate::liveness::{FrameSample, LivenessAnalyzer, LivenessSettings, LivenessVerdict};
use crate::mask::{MaskClassifier, MaskStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub gallery: GallerySettings,
    pub liveness: LivenessSettings,
    pub policy: DecisionPolicy,
    pub extractor_timeout: Duration,
    pub detector_timeout: Duration,
    pub mask_timeout: Duration,
    pub alert_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ResolvedConfig::default())
    }
}

impl From<&ResolvedConfig> for EngineSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            gallery: GallerySettings {
                metric: DistanceMetric::from(config.distance_metric),
                threshold_max: config.threshold_max,
                duplicate_distance: config.duplicate_distance,
                dimension: config.embedding_dimension,
            },
            liveness: LivenessSettings {
                liveness_threshold: config.liveness_threshold,
                blink_threshold: config.blink_threshold,
                head_pose_threshold: config.head_pose_threshold,
                min_frames: config.min_liveness_frames,
                min_span: config.min_liveness_span,
                min_closed_frames: config.min_closed_frames,
                blink_weight: config.blink_weight,
                pose_weight: config.pose_weight,
            },
            policy: DecisionPolicy {
                face_recognition_threshold: config.face_recognition_threshold,
                liveness_threshold: config.liveness_threshold,
            },
            extractor_timeout: config.extractor_timeout,
            detector_timeout: config.detector_timeout,
            mask_timeout: config.mask_timeout,
            alert_timeout: config.alert_timeout,
        }
    }
}

/// Input for one attempt: the probe image, the liveness frames captured
/// around it and the attendance day it counts for.
#[derive(Debug, Clone)]
pub struct RecognitionAttempt {
    pub probe: CapturedImage,
    pub frames: Vec<CapturedImage>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum AttendanceStatus {
    Committed(AttendanceRecord),
    /// Someone (possibly a concurrent attempt) already marked this day.
    AlreadyMarked(Option<AttendanceRecord>),
    NotEligible,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "delivery", content = "error", rename_all = "snake_case")]
pub enum AlertDelivery {
    NotRequired,
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub outcome: Outcome,
    #[serde(rename = "match")]
    pub matched: MatchResult,
    pub liveness: LivenessVerdict,
    pub attendance: AttendanceStatus,
    pub alert: Option<AnomalyAlert>,
    pub alert_delivery: AlertDelivery,
}

pub struct AttendanceEngine {
    settings: EngineSettings,
    gallery: Arc<EmbeddingStore>,
    analyzer: LivenessAnalyzer,
    decisions: DecisionEngine,
    ledger: Arc<AttendanceLedger>,
    alerts: Arc<AlertLedger>,
    extractor: Arc<dyn EmbeddingExtractor>,
    detector: Arc<dyn LandmarkDetector>,
    mask: Option<Arc<dyn MaskClassifier>>,
    emitter: Arc<dyn AlertEmitter>,
}

impl AttendanceEngine {
    pub fn new(
        settings: EngineSettings,
        gallery: Arc<EmbeddingStore>,
        extractor: Arc<dyn EmbeddingExtractor>,
        detector: Arc<dyn LandmarkDetector>,
    ) -> Self {
        Self {
            settings,
            gallery,
            analyzer: LivenessAnalyzer::new(settings.liveness),
            decisions: DecisionEngine::new(settings.policy),
            ledger: Arc::new(AttendanceLedger::new()),
            alerts: Arc::new(AlertLedger::new()),
            extractor,
            detector,
            mask: None,
            emitter: Arc::new(TracingAlertEmitter),
        }
    }

    pub fn with_mask_classifier(mut self, classifier: Arc<dyn MaskClassifier>) -> Self {
        self.mask = Some(classifier);
        self
    }

    pub fn with_alert_emitter(mut self, emitter: Arc<dyn AlertEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_ledgers(mut self, ledger: Arc<AttendanceLedger>, alerts: Arc<AlertLedger>) -> Self {
        self.ledger = ledger;
        self.alerts = alerts;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn gallery(&self) -> &Arc<EmbeddingStore> {
        &self.gallery
    }

    pub fn ledger(&self) -> &Arc<AttendanceLedger> {
        &self.ledger
    }

    pub fn alerts(&self) -> &Arc<AlertLedger> {
        &self.alerts
    }

    /// Runs one attempt. Errors mean no outcome was produced; anomalies are
    /// reported inside the returned report.
    pub fn process(&self, attempt: RecognitionAttempt) -> AppResult<AttemptReport> {
        if attempt.frames.is_empty() {
            return Err(AppError::InvalidInput(
                "recognition attempt has no liveness frames".into(),
            ));
        }

        let extractor = Arc::clone(&self.extractor);
        let probe = attempt.probe.clone();
        let face = call_with_timeout(EXTRACTOR_STAGE, self.settings.extractor_timeout, move || {
            extractor.extract(&probe)
        })?;

        let matched = self.gallery.match_embedding(&face.embedding)?;
        let samples = self.sample_frames(&attempt.frames)?;
        let liveness = self.analyzer.evaluate(&samples)?;
        let mask = self.classify_mask(&attempt.probe, face.bounding_box);

        Ok(self.conclude(matched, liveness, mask, attempt.date))
    }

    /// Decides, commits and alerts for verdicts obtained elsewhere.
    pub fn conclude(
        &self,
        matched: MatchResult,
        liveness: LivenessVerdict,
        mask: Option<MaskStatus>,
        date: NaiveDate,
    ) -> AttemptReport {
        let outcome = self.decisions.decide(&matched, &liveness, mask);
        let attendance = self.commit(&outcome, date);
        let (alert, alert_delivery) = self.raise_alert(&outcome);

        AttemptReport {
            outcome,
            matched,
            liveness,
            attendance,
            alert,
            alert_delivery,
        }
    }

    fn sample_frames(&self, frames: &[CapturedImage]) -> AppResult<Vec<FrameSample>> {
        let mut samples = Vec::with_capacity(frames.len());
        for frame in frames {
            let detector = Arc::clone(&self.detector);
            let image = frame.clone();
            match call_with_timeout(DETECTOR_STAGE, self.settings.detector_timeout, move || {
                detector.sample(&image)
            }) {
                Ok(sample) => samples.push(sample),
                Err(AppError::NoFaceFound { .. }) => {
                    debug!(timestamp_ms = frame.timestamp_ms, "frame without a face skipped")
                }
                Err(err) => return Err(err),
            }
        }
        if samples.is_empty() {
            return Err(AppError::NoFaceFound {
                stage: DETECTOR_STAGE,
            });
        }
        Ok(samples)
    }

    fn classify_mask(&self, probe: &CapturedImage, face: Option<BoundingBox>) -> Option<MaskStatus> {
        let classifier = Arc::clone(self.mask.as_ref()?);
        let image = probe.clone();
        match call_with_timeout(MASK_STAGE, self.settings.mask_timeout, move || {
            classifier.classify(&image, face)
        }) {
            Ok(status) => Some(status),
            Err(err) => {
                warn!(error = %err, "mask classification unavailable");
                Some(MaskStatus::Unknown)
            }
        }
    }

    fn commit(&self, outcome: &Outcome, date: NaiveDate) -> AttendanceStatus {
        if !outcome.is_present() {
            return AttendanceStatus::NotEligible;
        }
        match self.ledger.commit(outcome, date) {
            Ok(record) => AttendanceStatus::Committed(record),
            Err(AppError::AlreadyMarked { identity, date }) => {
                info!(%identity, %date, "attendance already marked");
                AttendanceStatus::AlreadyMarked(self.ledger.get(identity, date))
            }
            Err(err) => {
                warn!(error = %err, outcome = %outcome.id, "outcome could not be committed");
                AttendanceStatus::NotEligible
            }
        }
    }

    fn raise_alert(&self, outcome: &Outcome) -> (Option<AnomalyAlert>, AlertDelivery) {
        let Some(alert) = outcome.alert() else {
            return (None, AlertDelivery::NotRequired);
        };
        if !self.alerts.record(alert.clone()) {
            debug!(outcome_id = %outcome.id, "alert already raised for outcome");
            return (None, AlertDelivery::NotRequired);
        }

        let emitter = Arc::clone(&self.emitter);
        let delivered = alert.clone();
        let delivery = match call_with_timeout(ALERT_STAGE, self.settings.alert_timeout, move || {
            emitter.emit(&delivered)
        }) {
            Ok(()) => AlertDelivery::Delivered,
            Err(err) => {
                warn!(alert_id = %alert.id, error = %err, "anomaly alert not delivered");
                AlertDelivery::Failed(err.to_string())
            }
        };
        (Some(alert), delivery)
    }
}
