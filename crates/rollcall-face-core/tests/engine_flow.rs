use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use rollcall_face_core::boundary::{BoundaryError, CapturedImage, EmbeddingExtractor, LandmarkDetector};
use rollcall_face_core::faces::{
    EmbeddingStore, EnrollmentRequest, FaceEmbeddingRecord, FilesystemGalleryStore,
    GallerySettings, GalleryStore,
};
use rollcall_face_core::{
    AlertDelivery, AlertEmitter, AnomalyAlert, AnomalyType, AppError, AttendanceEngine,
    AttendanceStatus, DailySummary, EngineSettings, FrameSample, LivenessReason,
    RecognitionAttempt, Severity, Status,
};
use tempfile::TempDir;
use uuid::Uuid;

const ADA: [f64; 4] = [0.10, 0.20, 0.30, 0.40];

struct StubExtractor {
    embedding: Vec<f64>,
    delay: Duration,
}

impl EmbeddingExtractor for StubExtractor {
    fn extract(&self, _image: &CapturedImage) -> Result<FaceEmbeddingRecord, BoundaryError> {
        thread::sleep(self.delay);
        Ok(FaceEmbeddingRecord {
            bounding_box: None,
            embedding: self.embedding.clone(),
        })
    }
}

/// Replays a scripted head: blinks on the third frame and turns left.
struct ScriptedHead {
    blink: bool,
    turn_degrees: f64,
}

impl LandmarkDetector for ScriptedHead {
    fn sample(&self, image: &CapturedImage) -> Result<FrameSample, BoundaryError> {
        let index = image.timestamp_ms / 250;
        let ear = if self.blink && index == 2 { 0.1 } else { 0.3 };
        Ok(FrameSample {
            left_ear: ear,
            right_ear: ear,
            yaw: self.turn_degrees * index as f64 / 5.0,
            pitch: 0.0,
            roll: 0.0,
            timestamp_ms: image.timestamp_ms,
        })
    }
}

#[derive(Default)]
struct RecordingEmitter {
    emitted: Mutex<Vec<AnomalyAlert>>,
}

impl AlertEmitter for RecordingEmitter {
    fn emit(&self, alert: &AnomalyAlert) -> Result<(), BoundaryError> {
        self.emitted.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

struct BrokenEmitter;

impl AlertEmitter for BrokenEmitter {
    fn emit(&self, _alert: &AnomalyAlert) -> Result<(), BoundaryError> {
        Err(BoundaryError::Failed("smtp relay refused connection".into()))
    }
}

fn gallery_with_ada() -> (Arc<EmbeddingStore>, Uuid) {
    let gallery = Arc::new(EmbeddingStore::new(GallerySettings::default()));
    let ada = Uuid::new_v4();
    gallery
        .enroll(EnrollmentRequest {
            identity: ada,
            label: Some("Ada".into()),
            embedding: ADA.to_vec(),
            source: None,
        })
        .unwrap();
    (gallery, ada)
}

fn engine(
    gallery: Arc<EmbeddingStore>,
    probe: Vec<f64>,
    head: ScriptedHead,
) -> AttendanceEngine {
    AttendanceEngine::new(
        EngineSettings::default(),
        gallery,
        Arc::new(StubExtractor {
            embedding: probe,
            delay: Duration::ZERO,
        }),
        Arc::new(head),
    )
}

fn attempt() -> RecognitionAttempt {
    RecognitionAttempt {
        probe: CapturedImage::new(vec![0u8; 16], 0),
        frames: (0..6).map(|i| CapturedImage::new(vec![0u8; 16], i * 250)).collect(),
        date: NaiveDate::from_ymd_opt(2024, 9, 16).unwrap(),
    }
}

fn live_head() -> ScriptedHead {
    ScriptedHead {
        blink: true,
        turn_degrees: 20.0,
    }
}

fn photo() -> ScriptedHead {
    ScriptedHead {
        blink: false,
        turn_degrees: 0.0,
    }
}

#[test]
fn live_enrolled_person_is_marked_present() {
    let (gallery, ada) = gallery_with_ada();
    let emitter = Arc::new(RecordingEmitter::default());
    let engine = engine(gallery, ADA.to_vec(), live_head()).with_alert_emitter(emitter.clone());

    let report = engine.process(attempt()).unwrap();
    assert_eq!(report.outcome.status, Status::Present);
    assert_eq!(report.outcome.identity, Some(ada));
    assert_eq!(report.outcome.label.as_deref(), Some("Ada"));
    assert!(!report.outcome.anomaly_flag);
    assert_eq!(report.liveness.reason, LivenessReason::Ok);
    assert!(matches!(report.attendance, AttendanceStatus::Committed(_)));
    assert_eq!(report.alert_delivery, AlertDelivery::NotRequired);
    assert!(emitter.emitted.lock().unwrap().is_empty());
}

#[test]
fn photo_of_weak_match_raises_high_severity_spoof() {
    let (gallery, _) = gallery_with_ada();
    // distance 0.33 -> confidence 0.45
    let probe = vec![0.10, 0.20, 0.30, 0.73];
    let emitter = Arc::new(RecordingEmitter::default());
    let engine = engine(gallery, probe, photo()).with_alert_emitter(emitter.clone());

    let report = engine.process(attempt()).unwrap();
    assert!((report.outcome.confidence_score - 0.45).abs() < 1e-9);
    assert_eq!(report.outcome.status, Status::Rejected);
    assert!(report.outcome.anomaly_flag);
    assert_eq!(report.outcome.anomaly_type, Some(AnomalyType::SpoofAttempt));
    assert_eq!(report.outcome.severity, Some(Severity::High));
    assert_eq!(report.attendance, AttendanceStatus::NotEligible);

    let emitted = emitter.emitted.lock().unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].outcome.id, report.outcome.id);
    assert!(engine.ledger().is_empty());
}

#[test]
fn concurrent_attempts_mark_attendance_once() {
    let (gallery, ada) = gallery_with_ada();
    let engine = engine(gallery, ADA.to_vec(), live_head());
    let barrier = Barrier::new(2);

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    engine.process(attempt()).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let committed = reports
        .iter()
        .filter(|r| matches!(r.attendance, AttendanceStatus::Committed(_)))
        .count();
    let already = reports
        .iter()
        .filter(|r| matches!(r.attendance, AttendanceStatus::AlreadyMarked(_)))
        .count();
    assert_eq!((committed, already), (1, 1));
    assert!(reports.iter().all(|r| r.alert.is_none()));
    assert!(engine.ledger().get(ada, attempt().date).is_some());
}

#[test]
fn extractor_timeout_is_unavailable_not_spoof() {
    let (gallery, _) = gallery_with_ada();
    let mut settings = EngineSettings::default();
    settings.extractor_timeout = Duration::from_millis(20);
    let engine = AttendanceEngine::new(
        settings,
        gallery,
        Arc::new(StubExtractor {
            embedding: ADA.to_vec(),
            delay: Duration::from_millis(400),
        }),
        Arc::new(photo()),
    );

    let err = engine.process(attempt()).unwrap_err();
    assert!(matches!(err, AppError::RecognitionUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(engine.alerts().is_empty());
    assert!(engine.ledger().is_empty());
}

#[test]
fn wrong_dimension_probe_is_rejected_and_gallery_untouched() {
    let (gallery, _) = gallery_with_ada();
    let version = gallery.snapshot().version();
    let engine = engine(Arc::clone(&gallery), vec![0.1, 0.2], live_head());

    let err = engine.process(attempt()).unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(gallery.snapshot().version(), version);
    assert_eq!(gallery.len(), 1);
}

#[test]
fn failed_alert_delivery_is_reported() {
    let (gallery, _) = gallery_with_ada();
    let engine = engine(gallery, ADA.to_vec(), photo()).with_alert_emitter(Arc::new(BrokenEmitter));

    let report = engine.process(attempt()).unwrap();
    assert!(report.alert.is_some());
    match report.alert_delivery {
        AlertDelivery::Failed(message) => assert!(message.contains("smtp relay")),
        other => panic!("unexpected delivery: {other:?}"),
    }
    assert_eq!(engine.alerts().open_alerts().len(), 1);
}

#[test]
fn gallery_file_feeds_engine_and_summary() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("gallery.json");
    let (seed, ada) = gallery_with_ada();
    FilesystemGalleryStore.save(&path, &seed.to_records()).unwrap();

    let records = FilesystemGalleryStore.load(&path).unwrap();
    let gallery = Arc::new(EmbeddingStore::from_records(GallerySettings::default(), &records).unwrap());
    let engine = engine(Arc::clone(&gallery), ADA.to_vec(), live_head());
    let report = engine.process(attempt()).unwrap();
    assert_eq!(report.outcome.identity, Some(ada));

    let summary = DailySummary::compute(&gallery, engine.ledger(), engine.alerts(), attempt().date);
    assert_eq!(summary.present, 1);
    assert_eq!(summary.absent, 0);
}
