//! Offline runs of the decision pipeline over JSON payloads produced by the
//! external extractor and landmark detector.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rollcall_face_core::alerts::{AlertEmitter, AnomalyAlert, TracingAlertEmitter};
use rollcall_face_core::boundary::{call_with_timeout, ALERT_STAGE};
use rollcall_face_core::decision::{DecisionEngine, Outcome};
use rollcall_face_core::engine::{AlertDelivery, EngineSettings};
use rollcall_face_core::faces::{
    ensure_valid_faces, load_frames, load_payload, DistanceMetric, EmbeddingStore,
    FilesystemGalleryStore, GallerySettings, GalleryStore, MatchResult,
};
use rollcall_face_core::liveness::{LivenessAnalyzer, LivenessSettings, LivenessVerdict};
use rollcall_face_core::mask::MaskStatus;
use serde::Serialize;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub embedding: PathBuf,
    pub gallery: PathBuf,
    pub settings: GallerySettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub probe: PathBuf,
    pub gallery_path: PathBuf,
    pub gallery_identities: usize,
    #[serde(rename = "match")]
    pub result: MatchResult,
    #[serde(skip)]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub frames: PathBuf,
    pub settings: LivenessSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessOutcome {
    pub frames_path: PathBuf,
    pub verdict: LivenessVerdict,
    #[serde(skip)]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DecideConfig {
    pub embedding: PathBuf,
    pub frames: PathBuf,
    pub mask: Option<MaskStatus>,
    pub gallery: PathBuf,
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecideOutcome {
    pub outcome: Outcome,
    #[serde(rename = "match")]
    pub matched: MatchResult,
    pub liveness: LivenessVerdict,
    pub alert: Option<AnomalyAlert>,
    pub alert_delivery: AlertDelivery,
    #[serde(skip)]
    pub logs: Vec<String>,
}

pub fn run_match(config: &MatchConfig) -> AppResult<MatchOutcome> {
    run_match_with(config, &FilesystemGalleryStore)
}

pub fn run_match_with<S>(config: &MatchConfig, store: &S) -> AppResult<MatchOutcome>
where
    S: GalleryStore,
{
    let mut logs = Vec::new();
    let probe = load_probe(&config.embedding, config.settings.metric, &mut logs)?;
    let gallery = load_gallery(&config.gallery, config.settings, store, &mut logs)?;

    let result = gallery.match_embedding(&probe)?;
    match (&result.identity, result.distance) {
        (Some(identity), Some(distance)) => logs.push(format!(
            "Matched identity {identity} at distance {distance:.4} (confidence {:.2})",
            result.confidence
        )),
        (None, Some(distance)) => logs.push(format!(
            "No identity within {:.2}; closest distance {distance:.4}",
            config.settings.threshold_max
        )),
        _ => logs.push("Gallery has no active identities".into()),
    }

    Ok(MatchOutcome {
        probe: config.embedding.clone(),
        gallery_path: config.gallery.clone(),
        gallery_identities: gallery.len(),
        result,
        logs,
    })
}

pub fn run_liveness(config: &LivenessConfig) -> AppResult<LivenessOutcome> {
    let frames = load_frames(&config.frames)?;
    let verdict = LivenessAnalyzer::new(config.settings).evaluate(&frames)?;
    let logs = vec![
        format!(
            "Evaluated {} frame(s) spanning {} ms from {}",
            verdict.frames,
            verdict.span_ms,
            config.frames.display()
        ),
        format!(
            "Blinks: {}, pose deviation: {:.1} deg",
            verdict.blink_count, verdict.pose_deviation
        ),
    ];
    Ok(LivenessOutcome {
        frames_path: config.frames.clone(),
        verdict,
        logs,
    })
}

pub fn run_decide(config: &DecideConfig) -> AppResult<DecideOutcome> {
    run_decide_with(config, &FilesystemGalleryStore, Arc::new(TracingAlertEmitter))
}

pub fn run_decide_with<S>(
    config: &DecideConfig,
    store: &S,
    emitter: Arc<dyn AlertEmitter>,
) -> AppResult<DecideOutcome>
where
    S: GalleryStore,
{
    let mut logs = Vec::new();
    let probe = load_probe(&config.embedding, config.settings.gallery.metric, &mut logs)?;
    let gallery = load_gallery(&config.gallery, config.settings.gallery, store, &mut logs)?;
    let matched = gallery.match_embedding(&probe)?;

    let frames = load_frames(&config.frames)?;
    let liveness = LivenessAnalyzer::new(config.settings.liveness).evaluate(&frames)?;
    logs.push(format!(
        "Liveness {} (score {:.2}, {})",
        if liveness.is_live { "passed" } else { "failed" },
        liveness.score,
        liveness.reason
    ));

    let outcome = DecisionEngine::new(config.settings.policy).decide(&matched, &liveness, config.mask);
    logs.push(format!(
        "Decision: {} via rule {}",
        outcome.status.as_str(),
        outcome.rule
    ));

    let alert = outcome.alert();
    let alert_delivery = match &alert {
        None => AlertDelivery::NotRequired,
        Some(alert) => {
            let delivered = alert.clone();
            match call_with_timeout(ALERT_STAGE, config.settings.alert_timeout, move || {
                emitter.emit(&delivered)
            }) {
                Ok(()) => AlertDelivery::Delivered,
                Err(err) => {
                    logs.push(format!("Alert {} not delivered: {err}", alert.id));
                    AlertDelivery::Failed(err.to_string())
                }
            }
        }
    };

    Ok(DecideOutcome {
        outcome,
        matched,
        liveness,
        alert,
        alert_delivery,
        logs,
    })
}

fn load_probe(
    path: &Path,
    metric: DistanceMetric,
    logs: &mut Vec<String>,
) -> AppResult<Vec<f64>> {
    let payload = load_payload(path)?;
    let len = ensure_valid_faces(&payload.faces, path, metric)?;
    if payload.faces.len() > 1 {
        logs.push(format!(
            "Payload {} has {} faces; using the first",
            path.display(),
            payload.faces.len()
        ));
    }
    logs.push(format!("Loaded probe embedding of length {len}"));
    payload
        .faces
        .into_iter()
        .next()
        .map(|face| face.embedding)
        .ok_or_else(|| AppError::InvalidFeatureFile {
            path: path.to_path_buf(),
            message: "contains no face embeddings".into(),
        })
}

fn load_gallery<S>(
    path: &Path,
    settings: GallerySettings,
    store: &S,
    logs: &mut Vec<String>,
) -> AppResult<EmbeddingStore>
where
    S: GalleryStore,
{
    let records = store.load(path)?;
    let gallery = EmbeddingStore::from_records(settings, &records)?;
    logs.push(format!(
        "Loaded gallery {} ({} identities)",
        path.display(),
        gallery.len()
    ));
    Ok(gallery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use rollcall_face_core::alerts::AnomalyType;
    use rollcall_face_core::boundary::BoundaryError;
    use rollcall_face_core::decision::Status;
    use rollcall_face_core::faces::EnrolledEmbedding;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[derive(Default)]
    struct CollectingEmitter(Mutex<Vec<AnomalyAlert>>);

    impl AlertEmitter for CollectingEmitter {
        fn emit(&self, alert: &AnomalyAlert) -> Result<(), BoundaryError> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct DownEmitter;

    impl AlertEmitter for DownEmitter {
        fn emit(&self, _alert: &AnomalyAlert) -> Result<(), BoundaryError> {
            Err(BoundaryError::Failed("webhook unreachable".into()))
        }
    }

    struct StalledEmitter;

    impl AlertEmitter for StalledEmitter {
        fn emit(&self, _alert: &AnomalyAlert) -> Result<(), BoundaryError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        }
    }

    fn still_face_config(fx: &Fixture) -> DecideConfig {
        DecideConfig {
            embedding: fx.probe.clone(),
            frames: fx.frames_still.clone(),
            mask: None,
            gallery: fx.gallery.clone(),
            settings: EngineSettings::default(),
        }
    }

    struct Fixture {
        _tmp: TempDir,
        probe: PathBuf,
        frames_live: PathBuf,
        frames_still: PathBuf,
        gallery: PathBuf,
        identity: Uuid,
    }

    fn frames_json(ears: [f64; 6], yaws: [f64; 6]) -> String {
        let frames: Vec<_> = (0..6)
            .map(|i| {
                serde_json::json!({
                    "left_ear": ears[i], "right_ear": ears[i],
                    "yaw": yaws[i], "pitch": 0.0, "roll": 0.0,
                    "timestamp_ms": i * 250,
                })
            })
            .collect();
        serde_json::json!({ "frames": frames }).to_string()
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let probe = tmp.path().join("probe.json");
        fs::write(&probe, r#"{"faces":[{"embedding":[0.1,0.2,0.3]}]}"#).unwrap();

        let frames_live = tmp.path().join("live.json");
        fs::write(
            &frames_live,
            frames_json(
                [0.3, 0.3, 0.1, 0.3, 0.3, 0.3],
                [0.0, 4.0, 8.0, 12.0, 16.0, 20.0],
            ),
        )
        .unwrap();
        let frames_still = tmp.path().join("still.json");
        fs::write(&frames_still, frames_json([0.3; 6], [0.0; 6])).unwrap();

        let identity = Uuid::new_v4();
        let gallery = tmp.path().join("gallery.json");
        FilesystemGalleryStore
            .save(
                &gallery,
                &[EnrolledEmbedding {
                    id: Uuid::new_v4(),
                    identity,
                    label: "Ada".into(),
                    active: true,
                    embedding: vec![0.1, 0.2, 0.3],
                    source: None,
                    created_at: "2024-01-01T00:00:00.000Z".into(),
                }],
            )
            .unwrap();

        Fixture {
            _tmp: tmp,
            probe,
            frames_live,
            frames_still,
            gallery,
            identity,
        }
    }

    #[test]
    fn match_finds_enrolled_identity() {
        let fx = fixture();
        let outcome = run_match(&MatchConfig {
            embedding: fx.probe.clone(),
            gallery: fx.gallery.clone(),
            settings: GallerySettings::default(),
        })
        .unwrap();
        assert_eq!(outcome.result.identity, Some(fx.identity));
        assert_eq!(outcome.result.confidence, 1.0);
        assert_eq!(outcome.gallery_identities, 1);
    }

    #[test]
    fn live_sequence_passes() {
        let fx = fixture();
        let outcome = run_liveness(&LivenessConfig {
            frames: fx.frames_live.clone(),
            settings: LivenessSettings::default(),
        })
        .unwrap();
        assert!(outcome.verdict.is_live);
    }

    #[test]
    fn decide_marks_live_match_present() {
        let fx = fixture();
        let emitter = Arc::new(CollectingEmitter::default());
        let outcome = run_decide_with(
            &DecideConfig {
                embedding: fx.probe.clone(),
                frames: fx.frames_live.clone(),
                mask: Some(MaskStatus::WithoutMask),
                gallery: fx.gallery.clone(),
                settings: EngineSettings::default(),
            },
            &FilesystemGalleryStore,
            emitter.clone(),
        )
        .unwrap();
        assert_eq!(outcome.outcome.status, Status::Present);
        assert_eq!(outcome.outcome.mask_status, MaskStatus::WithoutMask);
        assert!(outcome.alert.is_none());
        assert_eq!(outcome.alert_delivery, AlertDelivery::NotRequired);
        assert!(emitter.0.lock().unwrap().is_empty());
    }

    #[test]
    fn decide_emits_alert_for_still_face() {
        let fx = fixture();
        let emitter = Arc::new(CollectingEmitter::default());
        let outcome =
            run_decide_with(&still_face_config(&fx), &FilesystemGalleryStore, emitter.clone())
                .unwrap();
        assert_eq!(outcome.outcome.status, Status::Rejected);
        assert_eq!(outcome.outcome.anomaly_type, Some(AnomalyType::SpoofAttempt));
        assert_eq!(outcome.alert_delivery, AlertDelivery::Delivered);
        assert_eq!(emitter.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_alert_delivery_is_reported_in_json() {
        let fx = fixture();
        let outcome =
            run_decide_with(&still_face_config(&fx), &FilesystemGalleryStore, Arc::new(DownEmitter))
                .unwrap();
        assert!(outcome.alert.is_some());
        assert!(matches!(
            &outcome.alert_delivery,
            AlertDelivery::Failed(message) if message.contains("webhook unreachable")
        ));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["alert_delivery"]["delivery"], "failed");
        assert!(json["alert_delivery"]["error"]
            .as_str()
            .unwrap()
            .contains("webhook unreachable"));
    }

    #[test]
    fn stalled_alert_emitter_is_abandoned_after_timeout() {
        let fx = fixture();
        let mut config = still_face_config(&fx);
        config.settings.alert_timeout = Duration::from_millis(20);

        let outcome =
            run_decide_with(&config, &FilesystemGalleryStore, Arc::new(StalledEmitter)).unwrap();
        assert_eq!(outcome.outcome.status, Status::Rejected);
        assert!(matches!(outcome.alert_delivery, AlertDelivery::Failed(_)));
        assert!(outcome.logs.iter().any(|line| line.contains("not delivered")));
    }

    #[test]
    fn wrong_dimension_probe_is_rejected() {
        let fx = fixture();
        let probe = fx.probe.with_file_name("short.json");
        fs::write(&probe, r#"{"faces":[{"embedding":[0.1,0.2]}]}"#).unwrap();
        let err = run_match(&MatchConfig {
            embedding: probe,
            gallery: fx.gallery.clone(),
            settings: GallerySettings::default(),
        })
        .unwrap_err();
        assert!(err.is_invalid_input());
    }
}
