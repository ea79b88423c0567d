use std::path::PathBuf;

use rollcall_config::{ResolvedConfig, ResolvedConfigWithSource};
use rollcall_face_core::engine::EngineSettings;
use rollcall_face_core::faces::{EnvGalleryPathResolver, GalleryPathResolver};
use serde::Serialize;

use crate::errors::AppResult;

pub fn load_settings() -> AppResult<ResolvedConfigWithSource> {
    load_settings_from(&rollcall_config::default_config_paths())
}

pub fn load_settings_from(paths: &[PathBuf]) -> AppResult<ResolvedConfigWithSource> {
    let loaded = rollcall_config::load_resolved_from_paths(paths)?;
    match &loaded.source {
        Some(path) => tracing::debug!(path = %path.display(), "configuration loaded"),
        None => tracing::debug!("no configuration file found; using defaults"),
    }
    Ok(loaded)
}

/// `--gallery`, then `$ROLLCALL_GALLERY_PATH`, then `gallery_path` from the
/// config file.
pub fn resolve_gallery_path(cli_value: Option<PathBuf>, config: &ResolvedConfig) -> PathBuf {
    EnvGalleryPathResolver {
        configured: config.gallery_path.clone(),
    }
    .resolve(cli_value.as_deref())
}

/// Serializable view of the effective configuration for `config show`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigReport {
    pub source: Option<String>,
    pub face_recognition_threshold: f64,
    pub liveness_threshold: f64,
    pub blink_threshold: f64,
    pub head_pose_threshold: f64,
    pub min_liveness_frames: usize,
    pub min_liveness_span_ms: u128,
    pub min_closed_frames: usize,
    pub blink_weight: f64,
    pub pose_weight: f64,
    pub distance_metric: &'static str,
    pub threshold_max: f64,
    pub duplicate_distance: f64,
    pub embedding_dimension: Option<usize>,
    pub extractor_timeout_ms: u128,
    pub detector_timeout_ms: u128,
    pub mask_timeout_ms: u128,
    pub alert_timeout_ms: u128,
    pub gallery_path: String,
}

impl From<&ResolvedConfigWithSource> for ConfigReport {
    fn from(loaded: &ResolvedConfigWithSource) -> Self {
        let config = &loaded.resolved;
        let engine = EngineSettings::from(config);
        Self {
            source: loaded
                .source
                .as_ref()
                .map(|path| path.display().to_string()),
            face_recognition_threshold: config.face_recognition_threshold,
            liveness_threshold: config.liveness_threshold,
            blink_threshold: config.blink_threshold,
            head_pose_threshold: config.head_pose_threshold,
            min_liveness_frames: config.min_liveness_frames,
            min_liveness_span_ms: config.min_liveness_span.as_millis(),
            min_closed_frames: config.min_closed_frames,
            blink_weight: config.blink_weight,
            pose_weight: config.pose_weight,
            distance_metric: engine.gallery.metric.name(),
            threshold_max: config.threshold_max,
            duplicate_distance: config.duplicate_distance,
            embedding_dimension: config.embedding_dimension,
            extractor_timeout_ms: config.extractor_timeout.as_millis(),
            detector_timeout_ms: config.detector_timeout.as_millis(),
            mask_timeout_ms: config.mask_timeout.as_millis(),
            alert_timeout_ms: config.alert_timeout.as_millis(),
            gallery_path: config.gallery_path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn cli_value_wins_over_config() {
        let config = ResolvedConfig::default();
        let chosen = resolve_gallery_path(Some(PathBuf::from("/tmp/custom.json")), &config);
        assert_eq!(chosen, PathBuf::from("/tmp/custom.json"));
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load_settings_from(&[dir.path().join("absent.toml")]).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.resolved, ResolvedConfig::default());
    }

    #[test]
    fn report_reflects_file_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "distance_metric = \"cosine\"\nthreshold_max = 0.4\nduplicate_distance = 0.1\n",
        )
        .unwrap();

        let loaded = load_settings_from(&[path.clone()]).unwrap();
        let report = ConfigReport::from(&loaded);
        assert_eq!(report.source, Some(path.display().to_string()));
        assert_eq!(report.distance_metric, "cosine");
        assert_eq!(report.threshold_max, 0.4);
    }

    #[test]
    fn invalid_values_are_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "liveness_threshold = 1.5\n").unwrap();

        let err = load_settings_from(&[path]).unwrap_err();
        assert!(err.to_string().contains("liveness_threshold"));
    }
}
