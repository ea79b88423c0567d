use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/rollcall/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/rollcall/config.toml";
pub const DEFAULT_GALLERY_PATH: &str = "/var/lib/rollcall/gallery.json";

pub const DEFAULT_FACE_RECOGNITION_THRESHOLD: f64 = 0.5;
pub const DEFAULT_LIVENESS_THRESHOLD: f64 = 0.3;
pub const DEFAULT_BLINK_THRESHOLD: f64 = 0.25;
pub const DEFAULT_HEAD_POSE_THRESHOLD: f64 = 15.0;
pub const DEFAULT_MIN_LIVENESS_FRAMES: usize = 5;
pub const DEFAULT_MIN_LIVENESS_SPAN_MS: u64 = 1_000;
pub const DEFAULT_MIN_CLOSED_FRAMES: usize = 1;
pub const DEFAULT_BLINK_WEIGHT: f64 = 0.5;
pub const DEFAULT_POSE_WEIGHT: f64 = 0.5;
pub const DEFAULT_THRESHOLD_MAX: f64 = 0.6;
pub const DEFAULT_DUPLICATE_DISTANCE: f64 = 0.2;
pub const DEFAULT_EXTRACTOR_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_MASK_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_ALERT_TIMEOUT_MS: u64 = 1_000;

/// Distance metric used for every embedding comparison in the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricName {
    #[default]
    Euclidean,
    Cosine,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub face_recognition_threshold: Option<f64>,
    pub liveness_threshold: Option<f64>,
    pub blink_threshold: Option<f64>,
    pub head_pose_threshold: Option<f64>,
    pub min_liveness_frames: Option<usize>,
    pub min_liveness_span_ms: Option<u64>,
    pub min_closed_frames: Option<usize>,
    pub blink_weight: Option<f64>,
    pub pose_weight: Option<f64>,
    pub distance_metric: Option<MetricName>,
    pub threshold_max: Option<f64>,
    pub duplicate_distance: Option<f64>,
    pub embedding_dimension: Option<usize>,
    pub extractor_timeout_ms: Option<u64>,
    pub detector_timeout_ms: Option<u64>,
    pub mask_timeout_ms: Option<u64>,
    pub alert_timeout_ms: Option<u64>,
    pub gallery_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub face_recognition_threshold: f64,
    pub liveness_threshold: f64,
    pub blink_threshold: f64,
    pub head_pose_threshold: f64,
    pub min_liveness_frames: usize,
    pub min_liveness_span: Duration,
    pub min_closed_frames: usize,
    pub blink_weight: f64,
    pub pose_weight: f64,
    pub distance_metric: MetricName,
    pub threshold_max: f64,
    pub duplicate_distance: f64,
    pub embedding_dimension: Option<usize>,
    pub extractor_timeout: Duration,
    pub detector_timeout: Duration,
    pub mask_timeout: Duration,
    pub alert_timeout: Duration,
    pub gallery_path: PathBuf,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            face_recognition_threshold: raw
                .face_recognition_threshold
                .unwrap_or(DEFAULT_FACE_RECOGNITION_THRESHOLD),
            liveness_threshold: raw.liveness_threshold.unwrap_or(DEFAULT_LIVENESS_THRESHOLD),
            blink_threshold: raw.blink_threshold.unwrap_or(DEFAULT_BLINK_THRESHOLD),
            head_pose_threshold: raw
                .head_pose_threshold
                .unwrap_or(DEFAULT_HEAD_POSE_THRESHOLD),
            min_liveness_frames: raw
                .min_liveness_frames
                .unwrap_or(DEFAULT_MIN_LIVENESS_FRAMES)
                .max(2),
            min_liveness_span: Duration::from_millis(
                raw.min_liveness_span_ms
                    .unwrap_or(DEFAULT_MIN_LIVENESS_SPAN_MS),
            ),
            min_closed_frames: raw
                .min_closed_frames
                .unwrap_or(DEFAULT_MIN_CLOSED_FRAMES)
                .max(1),
            blink_weight: raw.blink_weight.unwrap_or(DEFAULT_BLINK_WEIGHT),
            pose_weight: raw.pose_weight.unwrap_or(DEFAULT_POSE_WEIGHT),
            distance_metric: raw.distance_metric.unwrap_or_default(),
            threshold_max: raw.threshold_max.unwrap_or(DEFAULT_THRESHOLD_MAX),
            duplicate_distance: raw
                .duplicate_distance
                .unwrap_or(DEFAULT_DUPLICATE_DISTANCE),
            embedding_dimension: raw.embedding_dimension,
            extractor_timeout: Duration::from_millis(
                raw.extractor_timeout_ms
                    .unwrap_or(DEFAULT_EXTRACTOR_TIMEOUT_MS)
                    .max(1),
            ),
            detector_timeout: Duration::from_millis(
                raw.detector_timeout_ms
                    .unwrap_or(DEFAULT_DETECTOR_TIMEOUT_MS)
                    .max(1),
            ),
            mask_timeout: Duration::from_millis(
                raw.mask_timeout_ms.unwrap_or(DEFAULT_MASK_TIMEOUT_MS).max(1),
            ),
            alert_timeout: Duration::from_millis(
                raw.alert_timeout_ms
                    .unwrap_or(DEFAULT_ALERT_TIMEOUT_MS)
                    .max(1),
            ),
            gallery_path: raw
                .gallery_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GALLERY_PATH)),
        }
    }

    /// Rejects values that would make the engine emit unbounded or
    /// meaningless scores.
    pub fn validate(&self) -> Result<(), String> {
        let unit_ranged = [
            ("face_recognition_threshold", self.face_recognition_threshold),
            ("liveness_threshold", self.liveness_threshold),
            ("blink_weight", self.blink_weight),
            ("pose_weight", self.pose_weight),
        ];
        for (name, value) in unit_ranged {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], found {value}"));
            }
        }

        let positive = [
            ("blink_threshold", self.blink_threshold),
            ("head_pose_threshold", self.head_pose_threshold),
            ("threshold_max", self.threshold_max),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be a positive number, found {value}"));
            }
        }

        if !self.duplicate_distance.is_finite() || self.duplicate_distance < 0.0 {
            return Err(format!(
                "duplicate_distance must be zero or positive, found {}",
                self.duplicate_distance
            ));
        }
        if self.duplicate_distance >= self.threshold_max {
            return Err(format!(
                "duplicate_distance ({}) must be smaller than threshold_max ({})",
                self.duplicate_distance, self.threshold_max
            ));
        }
        if self.blink_weight + self.pose_weight <= 0.0 {
            return Err("blink_weight and pose_weight cannot both be zero".into());
        }
        if self.embedding_dimension == Some(0) {
            return Err("embedding_dimension must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {message}")]
    Invalid {
        path: Option<PathBuf>,
        message: String,
    },
}

pub fn default_config_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

/// Parses the first file in `paths` that exists; later paths are never read
/// once one is found.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };
        let parsed = toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        return Ok(Some(LoadedConfig {
            contents: parsed,
            source: path.clone(),
        }));
    }
    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    let (resolved, source) = match load_from_paths(paths)? {
        Some(entry) => (ResolvedConfig::from_raw(entry.contents), Some(entry.source)),
        None => (ResolvedConfig::default(), None),
    };

    resolved
        .validate()
        .map_err(|message| ConfigError::Invalid {
            path: source.clone(),
            message,
        })?;

    Ok(ResolvedConfigWithSource { resolved, source })
}
