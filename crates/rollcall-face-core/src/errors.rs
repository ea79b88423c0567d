use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use rollcall_config::ConfigError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("embedding dimension mismatch: expected {expected} values, found {found}")]
    EmbeddingDimension { expected: usize, found: usize },

    #[error("embedding contains a non-finite value at index {index}")]
    NonFiniteEmbedding { index: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage} unavailable: {message}")]
    RecognitionUnavailable {
        stage: &'static str,
        message: String,
    },

    #[error("no face found by the {stage}")]
    NoFaceFound { stage: &'static str },

    #[error(
        "embedding for identity {candidate} is within {distance:.4} of enrolled identity {existing}"
    )]
    DuplicateEmbedding {
        candidate: Uuid,
        existing: Uuid,
        distance: f64,
    },

    #[error("attendance already marked for identity {identity} on {date}")]
    AlreadyMarked { identity: Uuid, date: NaiveDate },

    #[error("outcome {outcome} is not eligible for attendance: {reason}")]
    IneligibleOutcome { outcome: Uuid, reason: String },

    #[error("identity {0} is not enrolled")]
    UnknownIdentity(Uuid),

    #[error("no anomaly alert with id {0}")]
    AlertNotFound(Uuid),

    #[error("anomaly alert {0} is already resolved")]
    AlertAlreadyResolved(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    FeatureWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    FeatureRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file {path} is invalid: {message}")]
    InvalidFeatureFile { path: PathBuf, message: String },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::EmbeddingDimension { .. } => ExitCode::from(2),
            AppError::NonFiniteEmbedding { .. } => ExitCode::from(2),
            AppError::InvalidInput(_) => ExitCode::from(2),
            AppError::FeatureRead { .. } => ExitCode::from(2),
            AppError::InvalidFeatureFile { .. } => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::ConfigInvalid(_) => ExitCode::from(2),
            AppError::DuplicateEmbedding { .. } => ExitCode::from(3),
            AppError::AlreadyMarked { .. } => ExitCode::from(3),
            AppError::IneligibleOutcome { .. } => ExitCode::from(3),
            AppError::UnknownIdentity(_) => ExitCode::from(4),
            AppError::AlertNotFound(_) => ExitCode::from(4),
            AppError::AlertAlreadyResolved(_) => ExitCode::from(3),
            AppError::RecognitionUnavailable { .. } => ExitCode::from(75),
            AppError::NoFaceFound { .. } => ExitCode::from(5),
            _ => ExitCode::from(1),
        }
    }

    /// Whether the caller may retry the same attempt unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RecognitionUnavailable { .. })
    }

    /// Input errors are rejected before any state is touched.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingDimension { .. }
                | AppError::NonFiniteEmbedding { .. }
                | AppError::InvalidInput(_)
        )
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
            ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
            ConfigError::Invalid {
                path: Some(path),
                message,
            } => AppError::ConfigParse { path, message },
            ConfigError::Invalid {
                path: None,
                message,
            } => AppError::ConfigInvalid(message),
        }
    }
}
