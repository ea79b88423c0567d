//! Contracts for the slow external collaborators and the timeout wrapper the
//! engine uses to call them.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::FaceEmbeddingRecord;
use crate::liveness::FrameSample;

pub const EXTRACTOR_STAGE: &str = "embedding extractor";
pub const DETECTOR_STAGE: &str = "landmark detector";
pub const MASK_STAGE: &str = "mask classifier";
pub const ALERT_STAGE: &str = "alert emitter";

/// Encoded image bytes as captured by the caller, shared cheaply with worker
/// threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Arc<[u8]>,
    pub timestamp_ms: u64,
}

impl CapturedImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, timestamp_ms: u64) -> Self {
        Self {
            bytes: bytes.into(),
            timestamp_ms,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("no face found")]
    NoFace,
    #[error("{0}")]
    Failed(String),
}

/// `image -> embedding`. Must return the single most prominent face.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, image: &CapturedImage) -> Result<FaceEmbeddingRecord, BoundaryError>;
}

/// `image -> landmark/pose sample` for one frame of a liveness sequence.
pub trait LandmarkDetector: Send + Sync {
    fn sample(&self, image: &CapturedImage) -> Result<FrameSample, BoundaryError>;
}

/// Runs `call` on a worker thread and waits at most `timeout` for it.
///
/// A call that overruns is abandoned, not cancelled: the worker finishes on
/// its own and its result is discarded.
pub fn call_with_timeout<T, F>(stage: &'static str, timeout: Duration, call: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BoundaryError> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(format!("rollcall-{}", stage.replace(' ', "-")))
        .spawn(move || {
            // The receiver is gone once the caller timed out.
            let _ = tx.send(call());
        })
        .map_err(|err| AppError::RecognitionUnavailable {
            stage,
            message: format!("failed to start worker: {err}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(BoundaryError::NoFace)) => {
            debug!(stage, "no face found");
            Err(AppError::NoFaceFound { stage })
        }
        Ok(Err(BoundaryError::Failed(message))) => {
            warn!(stage, %message, "boundary call failed");
            Err(AppError::RecognitionUnavailable { stage, message })
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(stage, timeout_ms = timeout.as_millis() as u64, "boundary call timed out");
            Err(AppError::RecognitionUnavailable {
                stage,
                message: format!("timed out after {} ms", timeout.as_millis()),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(AppError::RecognitionUnavailable {
            stage,
            message: "worker exited without a result".into(),
        }),
    }
}
