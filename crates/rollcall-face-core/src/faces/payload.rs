//! JSON payloads produced by the external extractor and detector tools.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::faces::metric::{validate_embedding, DistanceMetric};
use crate::liveness::FrameSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl BoundingBox {
    pub fn width(&self) -> i64 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.bottom - self.top).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceEmbeddingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    pub embedding: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub faces: Vec<FaceEmbeddingRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePayload {
    pub frames: Vec<FrameSample>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let file = File::open(path).map_err(|source| AppError::FeatureRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| AppError::InvalidFeatureFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn load_payload(path: &Path) -> AppResult<EmbeddingPayload> {
    read_json(path)
}

pub fn load_frames(path: &Path) -> AppResult<Vec<FrameSample>> {
    read_json::<FramePayload>(path).map(|payload| payload.frames)
}

/// Returns the shared embedding length of every face in the payload. Each
/// face must be comparable under `metric`.
pub fn ensure_valid_faces(
    faces: &[FaceEmbeddingRecord],
    path: &Path,
    metric: DistanceMetric,
) -> AppResult<usize> {
    let invalid = |message: String| AppError::InvalidFeatureFile {
        path: path.to_path_buf(),
        message,
    };

    let dimension = faces
        .first()
        .map(|face| face.embedding.len())
        .ok_or_else(|| invalid("contains no face embeddings".into()))?;

    for (idx, face) in faces.iter().enumerate() {
        validate_embedding(&face.embedding, Some(dimension), metric)
            .map_err(|err| invalid(format!("face index {idx}: {err}")))?;
    }
    Ok(dimension)
}
