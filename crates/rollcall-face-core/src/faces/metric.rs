use rollcall_config::MetricName;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Distance between two embeddings. Smaller is closer for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    /// `1 - cosine_similarity`, bounded to `[0, 2]`.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(self, lhs: &[f64], rhs: &[f64]) -> f64 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(lhs, rhs),
            DistanceMetric::Cosine => (1.0 - cosine_similarity(lhs, rhs)).clamp(0.0, 2.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl From<MetricName> for DistanceMetric {
    fn from(name: MetricName) -> Self {
        match name {
            MetricName::Euclidean => DistanceMetric::Euclidean,
            MetricName::Cosine => DistanceMetric::Cosine,
        }
    }
}

pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}

pub fn cosine_similarity(lhs: &[f64], rhs: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_lhs = 0.0;
    let mut norm_rhs = 0.0;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    dot / (norm_lhs.sqrt() * norm_rhs.sqrt())
}

/// Clamps a score into [0, 1]; NaN and infinities collapse to 0.
pub(crate) fn finite_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Checks an embedding before it reaches any distance computation so that
/// no NaN or infinity can leak into a score.
pub fn validate_embedding(
    values: &[f64],
    expected_dimension: Option<usize>,
    metric: DistanceMetric,
) -> AppResult<()> {
    if values.is_empty() {
        return Err(AppError::InvalidInput("embedding is empty".into()));
    }
    if let Some(expected) = expected_dimension {
        if values.len() != expected {
            return Err(AppError::EmbeddingDimension {
                expected,
                found: values.len(),
            });
        }
    }
    if let Some(index) = values.iter().position(|value| !value.is_finite()) {
        return Err(AppError::NonFiniteEmbedding { index });
    }
    // |a - b|^2 <= 2|a|^2 + 2|b|^2, so a 4x headroom keeps every distance
    // between two accepted embeddings finite.
    let norm_sq = values.iter().map(|value| value * value).sum::<f64>();
    if !(4.0 * norm_sq).is_finite() {
        return Err(AppError::InvalidInput(
            "embedding magnitude is too large to compare".into(),
        ));
    }
    if metric == DistanceMetric::Cosine && norm_sq.sqrt() <= f64::EPSILON {
        return Err(AppError::InvalidInput(
            "zero-magnitude embedding cannot be compared with cosine distance".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_distance_matches_hand_computation() {
        let distance = DistanceMetric::Euclidean.distance(&[0.0, 3.0], &[4.0, 0.0]);
        assert!((distance - 5.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_distance_is_zero_for_parallel_vectors() {
        let distance = DistanceMetric::Cosine.distance(&[1.0, 2.0], &[2.0, 4.0]);
        assert!(distance.abs() < 1e-12);

        let opposite = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((opposite - 2.0).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_wrong_dimension() {
        let err = validate_embedding(&[0.1, 0.2], Some(3), DistanceMetric::Euclidean).unwrap_err();
        match err {
            AppError::EmbeddingDimension { expected, found } => {
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_non_finite_values() {
        let err =
            validate_embedding(&[0.1, f64::NAN, 0.3], None, DistanceMetric::Euclidean).unwrap_err();
        assert!(matches!(err, AppError::NonFiniteEmbedding { index: 1 }));
    }

    #[test]
    fn oversized_components_are_rejected_before_overflowing() {
        let huge = [1e200, 1e200, 1e200];
        for metric in [DistanceMetric::Euclidean, DistanceMetric::Cosine] {
            let err = validate_embedding(&huge, None, metric).unwrap_err();
            assert!(err.is_invalid_input());
        }

        let large = [1e150, -1e150];
        validate_embedding(&large, None, DistanceMetric::Cosine).unwrap();
        let distance = DistanceMetric::Cosine.distance(&large, &[-1e150, 1e150]);
        assert!(distance.is_finite());
        let distance = DistanceMetric::Euclidean.distance(&large, &[-1e150, 1e150]);
        assert!(distance.is_finite());
    }

    #[test]
    fn validate_rejects_zero_vector_only_for_cosine() {
        assert!(validate_embedding(&[0.0, 0.0], None, DistanceMetric::Euclidean).is_ok());
        let err = validate_embedding(&[0.0, 0.0], None, DistanceMetric::Cosine).unwrap_err();
        assert!(err.is_invalid_input());
    }
}
