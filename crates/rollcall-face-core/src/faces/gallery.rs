//! In-memory gallery of enrolled identities.
//!
//! The gallery is published as an immutable [`GallerySnapshot`]. Matching
//! loads whichever snapshot is current and never blocks; enrollment builds the
//! next snapshot under a writer lock and swaps it in, so a reader observes
//! either the gallery before an enrollment or the gallery after it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::faces::metric::{finite_unit, validate_embedding, DistanceMetric};
use crate::faces::store::EnrolledEmbedding;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GallerySettings {
    pub metric: DistanceMetric,
    /// Distances above this never match; also scales confidence.
    pub threshold_max: f64,
    /// Enrollment is refused when a different identity is closer than this.
    pub duplicate_distance: f64,
    /// Fixed embedding dimension. When `None` the first enrollment fixes it.
    pub dimension: Option<usize>,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            threshold_max: rollcall_config::DEFAULT_THRESHOLD_MAX,
            duplicate_distance: rollcall_config::DEFAULT_DUPLICATE_DISTANCE,
            dimension: None,
        }
    }
}

/// One stored reference vector. Immutable once enrolled.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEmbedding {
    pub id: Uuid,
    pub values: Arc<[f64]>,
    pub source: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub label: String,
    pub active: bool,
    embeddings: Vec<ReferenceEmbedding>,
}

impl Identity {
    pub fn embeddings(&self) -> &[ReferenceEmbedding] {
        &self.embeddings
    }
}

#[derive(Debug, Clone, Default)]
pub struct GallerySnapshot {
    version: u64,
    dimension: Option<usize>,
    identities: Vec<Arc<Identity>>,
}

impl GallerySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn identities(&self) -> &[Arc<Identity>] {
        &self.identities
    }

    pub fn identity(&self, id: Uuid) -> Option<&Arc<Identity>> {
        self.identities.iter().find(|identity| identity.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.identities.iter().filter(|identity| identity.active).count()
    }

    pub fn embedding_count(&self) -> usize {
        self.identities
            .iter()
            .map(|identity| identity.embeddings.len())
            .sum()
    }

    fn successor(&self, identities: Vec<Arc<Identity>>, dimension: Option<usize>) -> Self {
        Self {
            version: self.version + 1,
            dimension,
            identities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub identity: Uuid,
    pub distance: f64,
}

/// Nearest-neighbour search over a snapshot.
///
/// Implementations must only consider active identities and must return the
/// smallest distance among all reference embeddings of the winning identity.
pub trait NearestNeighbor: Send + Sync {
    fn nearest(
        &self,
        snapshot: &GallerySnapshot,
        query: &[f64],
        metric: DistanceMetric,
    ) -> Option<Candidate>;
}

/// Exhaustive O(N·D) scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl NearestNeighbor for LinearScan {
    fn nearest(
        &self,
        snapshot: &GallerySnapshot,
        query: &[f64],
        metric: DistanceMetric,
    ) -> Option<Candidate> {
        snapshot
            .identities
            .iter()
            .filter(|identity| identity.active)
            .filter_map(|identity| {
                identity
                    .embeddings
                    .iter()
                    .map(|reference| metric.distance(query, &reference.values))
                    .min_by(f64::total_cmp)
                    .map(|distance| Candidate {
                        identity: identity.id,
                        distance,
                    })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub identity: Option<Uuid>,
    pub label: Option<String>,
    /// Distance to the closest active identity, matched or not. `None` only
    /// when the gallery has nothing to compare against.
    pub distance: Option<f64>,
    pub confidence: f64,
    pub gallery_version: u64,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    /// A result built outside the gallery, e.g. by a caller replaying a
    /// stored decision.
    pub fn known(identity: Uuid, confidence: f64) -> Self {
        Self {
            identity: Some(identity),
            label: None,
            distance: None,
            confidence: confidence.clamp(0.0, 1.0),
            gallery_version: 0,
        }
    }

    pub fn unknown() -> Self {
        Self {
            identity: None,
            label: None,
            distance: None,
            confidence: 0.0,
            gallery_version: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub identity: Uuid,
    pub label: Option<String>,
    pub embedding: Vec<f64>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentReceipt {
    pub identity: Uuid,
    pub embedding_id: Uuid,
    pub new_identity: bool,
    pub gallery_version: u64,
}

pub struct EmbeddingStore {
    settings: GallerySettings,
    current: ArcSwap<GallerySnapshot>,
    writer: Mutex<()>,
    index: Box<dyn NearestNeighbor>,
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("EmbeddingStore")
            .field("settings", &self.settings)
            .field("version", &snapshot.version)
            .field("identities", &snapshot.identities.len())
            .finish()
    }
}

impl EmbeddingStore {
    pub fn new(settings: GallerySettings) -> Self {
        Self::with_index(settings, LinearScan)
    }

    pub fn with_index<N>(settings: GallerySettings, index: N) -> Self
    where
        N: NearestNeighbor + 'static,
    {
        Self {
            settings,
            current: ArcSwap::from_pointee(GallerySnapshot {
                version: 0,
                dimension: settings.dimension,
                identities: Vec::new(),
            }),
            writer: Mutex::new(()),
            index: Box::new(index),
        }
    }

    /// Rebuilds a gallery from persisted records. Records were accepted by
    /// the duplicate guard when first enrolled, so only shape is checked.
    pub fn from_records(settings: GallerySettings, records: &[EnrolledEmbedding]) -> AppResult<Self> {
        let store = Self::new(settings);
        let mut dimension = settings.dimension;
        let mut order: Vec<Uuid> = Vec::new();
        let mut grouped: HashMap<Uuid, Identity> = HashMap::new();

        for record in records {
            validate_embedding(&record.embedding, dimension, settings.metric)?;
            dimension.get_or_insert(record.embedding.len());

            let enrolled_at = DateTime::parse_from_rfc3339(&record.created_at)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|err| {
                    AppError::InvalidInput(format!(
                        "embedding {} has invalid created_at '{}': {err}",
                        record.id, record.created_at
                    ))
                })?;

            let identity = grouped.entry(record.identity).or_insert_with(|| {
                order.push(record.identity);
                Identity {
                    id: record.identity,
                    label: record.label.clone(),
                    active: record.active,
                    embeddings: Vec::new(),
                }
            });
            identity.active &= record.active;
            identity.embeddings.push(ReferenceEmbedding {
                id: record.id,
                values: Arc::from(record.embedding.as_slice()),
                source: record.source.clone(),
                enrolled_at,
            });
        }

        let identities = order
            .into_iter()
            .filter_map(|id| grouped.remove(&id))
            .map(Arc::new)
            .collect();
        store.current.store(Arc::new(GallerySnapshot {
            version: 1,
            dimension,
            identities,
        }));
        debug!(records = records.len(), "gallery restored from records");
        Ok(store)
    }

    pub fn settings(&self) -> &GallerySettings {
        &self.settings
    }

    /// The snapshot current at the time of the call; later enrollments do
    /// not affect it.
    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn match_embedding(&self, query: &[f64]) -> AppResult<MatchResult> {
        let snapshot = self.current.load();
        validate_embedding(query, snapshot.dimension, self.settings.metric)?;

        let Some(candidate) = self.index.nearest(&snapshot, query, self.settings.metric) else {
            debug!(version = snapshot.version, "no active identities to match against");
            return Ok(MatchResult {
                gallery_version: snapshot.version,
                ..MatchResult::unknown()
            });
        };

        let matched = candidate.distance <= self.settings.threshold_max;
        let confidence = if matched {
            confidence_for(candidate.distance, self.settings.threshold_max)
        } else {
            0.0
        };
        let label = matched
            .then(|| snapshot.identity(candidate.identity))
            .flatten()
            .map(|identity| identity.label.clone());

        debug!(
            version = snapshot.version,
            distance = candidate.distance,
            matched,
            "gallery match computed"
        );

        Ok(MatchResult {
            identity: matched.then_some(candidate.identity),
            label,
            distance: Some(candidate.distance),
            confidence,
            gallery_version: snapshot.version,
        })
    }

    pub fn enroll(&self, request: EnrollmentRequest) -> AppResult<EnrollmentReceipt> {
        let _guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.current.load_full();

        validate_embedding(&request.embedding, current.dimension, self.settings.metric)?;

        for identity in current.identities.iter().filter(|i| i.id != request.identity) {
            for reference in &identity.embeddings {
                let distance = self
                    .settings
                    .metric
                    .distance(&request.embedding, &reference.values);
                if distance < self.settings.duplicate_distance {
                    return Err(AppError::DuplicateEmbedding {
                        candidate: request.identity,
                        existing: identity.id,
                        distance,
                    });
                }
            }
        }

        let reference = ReferenceEmbedding {
            id: Uuid::new_v4(),
            values: Arc::from(request.embedding.as_slice()),
            source: request.source,
            enrolled_at: Utc::now(),
        };
        let embedding_id = reference.id;

        let mut identities = current.identities.clone();
        let new_identity = match identities.iter().position(|i| i.id == request.identity) {
            Some(position) => {
                let mut updated = Identity::clone(&identities[position]);
                updated.embeddings.push(reference);
                identities[position] = Arc::new(updated);
                false
            }
            None => {
                identities.push(Arc::new(Identity {
                    id: request.identity,
                    label: request
                        .label
                        .unwrap_or_else(|| request.identity.to_string()),
                    active: true,
                    embeddings: vec![reference],
                }));
                true
            }
        };

        let next = current.successor(identities, Some(request.embedding.len()));
        let version = next.version;
        self.current.store(Arc::new(next));

        info!(
            identity = %request.identity,
            embedding = %embedding_id,
            version,
            new_identity,
            "enrolled reference embedding"
        );

        Ok(EnrollmentReceipt {
            identity: request.identity,
            embedding_id,
            new_identity,
            gallery_version: version,
        })
    }

    pub fn set_active(&self, identity: Uuid, active: bool) -> AppResult<u64> {
        let _guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.current.load_full();

        let mut identities = current.identities.clone();
        let position = identities
            .iter()
            .position(|i| i.id == identity)
            .ok_or(AppError::UnknownIdentity(identity))?;
        let mut updated = Identity::clone(&identities[position]);
        updated.active = active;
        identities[position] = Arc::new(updated);

        let next = current.successor(identities, current.dimension);
        let version = next.version;
        self.current.store(Arc::new(next));
        info!(identity = %identity, active, version, "identity activation changed");
        Ok(version)
    }

    /// Flattens the current snapshot into persistable records.
    pub fn to_records(&self) -> Vec<EnrolledEmbedding> {
        let snapshot = self.current.load();
        snapshot
            .identities
            .iter()
            .flat_map(|identity| {
                identity
                    .embeddings
                    .iter()
                    .map(move |reference| EnrolledEmbedding {
                        id: reference.id,
                        identity: identity.id,
                        label: identity.label.clone(),
                        active: identity.active,
                        embedding: reference.values.to_vec(),
                        source: reference.source.clone(),
                        created_at: reference
                            .enrolled_at
                            .to_rfc3339_opts(SecondsFormat::Millis, true),
                    })
            })
            .collect()
    }
}

/// `clamp(1 - distance / threshold_max, 0, 1)`. A degenerate ratio (zero or
/// non-finite `threshold_max`) yields 0.
pub fn confidence_for(distance: f64, threshold_max: f64) -> f64 {
    finite_unit(1.0 - distance / threshold_max)
}
