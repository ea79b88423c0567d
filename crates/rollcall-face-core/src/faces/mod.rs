pub mod enrollment;
pub mod gallery;
pub mod metric;
pub mod payload;
pub mod store;

pub use enrollment::{
    run_deactivation, run_deactivation_with, run_gallery_enrollment,
    run_gallery_enrollment_with, validate_label, DeactivationConfig, DeactivationOutcome,
    EnrollmentRecord, GalleryEnrollmentConfig, GalleryEnrollmentOutcome,
};

pub use gallery::{
    confidence_for, Candidate, EmbeddingStore, EnrollmentReceipt, EnrollmentRequest,
    GallerySettings, GallerySnapshot, Identity, LinearScan, MatchResult, NearestNeighbor,
    ReferenceEmbedding,
};

pub use metric::{cosine_similarity, euclidean_distance, validate_embedding, DistanceMetric};

pub use payload::{
    ensure_valid_faces, load_frames, load_payload, BoundingBox, EmbeddingPayload,
    FaceEmbeddingRecord, FramePayload,
};

pub use store::{
    read_gallery_file, write_gallery_file, EnrolledEmbedding, EnvGalleryPathResolver,
    FilesystemGalleryStore, GalleryPathResolver, GalleryStore,
};
