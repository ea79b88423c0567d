use std::path::{Path, PathBuf};

use rollcall_face_core::faces::{
    EmbeddingStore, FilesystemGalleryStore, GallerySettings, GalleryStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppResult;

pub use rollcall_face_core::faces::{
    run_deactivation, run_gallery_enrollment, DeactivationConfig, DeactivationOutcome,
    GalleryEnrollmentConfig, GalleryEnrollmentOutcome,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IdentitySummary {
    pub identity: Uuid,
    pub label: String,
    pub active: bool,
    pub embeddings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryListing {
    pub gallery_path: PathBuf,
    pub dimension: Option<usize>,
    pub identities: Vec<IdentitySummary>,
}

pub fn run_gallery_list(gallery: &Path, settings: GallerySettings) -> AppResult<GalleryListing> {
    run_gallery_list_with(gallery, settings, &FilesystemGalleryStore)
}

pub fn run_gallery_list_with<S>(
    gallery: &Path,
    settings: GallerySettings,
    store: &S,
) -> AppResult<GalleryListing>
where
    S: GalleryStore,
{
    let records = store.load(gallery)?;
    let snapshot = EmbeddingStore::from_records(settings, &records)?.snapshot();

    let mut identities: Vec<_> = snapshot
        .identities()
        .iter()
        .map(|identity| IdentitySummary {
            identity: identity.id,
            label: identity.label.clone(),
            active: identity.active,
            embeddings: identity.embeddings().len(),
        })
        .collect();
    identities.sort_by(|a, b| a.label.cmp(&b.label).then(a.identity.cmp(&b.identity)));

    Ok(GalleryListing {
        gallery_path: gallery.to_path_buf(),
        dimension: snapshot.dimension(),
        identities,
    })
}
