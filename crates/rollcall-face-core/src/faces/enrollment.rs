use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::faces::gallery::{EmbeddingStore, EnrollmentRequest, GallerySettings};
use crate::faces::payload::{ensure_valid_faces, load_payload};
use crate::faces::store::{FilesystemGalleryStore, GalleryStore};

#[derive(Debug, Clone)]
pub struct GalleryEnrollmentConfig {
    /// Existing identity to append to; a new one is minted when absent.
    pub identity: Option<Uuid>,
    pub label: String,
    pub embedding: PathBuf,
    pub gallery: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DeactivationConfig {
    pub identity: Uuid,
    pub gallery: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrollmentRecord {
    pub embedding_id: Uuid,
    pub embedding_len: usize,
    pub source: String,
    pub gallery_version: u64,
}

#[derive(Debug)]
pub struct GalleryEnrollmentOutcome {
    pub identity: Uuid,
    pub label: String,
    pub gallery_path: PathBuf,
    pub added: Vec<EnrollmentRecord>,
    pub logs: Vec<String>,
}

#[derive(Debug)]
pub struct DeactivationOutcome {
    pub identity: Uuid,
    pub gallery_path: PathBuf,
    pub remaining_active: usize,
    pub logs: Vec<String>,
}

pub fn run_gallery_enrollment(
    config: &GalleryEnrollmentConfig,
    settings: GallerySettings,
) -> AppResult<GalleryEnrollmentOutcome> {
    run_gallery_enrollment_with(config, settings, &FilesystemGalleryStore)
}

/// Loads the gallery file, enrolls every face of the payload through the
/// duplicate guard and writes the gallery back only if all of them pass.
pub fn run_gallery_enrollment_with<S>(
    config: &GalleryEnrollmentConfig,
    settings: GallerySettings,
    store: &S,
) -> AppResult<GalleryEnrollmentOutcome>
where
    S: GalleryStore,
{
    validate_label(&config.label)?;

    let mut logs = Vec::new();
    logs.push(format!(
        "Loading embedding payload from {}",
        config.embedding.display()
    ));

    let payload = load_payload(&config.embedding)?;
    let embedding_len = ensure_valid_faces(&payload.faces, &config.embedding, settings.metric)?;
    logs.push(format!(
        "Validated {} embedding(s) with length {}",
        payload.faces.len(),
        embedding_len
    ));

    let existing = store.load(&config.gallery)?;
    let gallery = EmbeddingStore::from_records(settings, &existing)?;
    logs.push(format!(
        "Loaded gallery {} ({} identities)",
        config.gallery.display(),
        gallery.len()
    ));

    let identity = config.identity.unwrap_or_else(Uuid::new_v4);
    if let Some(existing) = gallery.snapshot().identity(identity) {
        if existing.label != config.label {
            return Err(AppError::InvalidInput(format!(
                "identity {identity} is enrolled as '{}', not '{}'",
                existing.label, config.label
            )));
        }
    }
    let source = config.embedding.display().to_string();
    let mut added = Vec::with_capacity(payload.faces.len());
    for face in &payload.faces {
        let receipt = gallery.enroll(EnrollmentRequest {
            identity,
            label: Some(config.label.clone()),
            embedding: face.embedding.clone(),
            source: Some(source.clone()),
        })?;
        added.push(EnrollmentRecord {
            embedding_id: receipt.embedding_id,
            embedding_len,
            source: source.clone(),
            gallery_version: receipt.gallery_version,
        });
    }

    store.save(&config.gallery, &gallery.to_records())?;
    logs.push(format!(
        "Enrolled {} embedding(s) for identity {} ({})",
        added.len(),
        identity,
        config.label
    ));

    Ok(GalleryEnrollmentOutcome {
        identity,
        label: config.label.clone(),
        gallery_path: config.gallery.clone(),
        added,
        logs,
    })
}

pub fn run_deactivation(
    config: &DeactivationConfig,
    settings: GallerySettings,
) -> AppResult<DeactivationOutcome> {
    run_deactivation_with(config, settings, &FilesystemGalleryStore)
}

pub fn run_deactivation_with<S>(
    config: &DeactivationConfig,
    settings: GallerySettings,
    store: &S,
) -> AppResult<DeactivationOutcome>
where
    S: GalleryStore,
{
    let existing = store.load(&config.gallery)?;
    let gallery = EmbeddingStore::from_records(settings, &existing)?;
    gallery.set_active(config.identity, false)?;
    store.save(&config.gallery, &gallery.to_records())?;

    let remaining_active = gallery.snapshot().active_count();
    Ok(DeactivationOutcome {
        identity: config.identity,
        gallery_path: config.gallery.clone(),
        remaining_active,
        logs: vec![
            format!("Deactivated identity {}", config.identity),
            format!("{remaining_active} active identities remain"),
        ],
    })
}

pub fn validate_label(label: &str) -> AppResult<()> {
    if label.trim().is_empty() {
        return Err(AppError::InvalidInput("label cannot be empty".into()));
    }
    if label.len() > 100 {
        return Err(AppError::InvalidInput(
            "label cannot exceed 100 characters".into(),
        ));
    }
    if label.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(
            "label cannot contain control characters".into(),
        ));
    }
    Ok(())
}
