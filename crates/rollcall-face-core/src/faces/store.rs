use std::env;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

const GALLERY_PATH_ENV: &str = "ROLLCALL_GALLERY_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrolledEmbedding {
    pub id: Uuid,
    pub identity: Uuid,
    pub label: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub embedding: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: String,
}

fn default_active() -> bool {
    true
}

pub trait GalleryStore {
    fn load(&self, path: &Path) -> AppResult<Vec<EnrolledEmbedding>>;
    fn save(&self, path: &Path, embeddings: &[EnrolledEmbedding]) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemGalleryStore;

impl GalleryStore for FilesystemGalleryStore {
    fn load(&self, path: &Path) -> AppResult<Vec<EnrolledEmbedding>> {
        read_gallery_file(path)
    }

    fn save(&self, path: &Path, embeddings: &[EnrolledEmbedding]) -> AppResult<()> {
        write_gallery_file(path, embeddings)
    }
}

pub trait GalleryPathResolver {
    fn resolve(&self, override_path: Option<&Path>) -> PathBuf;
}

/// Flag, then `$ROLLCALL_GALLERY_PATH`, then the configured path.
#[derive(Debug, Clone)]
pub struct EnvGalleryPathResolver {
    pub configured: PathBuf,
}

impl GalleryPathResolver for EnvGalleryPathResolver {
    fn resolve(&self, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            path.to_path_buf()
        } else if let Ok(env_value) = env::var(GALLERY_PATH_ENV) {
            PathBuf::from(env_value)
        } else {
            self.configured.clone()
        }
    }
}

pub fn read_gallery_file(path: &Path) -> AppResult<Vec<EnrolledEmbedding>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let data = fs::read(path).map_err(|source| AppError::FeatureRead {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&data).map_err(|err| AppError::InvalidFeatureFile {
        path: path.to_path_buf(),
        message: format!("invalid gallery contents: {err}"),
    })
}

/// Replaces the gallery file atomically: the snapshot is written to a sibling
/// temp file, synced, then renamed over the target with owner-only access.
pub fn write_gallery_file(path: &Path, embeddings: &[EnrolledEmbedding]) -> AppResult<()> {
    let write_err = |source: io::Error| AppError::FeatureWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|source| AppError::FeatureWrite {
                path: parent.to_path_buf(),
                source,
            })?;
            parent
        }
        None => Path::new("."),
    };

    let serialized = serde_json::to_vec_pretty(embeddings)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        writer
            .write_all(&serialized)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(write_err)?;
    }

    tmp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SecondsFormat, Utc};
    use tempfile::TempDir;

    #[test]
    fn filesystem_store_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("gallery.json");
        let store = FilesystemGalleryStore;
        let embeddings = vec![dummy_embedding("capture-1.json")];
        store.save(&path, &embeddings).unwrap();

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded, embeddings);
    }

    #[cfg(unix)]
    #[test]
    fn saved_gallery_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gallery.json");
        FilesystemGalleryStore
            .save(&path, &[dummy_embedding("capture.json")])
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn missing_gallery_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = FilesystemGalleryStore
            .load(&tmp.path().join("absent.json"))
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_gallery_is_reported_with_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gallery.json");
        fs::write(&path, "{ not json").unwrap();

        let err = FilesystemGalleryStore.load(&path).unwrap_err();
        match err {
            AppError::InvalidFeatureFile { path: err_path, .. } => assert_eq!(err_path, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn override_path_wins() {
        let resolver = EnvGalleryPathResolver {
            configured: PathBuf::from("/var/lib/rollcall/gallery.json"),
        };
        let chosen = resolver.resolve(Some(Path::new("/tmp/other.json")));
        assert_eq!(chosen, PathBuf::from("/tmp/other.json"));
    }

    fn dummy_embedding(source: &str) -> EnrolledEmbedding {
        EnrolledEmbedding {
            id: Uuid::new_v4(),
            identity: Uuid::new_v4(),
            label: "alice".into(),
            active: true,
            embedding: vec![0.1, 0.2, 0.3],
            source: Some(source.into()),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
