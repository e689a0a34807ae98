//! Persisted model store.
//!
//! Uploaded model blobs are cached under a models directory keyed by a
//! caller-chosen id, with a small JSON registry of known names. The
//! format is deliberately opaque to callers; the only contract is
//! save / lookup / delete.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ServiceError;

const REGISTRY_FILE: &str = "registry.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    /// Model id to stored file name.
    models: BTreeMap<String, String>,
}

/// Filesystem-backed model blob store.
#[derive(Debug)]
pub struct ModelStore {
    dir: PathBuf,
    registry: Registry,
}

impl ModelStore {
    /// Open (or create) a store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| ServiceError::Load(format!("cannot create model dir: {e}")))?;

        let registry_path = dir.join(REGISTRY_FILE);
        let registry = match fs::read_to_string(&registry_path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(error = %e, "model registry unreadable, starting fresh");
                Registry::default()
            }),
            Err(_) => Registry::default(),
        };

        Ok(Self { dir, registry })
    }

    /// Persist model bytes under an id, replacing any previous blob.
    pub fn save(&mut self, id: &str, bytes: &[u8]) -> Result<PathBuf, ServiceError> {
        let file_name = format!("{}.onnx", sanitize(id));
        let path = self.dir.join(&file_name);
        fs::write(&path, bytes)
            .map_err(|e| ServiceError::Load(format!("cannot write model blob: {e}")))?;
        self.registry.models.insert(id.to_string(), file_name);
        self.flush()?;
        info!(id, bytes = bytes.len(), "model cached");
        Ok(path)
    }

    /// Path of a cached model, if the blob still exists on disk.
    pub fn lookup(&self, id: &str) -> Option<PathBuf> {
        let path = self.dir.join(self.registry.models.get(id)?);
        path.exists().then_some(path)
    }

    /// Remove a cached model. Returns whether anything was deleted.
    pub fn delete(&mut self, id: &str) -> Result<bool, ServiceError> {
        let Some(file_name) = self.registry.models.remove(id) else {
            return Ok(false);
        };
        let path = self.dir.join(file_name);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ServiceError::Load(format!("cannot delete model blob: {e}")))?;
        }
        self.flush()?;
        Ok(true)
    }

    /// Known model ids, sorted.
    pub fn list(&self) -> Vec<String> {
        self.registry.models.keys().cloned().collect()
    }

    fn flush(&self) -> Result<(), ServiceError> {
        let content = serde_json::to_string_pretty(&self.registry)
            .map_err(|e| ServiceError::Load(format!("registry serialize failed: {e}")))?;
        fs::write(self.dir.join(REGISTRY_FILE), content)
            .map_err(|e| ServiceError::Load(format!("registry write failed: {e}")))
    }
}

/// Keep ids filesystem-safe.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
