//! Bucketed blob storage on the local filesystem.
//!
//! Objects live at `<root>/<bucket>/<path>`, where `path` may contain `/`
//! separated segments.  Every path is validated before touching the disk.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use atelier_shared::types::Bucket;

use crate::error::{Result, StoreError};

/// Location and size of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: Bucket,
    pub path: String,
    pub size: usize,
}

/// Outcome of a bulk remove.  Missing objects are reported, not fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveReport {
    pub removed: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_base: String,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(root: PathBuf, public_base: impl Into<String>, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&root).await.map_err(|e| {
            StoreError::BlobStorage(format!(
                "Failed to create blob directory '{}': {}",
                root.display(),
                e
            ))
        })?;

        info!(path = %root.display(), "Blob store initialized");

        Ok(Self {
            root,
            public_base: public_base.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub async fn upload(&self, bucket: Bucket, path: &str, data: &[u8]) -> Result<StoredObject> {
        if data.is_empty() {
            return Err(StoreError::BlobStorage("Empty blob".to_string()));
        }
        if data.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&target, data).await.map_err(|e| {
            StoreError::BlobStorage(format!("Failed to write {bucket}/{path}: {e}"))
        })?;

        debug!(%bucket, path, size = data.len(), "Stored blob");
        Ok(StoredObject {
            bucket,
            path: path.to_string(),
            size: data.len(),
        })
    }

    pub async fn download(&self, bucket: Bucket, path: &str) -> Result<Vec<u8>> {
        let target = self.object_path(bucket, path)?;

        match fs::read(&target).await {
            Ok(data) => {
                debug!(%bucket, path, size = data.len(), "Retrieved blob");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::BlobNotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            }),
            Err(e) => Err(StoreError::BlobStorage(format!(
                "Failed to read {bucket}/{path}: {e}"
            ))),
        }
    }

    pub async fn exists(&self, bucket: Bucket, path: &str) -> Result<bool> {
        let target = self.object_path(bucket, path)?;
        Ok(fs::try_exists(&target).await?)
    }

    /// Remove several objects.  Any invalid path aborts before anything is
    /// deleted.
    pub async fn remove(&self, bucket: Bucket, paths: &[String]) -> Result<RemoveReport> {
        let targets = paths
            .iter()
            .map(|p| self.object_path(bucket, p).map(|t| (p, t)))
            .collect::<Result<Vec<_>>>()?;

        let mut report = RemoveReport::default();
        for (path, target) in targets {
            match fs::remove_file(&target).await {
                Ok(()) => {
                    debug!(%bucket, path = %path, "Deleted blob");
                    report.removed.push(path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(%bucket, path = %path, "Blob already missing");
                    report.missing.push(path.clone());
                }
                Err(e) => {
                    return Err(StoreError::BlobStorage(format!(
                        "Failed to delete {bucket}/{path}: {e}"
                    )))
                }
            }
        }
        Ok(report)
    }

    /// Public URL of an object.  Nothing is checked on disk.
    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        format!("{}/{}/{}", self.public_base, bucket, path.trim_start_matches('/'))
    }

    /// Resolve `bucket/path` under the root, rejecting anything that could
    /// escape it.
    fn object_path(&self, bucket: Bucket, path: &str) -> Result<PathBuf> {
        if path.is_empty() || path.contains('\\') || path.contains('\0') {
            return Err(StoreError::BadPath(path.to_string()));
        }

        let mut resolved = self.root.join(bucket.as_str());
        for component in Path::new(path).components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                _ => return Err(StoreError::BadPath(path.to_string())),
            }
        }
        Ok(resolved)
    }
}
