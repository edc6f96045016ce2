//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration for local development.

use std::path::PathBuf;

use directories::ProjectDirs;

use atelier_shared::constants::MAX_FILE_SIZE;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base directory for the database and blobs.
    /// Env: `ATELIER_DATA_DIR`
    /// Default: the platform data directory, or `./atelier-data`.
    pub data_dir: PathBuf,

    /// SQLite database file.
    /// Env: `ATELIER_DB_PATH`
    /// Default: `<data_dir>/atelier.db`
    pub db_path: PathBuf,

    /// Root of the bucketed blob store.
    /// Env: `ATELIER_BLOB_PATH`
    /// Default: `<data_dir>/blobs`
    pub blob_path: PathBuf,

    /// Prefix for public object URLs.
    /// Env: `ATELIER_PUBLIC_URL`
    /// Default: `http://localhost:8080/storage`
    pub public_url: String,

    /// Maximum upload size in bytes.
    /// Env: `ATELIER_MAX_UPLOAD_BYTES`
    /// Default: 50 MiB
    pub max_upload_bytes: usize,
}

impl ClientConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("atelier.db"),
            blob_path: data_dir.join("blobs"),
            data_dir,
            public_url: "http://localhost:8080/storage".to_string(),
            max_upload_bytes: MAX_FILE_SIZE,
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("ATELIER_DATA_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let mut config = Self::with_data_dir(data_dir);

        if let Some(path) = lookup("ATELIER_DB_PATH").filter(|v| !v.is_empty()) {
            config.db_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("ATELIER_BLOB_PATH").filter(|v| !v.is_empty()) {
            config.blob_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("ATELIER_PUBLIC_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.public_url = url;
            } else {
                tracing::warn!(value = %url, "Invalid ATELIER_PUBLIC_URL, using default");
            }
        }

        if let Some(val) = lookup("ATELIER_MAX_UPLOAD_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid ATELIER_MAX_UPLOAD_BYTES, using default"),
            }
        }

        config
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("app", "atelier", "atelier")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./atelier-data"))
}
