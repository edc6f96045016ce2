//! Application state shared across all commands.
//!
//! The [`AppState`] struct is wrapped in `Arc<Mutex<>>` so every command can
//! reach the database, the blob store, the session and the player.  Commands
//! never hold the lock across an `.await`: they copy what they need (the blob
//! store is cheap to clone), release the guard, and re-lock afterwards.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use atelier_store::{BlobStore, Database};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::player::AudioPlayer;
use crate::session::SessionContext;

pub type SharedState = Arc<Mutex<AppState>>;

/// Central application state.
pub struct AppState {
    pub config: ClientConfig,

    /// Row store.  Synchronous; only touched while the lock is held.
    pub database: Database,

    /// Bucketed object storage.
    pub blobs: BlobStore,

    /// Current auth session.
    pub session: SessionContext,

    /// Persistent audio player shared by every view.
    pub player: AudioPlayer,
}

impl AppState {
    /// Open the database and blob store described by `config`.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let database = Database::open_at(&config.db_path)?;
        let blobs = BlobStore::new(
            config.blob_path.clone(),
            config.public_url.clone(),
            config.max_upload_bytes,
        )
        .await?;

        info!(data_dir = %config.data_dir.display(), "Application state ready");

        Ok(Self {
            config,
            database,
            blobs,
            session: SessionContext::new(),
            player: AudioPlayer::new(),
        })
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }
}

/// Lock the shared state, mapping poisoning to [`ClientError::LockPoisoned`].
pub fn lock(state: &SharedState) -> Result<MutexGuard<'_, AppState>> {
    state.lock().map_err(|_| ClientError::LockPoisoned)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use atelier_store::Profile;
    use tempfile::TempDir;

    pub(crate) async fn empty_state() -> (SharedState, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = ClientConfig::with_data_dir(dir.path().to_path_buf());
        config.max_upload_bytes = 64 * 1024;
        let state = AppState::open(config).await.unwrap().into_shared();
        (state, dir)
    }

    /// State with `maker@example.com` registered and signed in.
    pub(crate) async fn signed_in_state() -> (SharedState, TempDir, Profile) {
        let (state, dir) = empty_state().await;
        let profile = crate::commands::profile::register(&state, "maker@example.com", "Maker").unwrap();
        lock(&state).unwrap().session.sign_in_as(&profile);
        (state, dir, profile)
    }

    #[tokio::test]
    async fn open_creates_storage() {
        let (state, dir) = empty_state().await;
        let guard = lock(&state).unwrap();
        assert!(guard.database.path().is_some());
        assert!(dir.path().join("blobs").exists());
        assert!(guard.session.current_user().is_none());
    }
}
