//! File and folder manager commands.
//!
//! Every mutation is a direct storage write; callers refetch afterwards.
//! Blob I/O happens with the state lock released.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use atelier_shared::constants::{
    UPLOAD_PROGRESS_CEILING, UPLOAD_PROGRESS_STEP, UPLOAD_PROGRESS_TICK_MS,
};
use atelier_shared::format::format_file_size;
use atelier_shared::types::{Bucket, FileId, FileKind, UserId};
use atelier_shared::ValidationError;
use atelier_store::{BlobStore, Database, FileRecord, StoreError};

use crate::error::{ClientError, Result};
use crate::state::{lock, SharedState};
use crate::tree;

/// View model for one file or folder.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub id: FileId,
    pub name: String,
    pub kind: FileKind,
    /// Display size, e.g. `"2.4 MB"`.
    pub size: String,
    pub size_bytes: i64,
    pub modified: DateTime<Utc>,
    pub folder_id: Option<FileId>,
    pub starred: bool,
    /// Public URL of the stored object; `None` for folders.
    pub url: Option<String>,
    /// Only materialised for folders by [`fetch_tree`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileItem>>,
}

impl FileItem {
    pub fn from_record(record: &FileRecord, blobs: &BlobStore) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            kind: record.kind,
            size: if record.kind.is_folder() {
                "--".to_string()
            } else {
                format_file_size(record.size_bytes.max(0) as u64)
            },
            size_bytes: record.size_bytes,
            modified: record.updated_at,
            folder_id: record.folder_id,
            starred: record.starred,
            url: record
                .storage_path
                .as_deref()
                .map(|p| blobs.public_url(Bucket::Files, p)),
            children: None,
        }
    }
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub data: Vec<u8>,
    pub folder_id: Option<FileId>,
    pub mime_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Upload progress
// ---------------------------------------------------------------------------

/// Percentage reported while an upload runs.
///
/// The value is simulated: it climbs by a fixed step on a timer up to a
/// ceiling, independent of bytes written, and jumps to 100 on success.  It is
/// reset to 0 if the upload fails.
#[derive(Clone)]
pub struct UploadProgress {
    tx: Arc<watch::Sender<u8>>,
}

impl UploadProgress {
    pub fn channel() -> (Self, watch::Receiver<u8>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }

    fn set(&self, value: u8) {
        self.tx.send_replace(value);
    }

    fn advance(&self) {
        self.tx.send_modify(|v| {
            *v = v
                .saturating_add(UPLOAD_PROGRESS_STEP)
                .min(UPLOAD_PROGRESS_CEILING)
                .max(*v);
        });
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let progress = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_millis(UPLOAD_PROGRESS_TICK_MS);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                progress.advance();
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Items directly inside `folder_id` (`None` = root), folders first.
pub fn fetch_files(state: &SharedState, folder_id: Option<FileId>) -> Result<Vec<FileItem>> {
    let guard = lock(state)?;
    let owner = guard.session.require_user()?;

    let rows = guard.database.list_files_in_folder(owner, folder_id)?;
    let mut items: Vec<FileItem> = rows
        .iter()
        .map(|r| FileItem::from_record(r, &guard.blobs))
        .collect();
    tree::sort_siblings(&mut items);

    debug!(owner = %owner, folder = ?folder_id, count = items.len(), "Fetched files");
    Ok(items)
}

/// The whole hierarchy of the signed-in user.
pub fn fetch_tree(state: &SharedState) -> Result<Vec<FileItem>> {
    let guard = lock(state)?;
    let owner = guard.session.require_user()?;

    let items: Vec<FileItem> = guard
        .database
        .list_files_for_owner(owner)?
        .iter()
        .map(|r| FileItem::from_record(r, &guard.blobs))
        .collect();

    Ok(tree::build_tree(items))
}

/// Root-to-folder path for breadcrumb navigation.
pub fn folder_path(state: &SharedState, folder_id: FileId) -> Result<Vec<(FileId, String)>> {
    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    let rows = guard.database.list_files_for_owner(owner)?;
    Ok(tree::breadcrumbs(&rows, folder_id))
}

/// Read a file's bytes back from the blob store.  Folders have no content and
/// read as `NotFound`.
pub async fn download_file(state: &SharedState, id: FileId) -> Result<Vec<u8>> {
    let (path, blobs) = {
        let guard = lock(state)?;
        let owner = guard.session.require_user()?;
        let record = owned_file(&guard.database, owner, id)?;
        let path = record.storage_path.ok_or(ClientError::NotFound("file"))?;
        (path, guard.blobs.clone())
    };

    let data = blobs.download(Bucket::Files, &path).await?;
    debug!(file_id = %id, size = data.len(), "File downloaded");
    Ok(data)
}

pub fn list_starred(state: &SharedState) -> Result<Vec<FileItem>> {
    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    Ok(guard
        .database
        .list_starred_files(owner)?
        .iter()
        .map(|r| FileItem::from_record(r, &guard.blobs))
        .collect())
}

/// Case-insensitive name search across all of the user's items.
pub fn search_files(state: &SharedState, query: &str) -> Result<Vec<FileItem>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(ValidationError::EmptyField("search query").into());
    }

    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    let mut items: Vec<FileItem> = guard
        .database
        .list_files_for_owner(owner)?
        .iter()
        .filter(|r| r.name.to_lowercase().contains(&needle))
        .map(|r| FileItem::from_record(r, &guard.blobs))
        .collect();
    tree::sort_siblings(&mut items);
    Ok(items)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

pub fn create_folder(state: &SharedState, name: &str, parent: Option<FileId>) -> Result<FileItem> {
    let name = clean_name(name, "folder name")?;

    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    if let Some(parent) = parent {
        require_folder(&guard.database, owner, parent)?;
    }

    let now = Utc::now();
    let record = FileRecord {
        id: FileId::new(),
        owner_id: owner,
        name,
        kind: FileKind::Folder,
        size_bytes: 0,
        mime_type: None,
        storage_path: None,
        content_hash: None,
        folder_id: parent,
        starred: false,
        created_at: now,
        updated_at: now,
    };
    guard.database.insert_file(&record)?;

    info!(folder_id = %record.id, parent = ?parent, "Folder created");
    Ok(FileItem::from_record(&record, &guard.blobs))
}

/// Store the bytes, then insert the row.  If the row insert fails the blob is
/// removed again.
pub async fn upload_file(
    state: &SharedState,
    request: UploadRequest,
    progress: Option<UploadProgress>,
) -> Result<FileItem> {
    let name = clean_name(&request.name, "file name")?;
    if request.data.is_empty() {
        return Err(ValidationError::EmptyField("file").into());
    }

    let (owner, blobs) = {
        let guard = lock(state)?;
        let owner = guard.session.require_user()?;
        if request.data.len() > guard.blobs.max_size() {
            return Err(StoreError::BlobTooLarge {
                size: request.data.len(),
                max: guard.blobs.max_size(),
            }
            .into());
        }
        if let Some(folder) = request.folder_id {
            require_folder(&guard.database, owner, folder)?;
        }
        (owner, guard.blobs.clone())
    };

    let id = FileId::new();
    let storage_path = format!("{owner}/{id}-{name}");
    let content_hash = blake3::hash(&request.data).to_hex().to_string();

    let ticker = progress.as_ref().map(|p| {
        p.set(0);
        p.spawn_ticker()
    });

    let stored = blobs
        .upload(Bucket::Files, &storage_path, &request.data)
        .await;

    if let Some(ticker) = ticker {
        ticker.abort();
    }

    let stored = match stored {
        Ok(stored) => stored,
        Err(e) => {
            if let Some(p) = &progress {
                p.set(0);
            }
            return Err(e.into());
        }
    };

    let now = Utc::now();
    let record = FileRecord {
        id,
        owner_id: owner,
        kind: FileKind::from_file_name(&name, request.mime_type.as_deref()),
        name,
        size_bytes: stored.size as i64,
        mime_type: request.mime_type,
        storage_path: Some(storage_path.clone()),
        content_hash: Some(content_hash),
        folder_id: request.folder_id,
        starred: false,
        created_at: now,
        updated_at: now,
    };

    let inserted = lock(state).and_then(|guard| {
        guard.database.insert_file(&record)?;
        Ok(FileItem::from_record(&record, &guard.blobs))
    });

    match inserted {
        Ok(item) => {
            if let Some(p) = &progress {
                p.set(100);
            }
            info!(file_id = %id, size = stored.size, "File uploaded");
            Ok(item)
        }
        Err(e) => {
            if let Some(p) = &progress {
                p.set(0);
            }
            if let Err(cleanup) = blobs.remove(Bucket::Files, &[storage_path]).await {
                warn!(file_id = %id, error = %cleanup, "Failed to remove orphaned blob");
            }
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

pub fn rename_item(state: &SharedState, id: FileId, name: &str) -> Result<FileItem> {
    let name = clean_name(name, "name")?;

    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    owned_file(&guard.database, owner, id)?;

    let record = guard.database.rename_file(id, &name)?;
    info!(file_id = %id, "Item renamed");
    Ok(FileItem::from_record(&record, &guard.blobs))
}

/// Flip the starred flag and return the new value.
pub fn toggle_star(state: &SharedState, id: FileId) -> Result<bool> {
    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    let current = owned_file(&guard.database, owner, id)?;

    let record = guard.database.set_file_starred(id, !current.starred)?;
    debug!(file_id = %id, starred = record.starred, "Star toggled");
    Ok(record.starred)
}

/// Move an item under `target` (`None` = root).
pub fn move_item(state: &SharedState, id: FileId, target: Option<FileId>) -> Result<FileItem> {
    let guard = lock(state)?;
    let owner = guard.session.require_user()?;
    let item = owned_file(&guard.database, owner, id)?;

    if let Some(target) = target {
        if target == id {
            return Err(ClientError::InvalidMove("an item cannot be moved into itself"));
        }
        let folder = owned_file(&guard.database, owner, target)
            .map_err(|_| ClientError::NotFound("folder"))?;
        if !folder.kind.is_folder() {
            return Err(ClientError::InvalidMove("the target is not a folder"));
        }
        let rows = guard.database.list_files_for_owner(owner)?;
        if tree::is_descendant(&rows, id, target) {
            return Err(ClientError::InvalidMove(
                "a folder cannot be moved into one of its subfolders",
            ));
        }
    }

    if item.folder_id == target {
        return Ok(FileItem::from_record(&item, &guard.blobs));
    }

    let record = guard.database.set_file_parent(id, target)?;
    info!(file_id = %id, target = ?target, "Item moved");
    Ok(FileItem::from_record(&record, &guard.blobs))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Delete a file, or a folder and everything below it.
///
/// Blobs of every affected file are removed first; then all rows are deleted
/// deepest first in one transaction, the target last.  Returns the number of
/// rows removed.
pub async fn delete_item(state: &SharedState, id: FileId) -> Result<usize> {
    let (order, blob_paths, blobs) = {
        let guard = lock(state)?;
        let owner = guard.session.require_user()?;
        owned_file(&guard.database, owner, id)?;

        let rows = guard.database.list_files_for_owner(owner)?;
        let mut order = tree::descendants_of(&rows, id);
        order.push(id);

        let blob_paths: Vec<String> = rows
            .iter()
            .filter(|r| order.contains(&r.id))
            .filter_map(|r| r.storage_path.clone())
            .collect();

        (order, blob_paths, guard.blobs.clone())
    };

    if !blob_paths.is_empty() {
        let report = blobs.remove(Bucket::Files, &blob_paths).await?;
        if !report.missing.is_empty() {
            warn!(file_id = %id, missing = report.missing.len(), "Some blobs were already gone");
        }
    }

    let removed = {
        let guard = lock(state)?;
        guard.database.delete_files(&order)?
    };

    info!(file_id = %id, removed, "Item deleted");
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trim a user-supplied name and strip path separators.
pub(crate) fn clean_name(name: &str, field: &'static str) -> std::result::Result<String, ValidationError> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(cleaned)
}

/// Fetch a row owned by `owner`.  Rows of other users look missing.
fn owned_file(db: &Database, owner: UserId, id: FileId) -> Result<FileRecord> {
    match db.get_file(id) {
        Ok(record) if record.owner_id == owner => Ok(record),
        Ok(_) | Err(StoreError::NotFound) => Err(ClientError::NotFound("file")),
        Err(e) => Err(e.into()),
    }
}

fn require_folder(db: &Database, owner: UserId, id: FileId) -> Result<FileRecord> {
    let record = owned_file(db, owner, id).map_err(|_| ClientError::NotFound("folder"))?;
    if !record.kind.is_folder() {
        return Err(ClientError::NotFound("folder"));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::signed_in_state;

    fn upload(name: &str, folder: Option<FileId>) -> UploadRequest {
        UploadRequest {
            name: name.to_string(),
            data: format!("contents of {name}").into_bytes(),
            folder_id: folder,
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn fetch_only_returns_requested_folder() {
        let (state, _dir, _) = signed_in_state().await;
        let music = create_folder(&state, "Music", None).unwrap();
        let docs = create_folder(&state, "Docs", None).unwrap();

        upload_file(&state, upload("a.mp3", Some(music.id)), None).await.unwrap();
        upload_file(&state, upload("b.mp3", Some(music.id)), None).await.unwrap();
        upload_file(&state, upload("c.pdf", Some(docs.id)), None).await.unwrap();
        upload_file(&state, upload("root.txt", None), None).await.unwrap();

        for folder in [Some(music.id), Some(docs.id), None] {
            let items = fetch_files(&state, folder).unwrap();
            assert!(!items.is_empty());
            assert!(items.iter().all(|i| i.folder_id == folder));
        }
        let root = fetch_files(&state, None).unwrap();
        let names: Vec<&str> = root.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Docs", "Music", "root.txt"]);
    }

    #[tokio::test]
    async fn upload_records_kind_size_and_url() {
        let (state, _dir, _) = signed_in_state().await;
        let (progress, rx) = UploadProgress::channel();

        let item = upload_file(&state, upload("demo.mp3", None), Some(progress))
            .await
            .unwrap();
        assert_eq!(item.kind, FileKind::Audio);
        assert_eq!(item.size_bytes as usize, "contents of demo.mp3".len());
        assert_eq!(item.size, "20 B");
        assert!(item.url.unwrap().contains("/files/"));
        assert_eq!(*rx.borrow(), 100);

        let guard = lock(&state).unwrap();
        let record = guard.database.get_file(item.id).unwrap();
        assert_eq!(
            record.content_hash.unwrap(),
            blake3::hash(b"contents of demo.mp3").to_hex().to_string()
        );
    }

    #[tokio::test]
    async fn download_returns_uploaded_bytes() {
        let (state, _dir, _) = signed_in_state().await;
        let item = upload_file(&state, upload("stem.wav", None), None).await.unwrap();
        assert_eq!(download_file(&state, item.id).await.unwrap(), b"contents of stem.wav");

        let folder = create_folder(&state, "Stems", None).unwrap();
        assert!(matches!(
            download_file(&state, folder.id).await,
            Err(ClientError::NotFound("file"))
        ));
        assert!(matches!(
            download_file(&state, FileId::new()).await,
            Err(ClientError::NotFound("file"))
        ));
    }

    #[tokio::test]
    async fn upload_rejects_bad_input_before_writing() {
        let (state, dir, _) = signed_in_state().await;

        let mut empty = upload("empty.txt", None);
        empty.data.clear();
        assert!(matches!(
            upload_file(&state, empty, None).await,
            Err(ClientError::Validation(ValidationError::EmptyField("file")))
        ));

        let mut big = upload("big.wav", None);
        big.data = vec![0u8; 64 * 1024 + 1];
        assert!(matches!(
            upload_file(&state, big, None).await,
            Err(ClientError::Store(StoreError::BlobTooLarge { .. }))
        ));

        assert!(matches!(
            upload_file(&state, upload("x.txt", Some(FileId::new())), None).await,
            Err(ClientError::NotFound("folder"))
        ));

        assert!(fetch_files(&state, None).unwrap().is_empty());
        assert!(!dir.path().join("blobs").join("files").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_ticker_climbs_to_ceiling() {
        let (progress, rx) = UploadProgress::channel();
        let ticker = progress.spawn_ticker();

        tokio::time::sleep(Duration::from_millis(UPLOAD_PROGRESS_TICK_MS * 3 + 50)).await;
        let mid = *rx.borrow();
        assert!((20..=40).contains(&mid), "progress was {mid}");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*rx.borrow(), UPLOAD_PROGRESS_CEILING);
        ticker.abort();
    }

    #[tokio::test]
    async fn star_toggle_round_trips() {
        let (state, _dir, _) = signed_in_state().await;
        let item = upload_file(&state, upload("cover.png", None), None).await.unwrap();
        assert!(!item.starred);

        assert!(toggle_star(&state, item.id).unwrap());
        assert_eq!(list_starred(&state).unwrap().len(), 1);
        assert!(!toggle_star(&state, item.id).unwrap());
        assert!(list_starred(&state).unwrap().is_empty());
    }

    #[tokio::test]
    async fn recursive_delete_removes_blobs_and_rows() {
        let (state, dir, _) = signed_in_state().await;
        let album = create_folder(&state, "Album", None).unwrap();
        let stems = create_folder(&state, "Stems", Some(album.id)).unwrap();
        let track = upload_file(&state, upload("track.wav", Some(album.id)), None).await.unwrap();
        let stem = upload_file(&state, upload("bass.wav", Some(stems.id)), None).await.unwrap();
        let keep = upload_file(&state, upload("keep.txt", None), None).await.unwrap();

        let paths: Vec<String> = {
            let guard = lock(&state).unwrap();
            [track.id, stem.id]
                .iter()
                .map(|id| guard.database.get_file(*id).unwrap().storage_path.unwrap())
                .collect()
        };

        assert_eq!(delete_item(&state, album.id).await.unwrap(), 4);

        let blob_root = dir.path().join("blobs").join("files");
        for path in &paths {
            assert!(!blob_root.join(path).exists(), "{path} should be gone");
        }
        let root: Vec<FileId> = fetch_files(&state, None).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(root, vec![keep.id]);
        assert!(!root.contains(&album.id));
        assert!(fetch_files(&state, Some(stems.id)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_blob() {
        let (state, dir, _) = signed_in_state().await;
        let file = upload_file(&state, upload("gone.txt", None), None).await.unwrap();
        let path = lock(&state)
            .unwrap()
            .database
            .get_file(file.id)
            .unwrap()
            .storage_path
            .unwrap();
        std::fs::remove_file(dir.path().join("blobs").join("files").join(path)).unwrap();

        assert_eq!(delete_item(&state, file.id).await.unwrap(), 1);
        assert!(matches!(
            delete_item(&state, file.id).await,
            Err(ClientError::NotFound("file"))
        ));
    }

    #[tokio::test]
    async fn move_guards_against_cycles() {
        let (state, _dir, _) = signed_in_state().await;
        let outer = create_folder(&state, "Outer", None).unwrap();
        let inner = create_folder(&state, "Inner", Some(outer.id)).unwrap();
        let deepest = create_folder(&state, "Deepest", Some(inner.id)).unwrap();
        let file = upload_file(&state, upload("note.txt", None), None).await.unwrap();

        assert!(matches!(
            move_item(&state, outer.id, Some(outer.id)),
            Err(ClientError::InvalidMove(_))
        ));
        assert!(matches!(
            move_item(&state, outer.id, Some(deepest.id)),
            Err(ClientError::InvalidMove(_))
        ));
        assert!(matches!(
            move_item(&state, outer.id, Some(file.id)),
            Err(ClientError::InvalidMove(_))
        ));

        let moved = move_item(&state, file.id, Some(deepest.id)).unwrap();
        assert_eq!(moved.folder_id, Some(deepest.id));
        let moved = move_item(&state, deepest.id, None).unwrap();
        assert_eq!(moved.folder_id, None);

        let crumbs = folder_path(&state, inner.id).unwrap();
        assert_eq!(crumbs.len(), 2);
    }

    #[tokio::test]
    async fn tree_and_search() {
        let (state, _dir, _) = signed_in_state().await;
        let folder = create_folder(&state, "Beats", None).unwrap();
        upload_file(&state, upload("Beat-01.wav", Some(folder.id)), None).await.unwrap();
        upload_file(&state, upload("vocals.wav", None), None).await.unwrap();

        let forest = fetch_tree(&state).unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].children.as_ref().unwrap().len(), 1);

        let hits = search_files(&state, "beat").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(search_files(&state, "  ").is_err());
    }

    #[tokio::test]
    async fn rename_validates_and_sanitises() {
        let (state, _dir, _) = signed_in_state().await;
        let folder = create_folder(&state, "Old", None).unwrap();

        assert!(rename_item(&state, folder.id, "   ").is_err());
        let renamed = rename_item(&state, folder.id, "new/name").unwrap();
        assert_eq!(renamed.name, "new_name");
    }

    #[tokio::test]
    async fn commands_require_sign_in() {
        let (state, _dir, _) = signed_in_state().await;
        lock(&state).unwrap().session.sign_out();
        assert!(matches!(fetch_files(&state, None), Err(ClientError::NotSignedIn)));
        assert!(matches!(
            create_folder(&state, "x", None),
            Err(ClientError::NotSignedIn)
        ));
    }
}
