//! CRUD operations for [`FileRecord`] rows (files and folders).

use chrono::Utc;
use rusqlite::params;

use atelier_shared::types::{FileId, UserId};

use crate::convert::{parsed, parsed_opt, timestamp, ts};
use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::FileRecord;
use crate::realtime::{ChangeOp, TABLE_FILES};

const FILE_COLUMNS: &str = "id, owner_id, name, kind, size_bytes, mime_type, storage_path, \
                            content_hash, folder_id, starred, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn insert_file(&self, file: &FileRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO files (id, owner_id, name, kind, size_bytes, mime_type, storage_path,
                                content_hash, folder_id, starred, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                file.id.to_string(),
                file.owner_id.to_string(),
                file.name,
                file.kind.as_str(),
                file.size_bytes,
                file.mime_type,
                file.storage_path,
                file.content_hash,
                file.folder_id.map(|f| f.to_string()),
                file.starred as i32,
                ts(&file.created_at),
                ts(&file.updated_at),
            ],
        )?;
        self.publish(TABLE_FILES, ChangeOp::Insert, file);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_file(&self, id: FileId) -> Result<FileRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id.to_string()],
                row_to_file,
            )
            .map_err(not_found)
    }

    /// Every file and folder the owner has, in no particular hierarchy.
    pub fn list_files_for_owner(&self, owner: UserId) -> Result<Vec<FileRecord>> {
        self.query_files(
            &format!("SELECT {FILE_COLUMNS} FROM files WHERE owner_id = ?1 ORDER BY name ASC"),
            params![owner.to_string()],
        )
    }

    /// Direct children of `folder` (`None` = root level).
    pub fn list_files_in_folder(
        &self,
        owner: UserId,
        folder: Option<FileId>,
    ) -> Result<Vec<FileRecord>> {
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE owner_id = ?1 AND folder_id IS ?2
                 ORDER BY name ASC"
            ),
            params![owner.to_string(), folder.map(|f| f.to_string())],
        )
    }

    pub fn list_starred_files(&self, owner: UserId) -> Result<Vec<FileRecord>> {
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE owner_id = ?1 AND starred = 1
                 ORDER BY updated_at DESC"
            ),
            params![owner.to_string()],
        )
    }

    fn query_files(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn rename_file(&self, id: FileId, name: &str) -> Result<FileRecord> {
        self.update_file(
            id,
            "UPDATE files SET name = ?2, updated_at = ?3 WHERE id = ?1",
            name.to_string(),
        )
    }

    pub fn set_file_parent(&self, id: FileId, folder: Option<FileId>) -> Result<FileRecord> {
        self.update_file(
            id,
            "UPDATE files SET folder_id = ?2, updated_at = ?3 WHERE id = ?1",
            folder.map(|f| f.to_string()),
        )
    }

    pub fn set_file_starred(&self, id: FileId, starred: bool) -> Result<FileRecord> {
        self.update_file(
            id,
            "UPDATE files SET starred = ?2, updated_at = ?3 WHERE id = ?1",
            starred as i32,
        )
    }

    fn update_file(
        &self,
        id: FileId,
        sql: &str,
        value: impl rusqlite::ToSql,
    ) -> Result<FileRecord> {
        let affected = self
            .conn()
            .execute(sql, params![id.to_string(), value, ts(&Utc::now())])?;
        if affected == 0 {
            return Err(crate::StoreError::NotFound);
        }

        let file = self.get_file(id)?;
        self.publish(TABLE_FILES, ChangeOp::Update, &file);
        Ok(file)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete the given rows in one transaction, in the order given.  Children
    /// must come before their parent folder.  Returns the number of rows
    /// removed; ids that no longer exist are skipped.
    pub fn delete_files(&self, ids: &[FileId]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            let record = match self.get_file(*id) {
                Ok(record) => record,
                Err(crate::StoreError::NotFound) => continue,
                Err(e) => return Err(e),
            };
            tx.execute("DELETE FROM files WHERE id = ?1", params![id.to_string()])?;
            removed.push(record);
        }

        tx.commit()?;

        for record in &removed {
            self.publish(TABLE_FILES, ChangeOp::Delete, record);
        }
        Ok(removed.len())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let starred: i32 = row.get(9)?;

    Ok(FileRecord {
        id: parsed(row, 0)?,
        owner_id: parsed(row, 1)?,
        name: row.get(2)?,
        kind: parsed(row, 3)?,
        size_bytes: row.get(4)?,
        mime_type: row.get(5)?,
        storage_path: row.get(6)?,
        content_hash: row.get(7)?,
        folder_id: parsed_opt(row, 8)?,
        starred: starred != 0,
        created_at: timestamp(row, 10)?,
        updated_at: timestamp(row, 11)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::profiles::tests::seed_profile;
    use atelier_shared::types::FileKind;

    pub(crate) fn record(owner: UserId, name: &str, kind: FileKind, folder: Option<FileId>) -> FileRecord {
        let now = Utc::now();
        let is_folder = kind.is_folder();
        FileRecord {
            id: FileId::new(),
            owner_id: owner,
            name: name.to_string(),
            kind,
            size_bytes: if is_folder { 0 } else { 1234 },
            mime_type: None,
            storage_path: (!is_folder).then(|| format!("{owner}/{name}")),
            content_hash: None,
            folder_id: folder,
            starred: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn list_by_folder_only_returns_direct_children() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_profile(&db, "owner@example.com").id;

        let music = record(owner, "Music", FileKind::Folder, None);
        db.insert_file(&music).unwrap();
        let song = record(owner, "song.mp3", FileKind::Audio, Some(music.id));
        db.insert_file(&song).unwrap();
        let readme = record(owner, "readme.md", FileKind::Document, None);
        db.insert_file(&readme).unwrap();

        let root = db.list_files_in_folder(owner, None).unwrap();
        assert_eq!(root.len(), 2);
        assert!(root.iter().all(|f| f.folder_id.is_none()));

        let inside = db.list_files_in_folder(owner, Some(music.id)).unwrap();
        assert_eq!(inside, vec![song]);
    }

    #[test]
    fn other_owners_are_invisible() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com").id;
        let b = seed_profile(&db, "b@example.com").id;

        db.insert_file(&record(a, "mine.txt", FileKind::Document, None)).unwrap();
        assert!(db.list_files_for_owner(b).unwrap().is_empty());
        assert!(db.list_files_in_folder(b, None).unwrap().is_empty());
    }

    #[test]
    fn updates_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_profile(&db, "owner@example.com").id;
        let folder = record(owner, "Stems", FileKind::Folder, None);
        db.insert_file(&folder).unwrap();
        let file = record(owner, "kick.wav", FileKind::Audio, None);
        db.insert_file(&file).unwrap();

        assert_eq!(db.rename_file(file.id, "kick-01.wav").unwrap().name, "kick-01.wav");
        assert_eq!(
            db.set_file_parent(file.id, Some(folder.id)).unwrap().folder_id,
            Some(folder.id)
        );
        assert!(db.set_file_starred(file.id, true).unwrap().starred);
        assert_eq!(db.list_starred_files(owner).unwrap().len(), 1);

        assert!(matches!(
            db.rename_file(FileId::new(), "x"),
            Err(crate::StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_requires_children_first() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_profile(&db, "owner@example.com").id;
        let folder = record(owner, "Stems", FileKind::Folder, None);
        db.insert_file(&folder).unwrap();
        let child = record(owner, "snare.wav", FileKind::Audio, Some(folder.id));
        db.insert_file(&child).unwrap();

        // Parent first violates the folder foreign key and rolls back.
        assert!(db.delete_files(&[folder.id, child.id]).is_err());
        assert_eq!(db.list_files_for_owner(owner).unwrap().len(), 2);

        assert_eq!(db.delete_files(&[child.id, folder.id, FileId::new()]).unwrap(), 2);
        assert!(db.list_files_for_owner(owner).unwrap().is_empty());
    }
}
