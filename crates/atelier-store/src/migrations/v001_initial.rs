//! v001 -- Initial schema creation.
//!
//! Creates `profiles` and the self-referencing `files` table that holds both
//! files and folders.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    email        TEXT NOT NULL UNIQUE,        -- lowercased
    display_name TEXT NOT NULL,
    avatar_url   TEXT,
    created_at   TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Files and folders
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    owner_id     TEXT NOT NULL,               -- FK -> profiles(id)
    name         TEXT NOT NULL,
    kind         TEXT NOT NULL,               -- audio/image/video/document/folder/file
    size_bytes   INTEGER NOT NULL DEFAULT 0,
    mime_type    TEXT,
    storage_path TEXT,                        -- NULL for folders
    content_hash TEXT,                        -- BLAKE3 hex, NULL for folders
    folder_id    TEXT,                        -- parent folder, NULL at the root
    starred      INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,

    FOREIGN KEY (owner_id)  REFERENCES profiles(id) ON DELETE CASCADE,
    FOREIGN KEY (folder_id) REFERENCES files(id)
);

CREATE INDEX IF NOT EXISTS idx_files_owner_folder ON files(owner_id, folder_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
