//! Row types persisted in the local database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be published on
//! the change feed and handed to the client layer unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_shared::types::{
    ConversationId, FileId, FileKind, MessageId, TransactionId, TransactionKind, UserId,
};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    /// Always stored lowercased.
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// A file or folder row.  Folders have no storage path or content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_id: UserId,
    pub name: String,
    pub kind: FileKind,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    /// Object path inside the `files` bucket.
    pub storage_path: Option<String>,
    /// BLAKE3 hash of the uploaded bytes (hex).
    pub content_hash: Option<String>,
    /// Parent folder; `None` at the root.
    pub folder_id: Option<FileId>,
    pub starred: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever a message is sent.
    pub updated_at: DateTime<Utc>,
}

/// Membership of one user in one conversation, with per-user pin/read state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_pinned: bool,
    pub last_read_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageAttachment {
    pub id: FileId,
    pub message_id: MessageId,
    pub file_name: String,
    /// Object path inside the `attachments` bucket.
    pub storage_path: String,
    pub kind: FileKind,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance_cents: i64,
    pub gems: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed: credits are positive, debits negative.
    pub amount_cents: i64,
    pub gems_delta: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A balance/gem adjustment applied atomically together with its ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletChange {
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub gems_delta: i64,
    pub description: String,
}
