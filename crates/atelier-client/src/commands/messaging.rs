//! Conversations and messages.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use atelier_shared::constants::MESSAGE_PREVIEW_LEN;
use atelier_shared::format::{format_file_size, truncate_preview};
use atelier_shared::types::{Bucket, ConversationId, FileId, FileKind, MessageId, UserId};
use atelier_shared::ValidationError;
use atelier_store::{
    BlobStore, Conversation, Database, Message, MessageAttachment, Participant, Profile,
    StoreError,
};

use crate::commands::files::clean_name;
use crate::error::{ClientError, Result};
use crate::state::{lock, SharedState};

const UNKNOWN_SENDER: &str = "Unknown";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: UserId,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: ConversationId,
    pub title: Option<String>,
    /// Everyone except the signed-in user.
    pub participants: Vec<ParticipantView>,
    pub last_message: Option<MessagePreview>,
    pub unread_count: i64,
    pub is_pinned: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub id: FileId,
    pub file_name: String,
    pub kind: FileKind,
    pub size: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentView>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResult {
    pub conversation_id: ConversationId,
    /// `true` when a conversation with the same members already existed.
    pub is_existing: bool,
}

/// A file sent along with a message.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub name: String,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

impl AttachmentView {
    fn from_row(row: &MessageAttachment, blobs: &BlobStore) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name.clone(),
            kind: row.kind,
            size: format_file_size(row.size_bytes.max(0) as u64),
            url: blobs.public_url(Bucket::Attachments, &row.storage_path),
        }
    }
}

impl MessageView {
    fn build(
        message: Message,
        names: &HashMap<UserId, String>,
        attachments: &[MessageAttachment],
        blobs: &BlobStore,
    ) -> Self {
        Self {
            sender_name: names
                .get(&message.sender_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            attachments: attachments
                .iter()
                .map(|a| AttachmentView::from_row(a, blobs))
                .collect(),
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Conversation list for the signed-in user, pinned first, then most recent.
pub fn list_conversations(state: &SharedState) -> Result<Vec<ConversationView>> {
    let guard = lock(state)?;
    let me = guard.session.require_user()?;
    let db = &guard.database;

    let participations = db.list_participations_for_user(me)?;
    let members = db.list_participants_for_user_conversations(me)?;
    let other_ids: Vec<UserId> = members
        .values()
        .flatten()
        .map(|p| p.user_id)
        .filter(|id| *id != me)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let names = display_names(db.get_profiles(&other_ids)?);

    let mut views = Vec::with_capacity(participations.len());
    for (conversation, mine) in participations {
        let last_message = db
            .last_message_for_conversation(conversation.id)?
            .map(|m| MessagePreview {
                sender_id: m.sender_id,
                content: preview_text(&m.content),
                created_at: m.created_at,
            });
        let unread_count = db.count_unread(conversation.id, me)?;
        let participants = members
            .get(&conversation.id)
            .map(|ps| {
                ps.iter()
                    .filter(|p| p.user_id != me)
                    .map(|p| ParticipantView {
                        id: p.user_id,
                        display_name: names
                            .get(&p.user_id)
                            .cloned()
                            .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        views.push(ConversationView {
            id: conversation.id,
            title: conversation.title,
            participants,
            last_message,
            unread_count,
            is_pinned: mine.is_pinned,
            updated_at: conversation.updated_at,
        });
    }

    views.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });

    debug!(user_id = %me, count = views.len(), "Listed conversations");
    Ok(views)
}

/// All messages of a conversation, oldest first.  Marks them read afterwards;
/// a failure there is logged and ignored.
pub fn open_conversation(state: &SharedState, id: ConversationId) -> Result<Vec<MessageView>> {
    let guard = lock(state)?;
    let me = guard.session.require_user()?;
    let db = &guard.database;

    let participants = require_participant(db, id, me)?;
    let member_ids: Vec<UserId> = participants.iter().map(|p| p.user_id).collect();

    let messages = db.list_messages_for_conversation(id)?;
    let attachments = db.list_attachments_for_conversation(id)?;

    let mut sender_ids: BTreeSet<UserId> = member_ids.into_iter().collect();
    sender_ids.extend(messages.iter().map(|m| m.sender_id));
    let names = display_names(db.get_profiles(&sender_ids.into_iter().collect::<Vec<_>>())?);

    let views: Vec<MessageView> = messages
        .into_iter()
        .map(|m| {
            let files = attachments.get(&m.id).map(Vec::as_slice).unwrap_or_default();
            MessageView::build(m, &names, files, &guard.blobs)
        })
        .collect();

    if let Err(e) = db.mark_conversation_read(id, me) {
        warn!(conversation_id = %id, error = %e, "Failed to mark conversation as read");
    }

    debug!(conversation_id = %id, count = views.len(), "Opened conversation");
    Ok(views)
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Send a message.  Attachments are uploaded one after another once the
/// message row exists.
pub async fn send_message(
    state: &SharedState,
    id: ConversationId,
    content: &str,
    attachments: Vec<AttachmentUpload>,
) -> Result<MessageView> {
    let content = content.trim().to_string();
    if content.is_empty() && attachments.is_empty() {
        return Err(ValidationError::EmptyField("message").into());
    }

    let mut prepared = Vec::with_capacity(attachments.len());
    for upload in attachments {
        let name = clean_name(&upload.name, "attachment name")?;
        if upload.data.is_empty() {
            return Err(ValidationError::EmptyField("attachment").into());
        }
        prepared.push((name, upload));
    }

    let (message, sender_name, blobs) = {
        let guard = lock(state)?;
        let me = guard.session.require_user()?;
        require_participant(&guard.database, id, me)?;

        let max = guard.blobs.max_size();
        if let Some((_, big)) = prepared.iter().find(|(_, u)| u.data.len() > max) {
            return Err(StoreError::BlobTooLarge {
                size: big.data.len(),
                max,
            }
            .into());
        }

        let message = Message {
            id: MessageId::new(),
            conversation_id: id,
            sender_id: me,
            content,
            is_read: false,
            created_at: Utc::now(),
        };
        guard.database.insert_message(&message)?;

        let sender_name = guard
            .session
            .current_user()
            .map(|u| u.display_name)
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        (message, sender_name, guard.blobs.clone())
    };

    let mut stored = Vec::with_capacity(prepared.len());
    for (name, upload) in prepared {
        let attachment_id = FileId::new();
        let path = format!("{id}/{}/{attachment_id}-{name}", message.id);
        let object = blobs.upload(Bucket::Attachments, &path, &upload.data).await?;

        let row = MessageAttachment {
            id: attachment_id,
            message_id: message.id,
            kind: FileKind::from_file_name(&name, upload.mime_type.as_deref()),
            file_name: name,
            storage_path: object.path,
            size_bytes: object.size as i64,
            created_at: Utc::now(),
        };
        lock(state)?.database.insert_attachment(&row)?;
        stored.push(row);
    }

    let guard = lock(state)?;
    guard.database.touch_conversation(id, message.created_at)?;

    info!(conversation_id = %id, message_id = %message.id, attachments = stored.len(), "Message sent");

    let names = HashMap::from([(message.sender_id, sender_name)]);
    Ok(MessageView::build(message, &names, &stored, &guard.blobs))
}

/// Start a conversation with `participants` plus the signed-in user, or return
/// the existing one with exactly the same members.
pub fn create_conversation(
    state: &SharedState,
    participants: &[UserId],
    title: Option<&str>,
) -> Result<CreateConversationResult> {
    let guard = lock(state)?;
    let me = guard.session.require_user()?;
    let db = &guard.database;

    let mut members: BTreeSet<UserId> = participants.iter().copied().collect();
    members.insert(me);
    if members.len() < 2 {
        return Err(ValidationError::TooFewParticipants.into());
    }

    let member_list: Vec<UserId> = members.iter().copied().collect();
    if db.get_profiles(&member_list)?.len() != member_list.len() {
        return Err(ClientError::NotFound("profile"));
    }

    if let Some((existing, _)) = db
        .participant_sets_for_user(me)?
        .into_iter()
        .find(|(_, set)| *set == members)
    {
        debug!(conversation_id = %existing, "Conversation already exists");
        return Ok(CreateConversationResult {
            conversation_id: existing,
            is_existing: true,
        });
    }

    let now = Utc::now();
    let conversation = Conversation {
        id: ConversationId::new(),
        title: title.map(str::trim).filter(|t| !t.is_empty()).map(String::from),
        created_at: now,
        updated_at: now,
    };
    db.create_conversation(&conversation, &member_list)?;

    info!(conversation_id = %conversation.id, members = member_list.len(), "Conversation created");
    Ok(CreateConversationResult {
        conversation_id: conversation.id,
        is_existing: false,
    })
}

/// Flip the signed-in user's pin on a conversation and return the new value.
pub fn toggle_pin(state: &SharedState, id: ConversationId) -> Result<bool> {
    let guard = lock(state)?;
    let me = guard.session.require_user()?;

    let current = require_participant(&guard.database, id, me)?
        .into_iter()
        .find(|p| p.user_id == me)
        .map(|p| p.is_pinned)
        .unwrap_or_default();

    let updated = guard.database.set_participant_pinned(id, me, !current)?;
    debug!(conversation_id = %id, pinned = updated.is_pinned, "Pin toggled");
    Ok(updated.is_pinned)
}

/// Delete a conversation with its messages and attachments.
pub async fn delete_conversation(state: &SharedState, id: ConversationId) -> Result<()> {
    let (paths, blobs) = {
        let guard = lock(state)?;
        let me = guard.session.require_user()?;
        let db = &guard.database;
        require_participant(db, id, me)?;

        let paths: Vec<String> = db
            .list_attachments_for_conversation(id)?
            .into_values()
            .flatten()
            .map(|a| a.storage_path)
            .collect();

        db.delete_conversation(id)?;
        (paths, guard.blobs.clone())
    };

    if !paths.is_empty() {
        if let Err(e) = blobs.remove(Bucket::Attachments, &paths).await {
            warn!(conversation_id = %id, error = %e, "Failed to remove attachment blobs");
        }
    }

    info!(conversation_id = %id, "Conversation deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Participants of `id`, provided `user` is one of them.
fn require_participant(db: &Database, id: ConversationId, user: UserId) -> Result<Vec<Participant>> {
    match db.get_conversation(id) {
        Ok(_) => {}
        Err(StoreError::NotFound) => return Err(ClientError::NotFound("conversation")),
        Err(e) => return Err(e.into()),
    }
    let participants = db.list_participants(id)?;
    if !participants.iter().any(|p| p.user_id == user) {
        return Err(ClientError::Forbidden("not a participant of this conversation"));
    }
    Ok(participants)
}

fn display_names(profiles: Vec<Profile>) -> HashMap<UserId, String> {
    profiles.into_iter().map(|p| (p.id, p.display_name)).collect()
}

fn preview_text(content: &str) -> String {
    if content.is_empty() {
        "Attachment".to_string()
    } else {
        truncate_preview(content, MESSAGE_PREVIEW_LEN)
    }
}
