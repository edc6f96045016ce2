//! CRUD operations for [`Conversation`] and [`Participant`] rows.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::params;

use atelier_shared::types::{ConversationId, UserId};

use crate::convert::{parsed, timestamp, timestamp_opt, ts};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Conversation, Participant};
use crate::realtime::{ChangeOp, TABLE_CONVERSATIONS, TABLE_PARTICIPANTS};

const PARTICIPANT_COLUMNS: &str = "conversation_id, user_id, is_pinned, last_read_at, joined_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a conversation and all of its participants atomically.
    pub fn create_conversation(
        &self,
        conversation: &Conversation,
        members: &[UserId],
    ) -> Result<Vec<Participant>> {
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.to_string(),
                conversation.title,
                ts(&conversation.created_at),
                ts(&conversation.updated_at),
            ],
        )?;

        let mut participants = Vec::with_capacity(members.len());
        for user_id in members {
            let participant = Participant {
                conversation_id: conversation.id,
                user_id: *user_id,
                is_pinned: false,
                last_read_at: None,
                joined_at: conversation.created_at,
            };
            tx.execute(
                "INSERT INTO conversation_participants
                     (conversation_id, user_id, is_pinned, last_read_at, joined_at)
                 VALUES (?1, ?2, 0, NULL, ?3)",
                params![
                    conversation.id.to_string(),
                    user_id.to_string(),
                    ts(&participant.joined_at),
                ],
            )?;
            participants.push(participant);
        }

        tx.commit()?;

        self.publish(TABLE_CONVERSATIONS, ChangeOp::Insert, conversation);
        for participant in &participants {
            self.publish(TABLE_PARTICIPANTS, ChangeOp::Insert, participant);
        }
        Ok(participants)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// Every participation row of `user`, paired with its conversation.
    pub fn list_participations_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<(Conversation, Participant)>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.title, c.created_at, c.updated_at,
                    p.conversation_id, p.user_id, p.is_pinned, p.last_read_at, p.joined_at
             FROM conversation_participants p
             JOIN conversations c ON c.id = p.conversation_id
             WHERE p.user_id = ?1
             ORDER BY c.updated_at DESC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], |row| {
            let conversation = row_to_conversation(row)?;
            let participant = participant_at(row, 4)?;
            Ok((conversation, participant))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn list_participants(&self, conversation: ConversationId) -> Result<Vec<Participant>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM conversation_participants
             WHERE conversation_id = ?1
             ORDER BY joined_at ASC"
        ))?;
        let rows = stmt.query_map(params![conversation.to_string()], |row| participant_at(row, 0))?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Participants of every conversation `user` belongs to, grouped by
    /// conversation.
    pub fn list_participants_for_user_conversations(
        &self,
        user: UserId,
    ) -> Result<HashMap<ConversationId, Vec<Participant>>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM conversation_participants
             WHERE conversation_id IN (
                 SELECT conversation_id FROM conversation_participants WHERE user_id = ?1
             )
             ORDER BY joined_at ASC"
        ))?;
        let rows = stmt.query_map(params![user.to_string()], |row| participant_at(row, 0))?;

        let mut map: HashMap<ConversationId, Vec<Participant>> = HashMap::new();
        for row in rows {
            let participant = row?;
            map.entry(participant.conversation_id)
                .or_default()
                .push(participant);
        }
        Ok(map)
    }

    /// Member sets of every conversation `user` belongs to.  Used to detect an
    /// existing conversation before creating a duplicate.
    pub fn participant_sets_for_user(
        &self,
        user: UserId,
    ) -> Result<HashMap<ConversationId, BTreeSet<UserId>>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.conversation_id, p.user_id
             FROM conversation_participants p
             WHERE p.conversation_id IN (
                 SELECT conversation_id FROM conversation_participants WHERE user_id = ?1
             )",
        )?;
        let rows = stmt.query_map(params![user.to_string()], |row| {
            Ok((parsed::<ConversationId>(row, 0)?, parsed::<UserId>(row, 1)?))
        })?;

        let mut sets: HashMap<ConversationId, BTreeSet<UserId>> = HashMap::new();
        for row in rows {
            let (conversation, member) = row?;
            sets.entry(conversation).or_default().insert(member);
        }
        Ok(sets)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn set_participant_pinned(
        &self,
        conversation: ConversationId,
        user: UserId,
        pinned: bool,
    ) -> Result<Participant> {
        self.update_participant(
            conversation,
            user,
            "UPDATE conversation_participants SET is_pinned = ?3
             WHERE conversation_id = ?1 AND user_id = ?2",
            pinned as i32,
        )
    }

    pub fn set_participant_last_read(
        &self,
        conversation: ConversationId,
        user: UserId,
        at: DateTime<Utc>,
    ) -> Result<Participant> {
        self.update_participant(
            conversation,
            user,
            "UPDATE conversation_participants SET last_read_at = ?3
             WHERE conversation_id = ?1 AND user_id = ?2",
            ts(&at),
        )
    }

    fn update_participant(
        &self,
        conversation: ConversationId,
        user: UserId,
        sql: &str,
        value: impl rusqlite::ToSql,
    ) -> Result<Participant> {
        let affected = self.conn().execute(
            sql,
            params![conversation.to_string(), user.to_string(), value],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        let participant = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id = ?2"
                ),
                params![conversation.to_string(), user.to_string()],
                |row| participant_at(row, 0),
            )
            .map_err(not_found)?;
        self.publish(TABLE_PARTICIPANTS, ChangeOp::Update, &participant);
        Ok(participant)
    }

    /// Record activity on a conversation (bumps `updated_at`).
    pub fn touch_conversation(&self, id: ConversationId, at: DateTime<Utc>) -> Result<Conversation> {
        let affected = self.conn().execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&at)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        let conversation = self.get_conversation(id)?;
        self.publish(TABLE_CONVERSATIONS, ChangeOp::Update, &conversation);
        Ok(conversation)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a conversation; participants, messages and attachment rows go
    /// with it.  Returns `true` if a row was deleted.
    pub fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        let conversation = match self.get_conversation(id) {
            Ok(c) => c,
            Err(StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };

        let affected = self.conn().execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected > 0 {
            self.publish(TABLE_CONVERSATIONS, ChangeOp::Delete, &conversation);
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: parsed(row, 0)?,
        title: row.get(1)?,
        created_at: timestamp(row, 2)?,
        updated_at: timestamp(row, 3)?,
    })
}

/// Decode the five participant columns starting at `base`.
fn participant_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Participant> {
    let pinned: i32 = row.get(base + 2)?;
    Ok(Participant {
        conversation_id: parsed(row, base)?,
        user_id: parsed(row, base + 1)?,
        is_pinned: pinned != 0,
        last_read_at: timestamp_opt(row, base + 3)?,
        joined_at: timestamp(row, base + 4)?,
    })
}
