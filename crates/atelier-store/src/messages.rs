use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use atelier_shared::types::{ConversationId, MessageId, UserId};

use crate::convert::{parsed, timestamp, ts};
use crate::database::Database;
use crate::error::Result;
use crate::models::{Message, MessageAttachment};
use crate::realtime::{ChangeOp, TABLE_ATTACHMENTS, TABLE_MESSAGES};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, is_read, created_at";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.is_read as i32,
                ts(&message.created_at),
            ],
        )?;
        self.publish(TABLE_MESSAGES, ChangeOp::Insert, message);
        Ok(())
    }

    /// All messages of a conversation, oldest first.
    pub fn list_messages_for_conversation(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![conversation.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn last_message_for_conversation(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![conversation.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Messages in `conversation` that `reader` did not send and that arrived
    /// after the reader's `last_read_at`.  Zero for non-participants.
    pub fn count_unread(&self, conversation: ConversationId, reader: UserId) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN conversation_participants p
               ON p.conversation_id = m.conversation_id AND p.user_id = ?2
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND (p.last_read_at IS NULL OR m.created_at > p.last_read_at)",
            params![conversation.to_string(), reader.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Advance `reader`'s read marker past the newest message and flag the
    /// messages they received as read (the sender-side receipt).
    ///
    /// Other participants' unread counts are unaffected.  Returns the number
    /// of messages whose receipt flag changed.
    pub fn mark_conversation_read(&self, conversation: ConversationId, reader: UserId) -> Result<usize> {
        let newest: Option<String> = self.conn().query_row(
            "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
            params![conversation.to_string()],
            |row| row.get(0),
        )?;
        let now = Utc::now();
        let read_up_to = match newest {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)?
                .with_timezone(&Utc)
                .max(now),
            None => now,
        };

        let tx = self.conn().unchecked_transaction()?;
        self.set_participant_last_read(conversation, reader, read_up_to)?;

        let unread: Vec<Message> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0"
            ))?;
            let rows = stmt.query_map(
                params![conversation.to_string(), reader.to_string()],
                row_to_message,
            )?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let affected = tx.execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
            params![conversation.to_string(), reader.to_string()],
        )?;
        tx.commit()?;

        for mut message in unread {
            message.is_read = true;
            self.publish(TABLE_MESSAGES, ChangeOp::Update, &message);
        }
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------

    pub fn insert_attachment(&self, attachment: &MessageAttachment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO message_attachments
                 (id, message_id, file_name, storage_path, kind, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attachment.id.to_string(),
                attachment.message_id.to_string(),
                attachment.file_name,
                attachment.storage_path,
                attachment.kind.as_str(),
                attachment.size_bytes,
                ts(&attachment.created_at),
            ],
        )?;
        self.publish(TABLE_ATTACHMENTS, ChangeOp::Insert, attachment);
        Ok(())
    }

    /// Attachments of every message in a conversation, grouped by message.
    pub fn list_attachments_for_conversation(
        &self,
        conversation: ConversationId,
    ) -> Result<HashMap<MessageId, Vec<MessageAttachment>>> {
        let mut stmt = self.conn().prepare(
            "SELECT a.id, a.message_id, a.file_name, a.storage_path, a.kind, a.size_bytes, a.created_at
             FROM message_attachments a
             JOIN messages m ON m.id = a.message_id
             WHERE m.conversation_id = ?1
             ORDER BY a.created_at ASC, a.rowid ASC",
        )?;

        let rows = stmt.query_map(params![conversation.to_string()], |row| {
            Ok(MessageAttachment {
                id: parsed(row, 0)?,
                message_id: parsed(row, 1)?,
                file_name: row.get(2)?,
                storage_path: row.get(3)?,
                kind: parsed(row, 4)?,
                size_bytes: row.get(5)?,
                created_at: timestamp(row, 6)?,
            })
        })?;

        let mut map: HashMap<MessageId, Vec<MessageAttachment>> = HashMap::new();
        for row in rows {
            let attachment = row?;
            map.entry(attachment.message_id).or_default().push(attachment);
        }
        Ok(map)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let is_read: i32 = row.get(4)?;
    Ok(Message {
        id: parsed(row, 0)?,
        conversation_id: parsed(row, 1)?,
        sender_id: parsed(row, 2)?,
        content: row.get(3)?,
        is_read: is_read != 0,
        created_at: timestamp(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::tests::seed_conversation;
    use crate::profiles::tests::seed_profile;
    use crate::realtime::ChangeFilter;
    use atelier_shared::types::{FileId, FileKind};
    use chrono::{Duration, Utc};

    fn message(conversation: ConversationId, sender: UserId, content: &str, offset_secs: i64) -> Message {
        Message {
            id: MessageId::new(),
            conversation_id: conversation,
            sender_id: sender,
            content: content.to_string(),
            is_read: false,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn ordered_oldest_first_and_last_is_newest() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com").id;
        let b = seed_profile(&db, "b@example.com").id;
        let conversation = seed_conversation(&db, &[a, b]).id;

        db.insert_message(&message(conversation, a, "second", 10)).unwrap();
        db.insert_message(&message(conversation, b, "first", 0)).unwrap();
        db.insert_message(&message(conversation, a, "third", 20)).unwrap();

        let contents: Vec<String> = db
            .list_messages_for_conversation(conversation)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);

        let last = db.last_message_for_conversation(conversation).unwrap().unwrap();
        assert_eq!(last.content, "third");
    }

    #[test]
    fn unread_counts_exclude_own_messages() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com").id;
        let b = seed_profile(&db, "b@example.com").id;
        let conversation = seed_conversation(&db, &[a, b]).id;

        db.insert_message(&message(conversation, a, "hi", 0)).unwrap();
        db.insert_message(&message(conversation, b, "hey", 1)).unwrap();
        db.insert_message(&message(conversation, b, "you there?", 2)).unwrap();

        assert_eq!(db.count_unread(conversation, a).unwrap(), 2);
        assert_eq!(db.count_unread(conversation, b).unwrap(), 1);

        assert_eq!(db.mark_conversation_read(conversation, a).unwrap(), 2);
        assert_eq!(db.count_unread(conversation, a).unwrap(), 0);
        assert_eq!(db.count_unread(conversation, b).unwrap(), 1);
        assert_eq!(db.mark_conversation_read(conversation, a).unwrap(), 0);
    }

    #[test]
    fn attachments_grouped_by_message() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com").id;
        let b = seed_profile(&db, "b@example.com").id;
        let conversation = seed_conversation(&db, &[a, b]).id;
        let m = message(conversation, a, "see attached", 0);
        db.insert_message(&m).unwrap();

        for name in ["demo.mp3", "cover.png"] {
            db.insert_attachment(&MessageAttachment {
                id: FileId::new(),
                message_id: m.id,
                file_name: name.into(),
                storage_path: format!("{conversation}/{}/{name}", m.id),
                kind: FileKind::from_file_name(name, None),
                size_bytes: 10,
                created_at: Utc::now(),
            })
            .unwrap();
        }

        let other = seed_conversation(&db, &[a, b]).id;
        db.insert_message(&message(other, b, "no files here", 0)).unwrap();

        let map = db.list_attachments_for_conversation(conversation).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&m.id].len(), 2);
        assert!(db.list_attachments_for_conversation(other).unwrap().is_empty());
    }

    #[test]
    fn read_state_is_per_participant() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com").id;
        let b = seed_profile(&db, "b@example.com").id;
        let c = seed_profile(&db, "c@example.com").id;
        let group = seed_conversation(&db, &[a, b, c]).id;

        db.insert_message(&message(group, a, "hello all", 0)).unwrap();

        db.mark_conversation_read(group, b).unwrap();
        assert_eq!(db.count_unread(group, b).unwrap(), 0);
        assert_eq!(db.count_unread(group, c).unwrap(), 1);

        db.insert_message(&message(group, a, "still there?", 5)).unwrap();
        assert_eq!(db.count_unread(group, b).unwrap(), 1);
        assert_eq!(db.count_unread(group, c).unwrap(), 2);

        let outsider = seed_profile(&db, "d@example.com").id;
        assert_eq!(db.count_unread(group, outsider).unwrap(), 0);
        assert!(db.mark_conversation_read(group, outsider).is_err());
    }

    #[tokio::test]
    async fn insert_publishes_change() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com").id;
        let b = seed_profile(&db, "b@example.com").id;
        let conversation = seed_conversation(&db, &[a, b]).id;

        let mut sub = db.subscribe(
            ChangeFilter::table(crate::realtime::TABLE_MESSAGES).eq("conversation_id", conversation),
        );
        let m = message(conversation, a, "ping", 0);
        db.insert_message(&m).unwrap();

        let change = sub.recv().await.unwrap();
        assert_eq!(change.record["content"], "ping");
    }
}
