//! Realtime listeners.
//!
//! A listener forwards matching row changes from the store's change feed into
//! an `mpsc` channel.  Dropping the listener stops the forwarding task and
//! unsubscribes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use atelier_shared::types::{ConversationId, FileId, MessageId, UserId};
use atelier_store::realtime::{TABLE_FILES, TABLE_MESSAGES};
use atelier_store::{ChangeFilter, ChangeOp, FileRecord, Message, RowChange, Subscription};

use crate::error::Result;
use crate::state::{lock, SharedState};

pub const EVENT_NEW_MESSAGE: &str = "new-message";
pub const EVENT_FILE_CHANGED: &str = "file-changed";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: String,
}

impl From<Message> for NewMessagePayload {
    fn from(m: Message) -> Self {
        Self {
            conversation_id: m.conversation_id,
            message_id: m.id,
            sender_id: m.sender_id,
            content: m.content,
            timestamp: m.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileChangePayload {
    pub op: ChangeOp,
    pub file_id: FileId,
    pub folder_id: Option<FileId>,
    pub name: String,
}

impl FileChangePayload {
    fn new(op: ChangeOp, file: FileRecord) -> Self {
        Self {
            op,
            file_id: file.id,
            folder_id: file.folder_id,
            name: file.name,
        }
    }
}

/// Receives forwarded events until dropped.
pub struct Listener<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: JoinHandle<()>,
}

pub type MessageListener = Listener<NewMessagePayload>;
pub type FileListener = Listener<FileChangePayload>;

impl<T> Listener<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// New messages in one conversation.  Must be called from within a Tokio
/// runtime.
pub fn subscribe_messages(state: &SharedState, conversation: ConversationId) -> Result<MessageListener> {
    let subscription = {
        let guard = lock(state)?;
        guard.session.require_user()?;
        guard
            .database
            .subscribe(ChangeFilter::table(TABLE_MESSAGES).eq("conversation_id", conversation))
    };

    Ok(forward(subscription, |change| {
        if change.op != ChangeOp::Insert {
            return None;
        }
        decode::<Message>(EVENT_NEW_MESSAGE, change).map(NewMessagePayload::from)
    }))
}

/// Inserts, updates and deletes of the signed-in user's files.
pub fn subscribe_files(state: &SharedState) -> Result<FileListener> {
    let subscription = {
        let guard = lock(state)?;
        let owner = guard.session.require_user()?;
        guard
            .database
            .subscribe(ChangeFilter::table(TABLE_FILES).eq("owner_id", owner))
    };

    Ok(forward(subscription, |change| {
        let op = change.op;
        decode::<FileRecord>(EVENT_FILE_CHANGED, change).map(|f| FileChangePayload::new(op, f))
    }))
}

fn forward<T, F>(mut subscription: Subscription, mut map: F) -> Listener<T>
where
    T: Send + 'static,
    F: FnMut(RowChange) -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(change) = subscription.recv().await {
            if let Some(event) = map(change) {
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    });
    Listener { rx, handle }
}

fn decode<T: DeserializeOwned>(event: &str, change: RowChange) -> Option<T> {
    match serde_json::from_value(change.record) {
        Ok(row) => Some(row),
        Err(e) => {
            warn!(event, error = %e, "Failed to decode realtime row");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::commands::files::create_folder;
    use crate::commands::messaging::{create_conversation, send_message};
    use crate::commands::profile::register;
    use crate::state::tests::signed_in_state;

    #[tokio::test]
    async fn message_listener_only_sees_its_conversation() {
        let (state, _dir, me) = signed_in_state().await;
        let a = register(&state, "a@example.com", "A").unwrap();
        let b = register(&state, "b@example.com", "B").unwrap();
        let with_a = create_conversation(&state, &[a.id], None).unwrap().conversation_id;
        let with_b = create_conversation(&state, &[b.id], None).unwrap().conversation_id;

        let mut listener = subscribe_messages(&state, with_a).unwrap();

        send_message(&state, with_b, "elsewhere", Vec::new()).await.unwrap();
        send_message(&state, with_a, "here", Vec::new()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), listener.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.conversation_id, with_a);
        assert_eq!(event.sender_id, me.id);
        assert_eq!(event.content, "here");
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn file_listener_reports_inserts() {
        let (state, _dir, _) = signed_in_state().await;
        let mut listener = subscribe_files(&state).unwrap();

        let folder = create_folder(&state, "Samples", None).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), listener.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.op, ChangeOp::Insert);
        assert_eq!(event.file_id, folder.id);
        assert_eq!(event.name, "Samples");
    }

    #[tokio::test]
    async fn listeners_require_sign_in() {
        let (state, _dir, _) = signed_in_state().await;
        lock(&state).unwrap().session.sign_out();
        assert!(subscribe_files(&state).is_err());
    }
}
