//! Row-change feed.
//!
//! Every write helper on [`Database`](crate::Database) publishes a
//! [`RowChange`] on a broadcast channel.  Consumers subscribe with a
//! [`ChangeFilter`] (table plus optional `column = value` condition) and only
//! see the changes that match.  Delivery is best-effort: a subscriber that
//! falls behind loses the oldest events.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use atelier_shared::constants::REALTIME_CHANNEL_CAPACITY;

pub const TABLE_PROFILES: &str = "profiles";
pub const TABLE_FILES: &str = "files";
pub const TABLE_CONVERSATIONS: &str = "conversations";
pub const TABLE_PARTICIPANTS: &str = "conversation_participants";
pub const TABLE_MESSAGES: &str = "messages";
pub const TABLE_ATTACHMENTS: &str = "message_attachments";
pub const TABLE_WALLETS: &str = "wallets";
pub const TABLE_WALLET_TRANSACTIONS: &str = "wallet_transactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A single row change.  `record` is the row after the write, or the row as it
/// was for deletes.
#[derive(Debug, Clone, Serialize)]
pub struct RowChange {
    pub table: &'static str,
    pub op: ChangeOp,
    pub record: Value,
}

/// Which changes a subscriber wants.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    pub table: &'static str,
    pub condition: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: &'static str) -> Self {
        Self {
            table,
            condition: None,
        }
    }

    /// Restrict to rows whose `column` serialises to the string `value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.condition = Some((column.into(), value.to_string()));
        self
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table {
            return false;
        }
        match &self.condition {
            None => true,
            Some((column, expected)) => match change.record.get(column) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                _ => false,
            },
        }
    }
}

pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<RowChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(REALTIME_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn publish(&self, table: &'static str, op: ChangeOp, record: Value) {
        // An error only means nobody is listening.
        let _ = self.tx.send(RowChange { table, op, record });
    }

    pub(crate) fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// A filtered receiver on the change feed.  Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<RowChange>,
    filter: ChangeFilter,
}

impl Subscription {
    /// Wait for the next matching change.  Returns `None` once the owning
    /// database has been dropped.
    pub async fn recv(&mut self) -> Option<RowChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(&change) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        table = self.filter.table,
                        skipped,
                        "realtime subscriber lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<RowChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) if self.filter.matches(&change) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(table = self.filter.table, skipped, "realtime subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_table_and_column() {
        let change = RowChange {
            table: TABLE_MESSAGES,
            op: ChangeOp::Insert,
            record: json!({ "conversation_id": "abc", "is_read": false }),
        };

        assert!(ChangeFilter::table(TABLE_MESSAGES).matches(&change));
        assert!(!ChangeFilter::table(TABLE_FILES).matches(&change));
        assert!(ChangeFilter::table(TABLE_MESSAGES)
            .eq("conversation_id", "abc")
            .matches(&change));
        assert!(!ChangeFilter::table(TABLE_MESSAGES)
            .eq("conversation_id", "xyz")
            .matches(&change));
        assert!(ChangeFilter::table(TABLE_MESSAGES)
            .eq("is_read", false)
            .matches(&change));
        assert!(!ChangeFilter::table(TABLE_MESSAGES)
            .eq("missing", "abc")
            .matches(&change));
    }

    #[tokio::test]
    async fn subscription_skips_non_matching() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(ChangeFilter::table(TABLE_FILES).eq("owner_id", "u1"));

        feed.publish(TABLE_FILES, ChangeOp::Insert, json!({ "owner_id": "u2" }));
        feed.publish(TABLE_MESSAGES, ChangeOp::Insert, json!({ "owner_id": "u1" }));
        feed.publish(TABLE_FILES, ChangeOp::Update, json!({ "owner_id": "u1", "name": "a" }));

        let change = sub.recv().await.unwrap();
        assert_eq!(change.op, ChangeOp::Update);
        assert_eq!(change.record["name"], "a");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn closed_feed_ends_subscription() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(ChangeFilter::table(TABLE_FILES));
        drop(feed);
        assert!(sub.recv().await.is_none());
    }
}
