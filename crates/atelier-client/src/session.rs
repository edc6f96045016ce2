//! Process-wide auth session.
//!
//! [`SessionContext`] holds the signed-in user behind a `watch` channel.  Views
//! attach with [`SessionContext::on_change`] when they mount and drop the
//! returned [`SessionListener`] when they unmount.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use atelier_shared::types::UserId;
use atelier_store::{Database, Profile};

use crate::commands::profile::normalize_email;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
}

impl From<&Profile> for SessionUser {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            email: p.email.clone(),
            display_name: p.display_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Option<SessionUser>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve the profile for `email` and make it the current user.
    pub fn sign_in(&self, db: &Database, email: &str) -> Result<SessionUser> {
        let email = normalize_email(email)?;
        let profile = db
            .get_profile_by_email(&email)?
            .ok_or(ClientError::NotFound("profile"))?;
        Ok(self.sign_in_as(&profile))
    }

    pub fn sign_in_as(&self, profile: &Profile) -> SessionUser {
        let user = SessionUser::from(profile);
        info!(user_id = %user.id, "signed in");
        self.tx.send_replace(Some(user.clone()));
        user
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            info!(user_id = %previous.id, "signed out");
        }
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.tx.borrow().clone()
    }

    /// Id of the signed-in user, or [`ClientError::NotSignedIn`].
    pub fn require_user(&self) -> Result<UserId> {
        self.tx
            .borrow()
            .as_ref()
            .map(|u| u.id)
            .ok_or(ClientError::NotSignedIn)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionUser>> {
        self.tx.subscribe()
    }

    /// Run `f` on every session change until the listener is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn on_change<F>(&self, mut f: F) -> SessionListener
    where
        F: FnMut(Option<SessionUser>) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                f(current);
            }
        });
        SessionListener { handle }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps an [`SessionContext::on_change`] callback alive.  Dropping it stops
/// the callback.
pub struct SessionListener {
    handle: JoinHandle<()>,
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn profile(db: &Database, email: &str) -> Profile {
        let profile = Profile {
            id: UserId::new(),
            email: email.to_string(),
            display_name: "Test".into(),
            avatar_url: None,
            created_at: Utc::now(),
        };
        db.create_profile(&profile).unwrap();
        profile
    }

    #[test]
    fn sign_in_and_out() {
        let db = Database::open_in_memory().unwrap();
        let p = profile(&db, "maker@example.com");
        let session = SessionContext::new();

        assert!(matches!(session.require_user(), Err(ClientError::NotSignedIn)));

        let user = session.sign_in(&db, "  Maker@Example.com ").unwrap();
        assert_eq!(user.id, p.id);
        assert_eq!(session.require_user().unwrap(), p.id);

        session.sign_out();
        assert!(session.current_user().is_none());
    }

    #[test]
    fn unknown_email_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let session = SessionContext::new();
        assert!(matches!(
            session.sign_in(&db, "ghost@example.com"),
            Err(ClientError::NotFound("profile"))
        ));
    }

    #[tokio::test]
    async fn listener_sees_changes_until_dropped() {
        let db = Database::open_in_memory().unwrap();
        let p = profile(&db, "maker@example.com");
        let session = SessionContext::new();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = session.on_change(move |user| {
            let _ = tx.send(user.map(|u| u.id));
        });
        tokio::task::yield_now().await;

        session.sign_in_as(&p);
        assert_eq!(rx.recv().await.unwrap(), Some(p.id));

        session.sign_out();
        assert_eq!(rx.recv().await.unwrap(), None);

        drop(listener);
        session.sign_in_as(&p);
        // The sender half lived inside the aborted task, so the channel closes.
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(next, Ok(None)));
    }
}
