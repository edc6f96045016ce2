//! CRUD operations for [`Profile`] records.

use rusqlite::{params, params_from_iter, OptionalExtension};

use atelier_shared::types::UserId;

use crate::convert::{parsed, timestamp, ts};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Profile;
use crate::realtime::{ChangeOp, TABLE_PROFILES};

const PROFILE_COLUMNS: &str = "id, email, display_name, avatar_url, created_at";

/// Ids per `IN (...)` statement; SQLite caps bound parameters per statement.
const LOOKUP_BATCH: usize = 500;

impl Database {
    pub fn create_profile(&self, profile: &Profile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (id, email, display_name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.id.to_string(),
                profile.email,
                profile.display_name,
                profile.avatar_url,
                ts(&profile.created_at),
            ],
        )?;
        self.publish(TABLE_PROFILES, ChangeOp::Insert, profile);
        Ok(())
    }

    pub fn get_profile(&self, id: UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(not_found)
    }

    /// Replace (or clear) the profile's avatar URL.
    pub fn set_profile_avatar(&self, id: UserId, avatar_url: Option<&str>) -> Result<Profile> {
        let affected = self.conn().execute(
            "UPDATE profiles SET avatar_url = ?2 WHERE id = ?1",
            params![id.to_string(), avatar_url],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        let profile = self.get_profile(id)?;
        self.publish(TABLE_PROFILES, ChangeOp::Update, &profile);
        Ok(profile)
    }

    /// Look a profile up by (already normalised) email.
    pub fn get_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let profile = self
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = ?1"),
                params![email],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Fetch several profiles at once, ordered by display name.  Unknown ids
    /// are skipped.
    pub fn get_profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>> {
        let mut profiles = Vec::new();
        for chunk in ids.chunks(LOOKUP_BATCH) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn().prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(
                params_from_iter(chunk.iter().map(|id| id.to_string())),
                row_to_profile,
            )?;
            for row in rows {
                profiles.push(row?);
            }
        }
        profiles.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(profiles)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: parsed(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn seed_profile(db: &Database, email: &str) -> Profile {
        let profile = Profile {
            id: UserId::new(),
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            avatar_url: None,
            created_at: Utc::now(),
        };
        db.create_profile(&profile).unwrap();
        profile
    }

    #[test]
    fn create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_profile(&db, "alice@example.com");

        assert_eq!(db.get_profile(alice.id).unwrap(), alice);
        assert_eq!(
            db.get_profile_by_email("alice@example.com").unwrap(),
            Some(alice.clone())
        );
        assert!(db.get_profile_by_email("bob@example.com").unwrap().is_none());
        assert!(matches!(
            db.get_profile(UserId::new()),
            Err(crate::StoreError::NotFound)
        ));
    }

    #[test]
    fn email_is_unique() {
        let db = Database::open_in_memory().unwrap();
        seed_profile(&db, "alice@example.com");

        let dup = Profile {
            id: UserId::new(),
            email: "alice@example.com".into(),
            display_name: "Other".into(),
            avatar_url: None,
            created_at: Utc::now(),
        };
        assert!(db.create_profile(&dup).is_err());
    }

    #[test]
    fn batch_lookup_skips_unknown() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com");
        let b = seed_profile(&db, "b@example.com");

        let found = db.get_profiles(&[a.id, UserId::new(), b.id]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(db.get_profiles(&[]).unwrap().is_empty());
    }

    #[test]
    fn avatar_can_be_set_and_cleared() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com");

        let updated = db.set_profile_avatar(a.id, Some("http://x/avatars/a.png")).unwrap();
        assert_eq!(updated.avatar_url.as_deref(), Some("http://x/avatars/a.png"));
        assert!(db.set_profile_avatar(a.id, None).unwrap().avatar_url.is_none());
        assert!(db.set_profile_avatar(UserId::new(), None).is_err());
    }

    #[test]
    fn batch_lookup_spans_several_statements() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_profile(&db, "a@example.com");
        let b = seed_profile(&db, "b@example.com");

        let mut ids: Vec<UserId> = (0..LOOKUP_BATCH * 2).map(|_| UserId::new()).collect();
        ids.insert(0, a.id);
        ids.push(b.id);

        let found = db.get_profiles(&ids).unwrap();
        assert_eq!(found.len(), 2);
    }
}
