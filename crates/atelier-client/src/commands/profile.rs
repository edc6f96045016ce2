use chrono::Utc;
use tracing::{info, warn};

use atelier_shared::types::{Bucket, FileId, FileKind, UserId};
use atelier_shared::ValidationError;
use atelier_store::Profile;

use crate::commands::files::clean_name;
use crate::error::Result;
use crate::state::{lock, SharedState};

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> std::result::Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ValidationError::UnknownVariant {
            kind: "email address",
            value: email,
        }),
    }
}

/// Create a profile.  Does not sign in.
pub fn register(state: &SharedState, email: &str, display_name: &str) -> Result<Profile> {
    let email = normalize_email(email)?;
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ValidationError::EmptyField("display name").into());
    }

    let profile = Profile {
        id: UserId::new(),
        email,
        display_name: display_name.to_string(),
        avatar_url: None,
        created_at: Utc::now(),
    };

    let guard = lock(state)?;
    guard.database.create_profile(&profile)?;

    info!(user_id = %profile.id, "Profile created");
    Ok(profile)
}

pub fn get_profile(state: &SharedState, id: UserId) -> Result<Profile> {
    let guard = lock(state)?;
    Ok(guard.database.get_profile(id)?)
}

/// Replace the signed-in user's avatar.  The previous avatar blob is removed
/// afterwards; failing that only logs.
pub async fn upload_avatar(
    state: &SharedState,
    name: &str,
    data: Vec<u8>,
    mime_type: Option<&str>,
) -> Result<Profile> {
    let name = clean_name(name, "avatar name")?;
    if data.is_empty() {
        return Err(ValidationError::EmptyField("avatar").into());
    }
    if FileKind::from_file_name(&name, mime_type) != FileKind::Image {
        return Err(ValidationError::UnknownVariant {
            kind: "image",
            value: name,
        }
        .into());
    }

    let (me, previous, blobs) = {
        let guard = lock(state)?;
        let me = guard.session.require_user()?;
        let previous = guard.database.get_profile(me)?.avatar_url;
        (me, previous, guard.blobs.clone())
    };

    let path = format!("{me}/{}-{name}", FileId::new());
    blobs.upload(Bucket::Avatars, &path, &data).await?;
    let url = blobs.public_url(Bucket::Avatars, &path);

    let updated = {
        let guard = lock(state)?;
        guard.database.set_profile_avatar(me, Some(&url))
    };
    let profile = match updated {
        Ok(profile) => profile,
        Err(e) => {
            let _ = blobs.remove(Bucket::Avatars, &[path]).await;
            return Err(e.into());
        }
    };

    let prefix = blobs.public_url(Bucket::Avatars, "");
    if let Some(old) = previous.as_deref().and_then(|u| u.strip_prefix(&prefix)) {
        if let Err(e) = blobs.remove(Bucket::Avatars, &[old.to_string()]).await {
            warn!(user_id = %me, error = %e, "Failed to remove previous avatar");
        }
    }

    info!(user_id = %me, "Avatar updated");
    Ok(profile)
}
