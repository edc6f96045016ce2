use thiserror::Error;

use atelier_shared::ValidationError;
use atelier_store::StoreError;

/// Errors returned by every data-access operation.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Invalid move: {0}")]
    InvalidMove(&'static str),

    #[error("State lock poisoned")]
    LockPoisoned,
}

impl ClientError {
    /// Short text suitable for a toast.  Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Store(StoreError::InsufficientFunds { .. }) => "Insufficient funds".to_string(),
            Self::Store(StoreError::BlobTooLarge { .. }) => "File is too large".to_string(),
            Self::Store(StoreError::NotFound) | Self::NotFound(_) => {
                "The item no longer exists".to_string()
            }
            Self::NotSignedIn => "Please sign in first".to_string(),
            Self::InvalidMove(reason) => format!("Cannot move item: {reason}"),
            Self::Forbidden(_) => "You do not have access to this item".to_string(),
            Self::Store(_) | Self::LockPoisoned => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_internals() {
        let err = ClientError::Store(StoreError::BlobStorage("disk on fire at /var/x".into()));
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");

        let err = ClientError::Store(StoreError::InsufficientFunds {
            balance: 1,
            requested: 2,
        });
        assert_eq!(err.user_message(), "Insufficient funds");
        assert_eq!(err.to_string(), "Insufficient funds");

        let err = ClientError::from(ValidationError::EmptyField("name"));
        assert_eq!(err.user_message(), "name must not be empty");
    }
}
