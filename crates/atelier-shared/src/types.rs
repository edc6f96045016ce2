use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Profile / account identifier.
    UserId
);
uuid_id!(
    /// File or folder identifier.
    FileId
);
uuid_id!(ConversationId);
uuid_id!(MessageId);
uuid_id!(TransactionId);

// ---------------------------------------------------------------------------
// FileKind
// ---------------------------------------------------------------------------

/// Coarse file category used for icons, filtering and the audio player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Image,
    Video,
    Document,
    Folder,
    File,
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "md", "rtf", "odt", "xls", "xlsx", "ppt", "pptx", "csv",
];

impl FileKind {
    /// Infer the kind of an uploaded file.  A recognised MIME prefix wins over
    /// the extension.  Folders are never inferred.
    pub fn from_file_name(name: &str, mime: Option<&str>) -> Self {
        if let Some(mime) = mime {
            let mime = mime.to_ascii_lowercase();
            if mime.starts_with("audio/") {
                return Self::Audio;
            }
            if mime.starts_with("image/") {
                return Self::Image;
            }
            if mime.starts_with("video/") {
                return Self::Video;
            }
        }

        let ext = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return Self::File,
        };

        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Audio
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            Self::Document
        } else {
            Self::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Folder => "folder",
            Self::File => "file",
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "document" => Ok(Self::Document),
            "folder" => Ok(Self::Folder),
            "file" => Ok(Self::File),
            other => Err(ValidationError::UnknownVariant {
                kind: "file kind",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    GemPurchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::GemPurchase => "gem_purchase",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "gem_purchase" => Ok(Self::GemPurchase),
            other => Err(ValidationError::UnknownVariant {
                kind: "transaction kind",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

/// Named blob storage bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Files,
    Attachments,
    Avatars,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Attachments => "attachments",
            Self::Avatars => "avatars",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(FileKind::from_file_name("beat.MP3", None), FileKind::Audio);
        assert_eq!(FileKind::from_file_name("cover.jpeg", None), FileKind::Image);
        assert_eq!(FileKind::from_file_name("clip.webm", None), FileKind::Video);
        assert_eq!(FileKind::from_file_name("notes.md", None), FileKind::Document);
        assert_eq!(FileKind::from_file_name("archive.zip", None), FileKind::File);
        assert_eq!(FileKind::from_file_name("Makefile", None), FileKind::File);
        assert_eq!(FileKind::from_file_name(".mp3", None), FileKind::File);
    }

    #[test]
    fn mime_wins_over_extension() {
        assert_eq!(
            FileKind::from_file_name("recording.bin", Some("audio/mpeg")),
            FileKind::Audio
        );
        assert_eq!(
            FileKind::from_file_name("photo.txt", Some("IMAGE/PNG")),
            FileKind::Image
        );
        assert_eq!(
            FileKind::from_file_name("doc.pdf", Some("application/pdf")),
            FileKind::Document
        );
    }

    #[test]
    fn kind_parses_its_own_names() {
        for kind in [
            FileKind::Audio,
            FileKind::Image,
            FileKind::Video,
            FileKind::Document,
            FileKind::Folder,
            FileKind::File,
        ] {
            assert_eq!(kind.as_str().parse::<FileKind>().unwrap(), kind);
        }
        assert!("spreadsheet".parse::<FileKind>().is_err());
    }

    #[test]
    fn transaction_kind_names() {
        assert_eq!(TransactionKind::GemPurchase.as_str(), "gem_purchase");
        assert_eq!(
            "withdrawal".parse::<TransactionKind>().unwrap(),
            TransactionKind::Withdrawal
        );
    }

    #[test]
    fn ids_parse_trimmed() {
        let id = FileId::new();
        let parsed: FileId = format!(" {id} ").parse().unwrap();
        assert_eq!(parsed, id);
    }
}
