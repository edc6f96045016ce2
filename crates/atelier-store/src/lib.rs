//! # atelier-store
//!
//! Local storage backend for Atelier: typed row CRUD over SQLite, bucketed
//! blob storage on disk, and a row-change feed for realtime subscribers.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and an async [`BlobStore`].

pub mod blobs;
pub mod conversations;
pub mod database;
pub mod files;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod realtime;
pub mod wallet;

mod convert;
mod error;

pub use blobs::{BlobStore, RemoveReport, StoredObject};
pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use realtime::{ChangeFilter, ChangeOp, RowChange, Subscription};
