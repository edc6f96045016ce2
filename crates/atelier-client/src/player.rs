//! Persistent audio player state.
//!
//! The player survives navigation between views.  It only tracks *what* is
//! playing; decoding and output belong to whatever front end renders it.  Every
//! change is published on a `watch` channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use atelier_shared::constants::PLAYER_RESTART_THRESHOLD_SECS;
use atelier_shared::types::FileKind;
use atelier_shared::ValidationError;

use crate::commands::files::FileItem;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub queue: Vec<FileItem>,
    pub current: Option<usize>,
    pub status: PlayerStatus,
    pub position_secs: f64,
    /// Between 0.0 and 1.0.
    pub volume: f32,
}

impl PlayerState {
    pub fn current_item(&self) -> Option<&FileItem> {
        self.current.and_then(|i| self.queue.get(i))
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            current: None,
            status: PlayerStatus::Stopped,
            position_secs: 0.0,
            volume: 1.0,
        }
    }
}

#[derive(Clone)]
pub struct AudioPlayer {
    tx: Arc<watch::Sender<PlayerState>>,
}

impl AudioPlayer {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PlayerState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> PlayerState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.tx.subscribe()
    }

    /// Start playing `item`, adding it to the queue if needed.
    pub fn play(&self, item: FileItem) -> Result<()> {
        require_audio(&item)?;
        debug!(file_id = %item.id, "Play");
        self.tx.send_modify(|s| {
            let index = match s.queue.iter().position(|q| q.id == item.id) {
                Some(i) => i,
                None => {
                    s.queue.push(item);
                    s.queue.len() - 1
                }
            };
            s.current = Some(index);
            s.status = PlayerStatus::Playing;
            s.position_secs = 0.0;
        });
        Ok(())
    }

    /// Append to the queue without interrupting playback.
    pub fn enqueue(&self, item: FileItem) -> Result<()> {
        require_audio(&item)?;
        self.tx.send_modify(|s| {
            s.queue.push(item);
            if s.current.is_none() {
                s.current = Some(s.queue.len() - 1);
            }
        });
        Ok(())
    }

    pub fn pause(&self) {
        self.tx.send_if_modified(|s| {
            if s.status != PlayerStatus::Playing {
                return false;
            }
            s.status = PlayerStatus::Paused;
            true
        });
    }

    pub fn resume(&self) {
        self.tx.send_if_modified(|s| {
            if s.status != PlayerStatus::Paused || s.current.is_none() {
                return false;
            }
            s.status = PlayerStatus::Playing;
            true
        });
    }

    pub fn stop(&self) {
        self.tx.send_modify(|s| {
            s.status = PlayerStatus::Stopped;
            s.position_secs = 0.0;
        });
    }

    /// Skip to the next item.  Stops at the end of the queue.
    pub fn next(&self) {
        self.tx.send_modify(|s| {
            let Some(current) = s.current else { return };
            s.position_secs = 0.0;
            if current + 1 < s.queue.len() {
                s.current = Some(current + 1);
                s.status = PlayerStatus::Playing;
            } else {
                s.status = PlayerStatus::Stopped;
            }
        });
    }

    /// Rewind the current item if it has played for more than a few seconds,
    /// otherwise go back one item.
    pub fn previous(&self) {
        self.tx.send_modify(|s| {
            let Some(current) = s.current else { return };
            if s.position_secs <= PLAYER_RESTART_THRESHOLD_SECS && current > 0 {
                s.current = Some(current - 1);
            }
            s.position_secs = 0.0;
        });
    }

    pub fn seek(&self, position_secs: f64) {
        if !position_secs.is_finite() {
            return;
        }
        self.tx.send_if_modified(|s| {
            if s.current.is_none() {
                return false;
            }
            s.position_secs = position_secs.max(0.0);
            true
        });
    }

    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        self.tx.send_modify(|s| s.volume = volume.clamp(0.0, 1.0));
    }
}

impl Default for AudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

fn require_audio(item: &FileItem) -> std::result::Result<(), ValidationError> {
    if item.kind != FileKind::Audio {
        return Err(ValidationError::UnknownVariant {
            kind: "audio file",
            value: item.name.clone(),
        });
    }
    Ok(())
}
