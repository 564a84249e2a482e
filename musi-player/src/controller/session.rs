//! Per-guild playback session state
//!
//! Mutated only by the controller, under a mutex that is never held across
//! network I/O. A copy is published after every transition so status reads
//! never wait on the session lock.

use crate::events::PlayerState;
use musi_common::db::Track;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub(crate) struct Session {
    pub current: Option<Track>,
    pub previous: Option<Track>,
    /// Token of the sink source playing `current`; completions carrying any
    /// other token are stale
    pub active_play: Option<u64>,
    pub started_at: Option<Instant>,
    pub paused_at: Option<Instant>,
}

impl Session {
    pub fn is_playing(&self) -> bool {
        self.active_play.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Drop the playing flags, keeping current and previous
    pub fn clear_playback(&mut self) {
        self.active_play = None;
        self.started_at = None;
        self.paused_at = None;
    }

    /// Time into the current track, excluding paused time
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.paused_at) {
            (Some(started), Some(paused)) => paused.saturating_duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn state(&self) -> PlayerState {
        match (self.is_playing(), self.is_paused()) {
            (true, true) => PlayerState::Paused,
            (true, false) => PlayerState::Playing,
            _ => PlayerState::Idle,
        }
    }
}

/// Published copy of the session
#[derive(Debug, Clone)]
pub(crate) struct Status {
    pub state: PlayerState,
    pub session: Session,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: PlayerState::Idle,
            session: Session::default(),
        }
    }
}

/// Answer to the `now` command
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub state: PlayerState,
    pub track: Option<Track>,
    pub elapsed_secs: u64,
    pub queue_len: usize,
}
