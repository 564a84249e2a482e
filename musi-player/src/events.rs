//! Player event broadcasting
//!
//! Every playback state transition is published here. The HTTP layer
//! streams these as SSE; the gateway binding turns `PresenceChanged` into
//! its platform's "set activity" call.

use crate::voice::GuildId;
use chrono::{DateTime, Utc};
use musi_common::time;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Activity text shown while nothing plays
pub const IDLE_ACTIVITY: &str = "Nothing";

/// Coarse controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Advancing,
    Playing,
    Paused,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Advancing => write!(f, "advancing"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
        }
    }
}

/// Player event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Activity text for the bot's presence
    PresenceChanged {
        guild: GuildId,
        activity: String,
        timestamp: DateTime<Utc>,
    },

    /// Controller moved between states
    StateChanged {
        guild: GuildId,
        state: PlayerState,
        timestamp: DateTime<Utc>,
    },

    /// A track was handed to the sink
    TrackStarted {
        guild: GuildId,
        url: String,
        title: String,
        timestamp: DateTime<Utc>,
    },

    /// A track could not be played and was dropped
    TrackSkipped {
        guild: GuildId,
        url: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed (notification only)
    QueueChanged {
        guild: GuildId,
        len: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session cleared by stop, disconnect, or connection loss
    SessionReset {
        guild: GuildId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Vote-skip poll opened
    VoteStarted {
        guild: GuildId,
        required_votes: usize,
        timestamp: DateTime<Utc>,
    },

    /// Vote-skip poll closed
    VoteResolved {
        guild: GuildId,
        approved: bool,
        votes: usize,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PresenceChanged { .. } => "PresenceChanged",
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::TrackStarted { .. } => "TrackStarted",
            PlayerEvent::TrackSkipped { .. } => "TrackSkipped",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
            PlayerEvent::SessionReset { .. } => "SessionReset",
            PlayerEvent::VoteStarted { .. } => "VoteStarted",
            PlayerEvent::VoteResolved { .. } => "VoteResolved",
        }
    }

    pub fn guild(&self) -> GuildId {
        match self {
            PlayerEvent::PresenceChanged { guild, .. }
            | PlayerEvent::StateChanged { guild, .. }
            | PlayerEvent::TrackStarted { guild, .. }
            | PlayerEvent::TrackSkipped { guild, .. }
            | PlayerEvent::QueueChanged { guild, .. }
            | PlayerEvent::SessionReset { guild, .. }
            | PlayerEvent::VoteStarted { guild, .. }
            | PlayerEvent::VoteResolved { guild, .. } => *guild,
        }
    }
}

/// Broadcast hub shared by all sessions
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Publish the presence activity; `None` shows the idle marker
    pub fn set_presence(&self, guild: GuildId, activity: Option<&str>) {
        self.emit(PlayerEvent::PresenceChanged {
            guild,
            activity: activity.unwrap_or(IDLE_ACTIVITY).to_string(),
            timestamp: time::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
