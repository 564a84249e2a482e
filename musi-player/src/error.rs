//! Error types for musi-player
//!
//! Command-level variants carry a short user-facing message; playback-loop
//! variants are retried and logged inside the controller and only surface
//! when a command triggered the failure directly.

use thiserror::Error;

/// Main error type for musi-player
#[derive(Error, Debug)]
pub enum Error {
    /// Caller is not in any voice channel
    #[error("User is not in a voice channel")]
    UserNotInVoice,

    /// Caller is in a different voice channel than the bot
    #[error("User is in a different voice channel")]
    DifferentVoiceChannel,

    /// Bot has no voice connection in this guild
    #[error("Bot is not in a voice channel")]
    BotNotInVoice,

    /// Requested playlist size exceeds the configured ceiling
    #[error("Playlist too large: requested {requested}, limit {ceiling}")]
    PlaylistTooLarge { requested: usize, ceiling: usize },

    /// Catalog could not resolve or extract a track (transient)
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),

    /// Stream URL rejected by the freshness probe
    #[error("Stale stream URL: {0}")]
    StaleStreamUrl(String),

    /// Sink disconnected underneath the session
    #[error("Voice session lost")]
    SessionLost,

    /// Operation needs a playing track
    #[error("Nothing is playing")]
    NothingPlaying,

    /// `back` without a previous track
    #[error("No previous track")]
    NoPreviousTrack,

    /// 1-based queue position outside the queue
    #[error("Position {position} out of range (queue has {len} entries)")]
    PositionOutOfRange { position: usize, len: usize },

    /// A vote-skip poll is already running
    #[error("A vote is already in progress")]
    PollActive,

    /// No vote-skip poll is running
    #[error("No vote in progress")]
    NoActivePoll,

    /// Freshness probe transport failure
    #[error("Probe error: {0}")]
    Probe(String),

    /// Audio sink failure
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Shared-crate errors (database, config)
    #[error(transparent)]
    Common(#[from] musi_common::Error),

    /// Database errors outside the track store
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using musi-player Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Failures worth another attempt under the retry policy
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ExtractionFailure(_)
                | Error::StaleStreamUrl(_)
                | Error::Probe(_)
                | Error::Sink(_)
                | Error::Io(_)
        )
    }

    /// Short message shown to the user at the command boundary
    pub fn user_message(&self) -> String {
        match self {
            Error::UserNotInVoice => "You are not in a voice channel".to_string(),
            Error::DifferentVoiceChannel => "You are in a different voice channel".to_string(),
            Error::BotNotInVoice => "I am not in a voice channel".to_string(),
            Error::PlaylistTooLarge { ceiling, .. } => {
                format!("Playlists are limited to {} songs", ceiling)
            }
            Error::ExtractionFailure(_) | Error::StaleStreamUrl(_) => {
                "Could not load that track".to_string()
            }
            Error::SessionLost => "The voice connection was lost".to_string(),
            Error::NothingPlaying => "Nothing is playing".to_string(),
            Error::NoPreviousTrack => "There is no previous track".to_string(),
            Error::PositionOutOfRange { len, .. } => {
                format!("Pick a position between 1 and {}", len)
            }
            Error::PollActive => "A vote is already in progress".to_string(),
            Error::NoActivePoll => "There is no vote in progress".to_string(),
            Error::BadRequest(msg) => msg.clone(),
            Error::Probe(_)
            | Error::Sink(_)
            | Error::Common(_)
            | Error::Database(_)
            | Error::Io(_) => "Something went wrong, please try again".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::ExtractionFailure("x".into()).is_transient());
        assert!(Error::Sink("x".into()).is_transient());
        assert!(!Error::BotNotInVoice.is_transient());
        assert!(!Error::NoPreviousTrack.is_transient());
    }

    #[test]
    fn test_internal_details_not_leaked_to_users() {
        let err = Error::Sink("ffmpeg exited with status 1".into());
        assert!(!err.user_message().contains("ffmpeg"));
    }

    #[test]
    fn test_position_message_uses_queue_length() {
        let err = Error::PositionOutOfRange { position: 9, len: 4 };
        assert_eq!(err.user_message(), "Pick a position between 1 and 4");
    }
}
