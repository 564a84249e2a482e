//! Audio sink abstraction
//!
//! The sink is the external side of playback: it holds the voice
//! connection and turns a stream URL into audio. Transcoding is delegated
//! to an external media pipe (see [`ffmpeg`]).
//!
//! Completion is reported through the [`FinishSignal`] handed to
//! [`AudioSink::play`]; the sink must fire it exactly once when the source
//! ends, whether naturally, by error, or because [`AudioSink::stop`] was
//! called.

pub mod ffmpeg;

use crate::controller::FinishSignal;
use crate::error::Result;
use crate::voice::{ChannelId, GuildId};
use async_trait::async_trait;
use std::sync::Arc;

pub use ffmpeg::{FfmpegSink, FfmpegSinkFactory};

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Whether the voice connection is up
    fn is_connected(&self) -> bool;

    /// Channel the sink is connected to
    fn channel(&self) -> Option<ChannelId>;

    /// Join (or move to) a voice channel
    async fn connect(&self, channel: ChannelId) -> Result<()>;

    /// Drop any source and leave voice
    async fn disconnect(&self);

    /// Start playing `stream_url`, replacing any current source
    async fn play(&self, stream_url: &str, on_finish: FinishSignal) -> Result<()>;

    /// Stop the current source; its finish signal fires
    async fn stop(&self);

    /// Mute or unmute without stopping the source
    async fn set_muted(&self, muted: bool) -> Result<()>;

    /// Free playback resources while staying connected
    async fn release(&self) {
        self.stop().await;
    }
}

/// Builds one sink per guild session
pub trait SinkFactory: Send + Sync {
    fn create(&self, guild: GuildId) -> Arc<dyn AudioSink>;
}
