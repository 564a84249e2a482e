//! Command surface
//!
//! Every user command goes through [`CommandHandler::execute`], which runs
//! the voice-channel checks, drives the guild's session, and turns any
//! failure into a short user-facing reply. Nothing here panics or
//! propagates an error past the boundary.

use crate::controller::PlaybackController;
use crate::error::{Error, Result};
use crate::events::{EventBus, PlayerEvent, PlayerState};
use crate::ingest::{IngestProgress, PlaylistIngestion};
use crate::registry::{GuildSession, SessionRegistry};
use crate::voice::{ChannelId, GuildId, UserId, VoiceRoster, VoiceStateUpdate};
use crate::vote::{PollResolution, PollStart};
use futures::stream::{BoxStream, StreamExt};
use musi_common::db::Track;
use musi_common::time::{self, format_clock, format_progress};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn first_page() -> usize {
    1
}

/// Commands accepted from the gateway binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Play { query: String },
    PlayNext { query: String },
    Playlist { url: String, max_songs: usize },
    Skip,
    Stop,
    Pause,
    Resume,
    Back,
    VoteSkip,
    Queue {
        #[serde(default = "first_page")]
        page: usize,
    },
    Shuffle,
    Next { position: usize },
    Clear,
    Now,
    Disconnect,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "play",
            Command::PlayNext { .. } => "play_next",
            Command::Playlist { .. } => "playlist",
            Command::Skip => "skip",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Back => "back",
            Command::VoteSkip => "vote_skip",
            Command::Queue { .. } => "queue",
            Command::Shuffle => "shuffle",
            Command::Next { .. } => "next",
            Command::Clear => "clear",
            Command::Now => "now",
            Command::Disconnect => "disconnect",
        }
    }
}

/// Who issued a command, and where
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub guild: GuildId,
    pub user: UserId,
}

/// Text sent back to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub ok: bool,
    pub message: String,
}

impl CommandReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn error(err: &Error) -> Self {
        Self {
            ok: false,
            message: err.user_message(),
        }
    }
}

pub struct CommandHandler {
    registry: Arc<SessionRegistry>,
    roster: Arc<VoiceRoster>,
    ingestion: Arc<PlaylistIngestion>,
    events: EventBus,
    bot_user: UserId,
    page_size: usize,
}

impl CommandHandler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        roster: Arc<VoiceRoster>,
        ingestion: Arc<PlaylistIngestion>,
        bot_user: UserId,
        page_size: usize,
    ) -> Self {
        let events = registry.services().events.clone();
        Self {
            registry,
            roster,
            ingestion,
            events,
            bot_user,
            page_size: page_size.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn roster(&self) -> &Arc<VoiceRoster> {
        &self.roster
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn execute(&self, ctx: CommandContext, command: Command) -> CommandReply {
        let name = command.name();
        debug!(guild = %ctx.guild, user = %ctx.user, command = name, "Command received");

        match self.dispatch(ctx, command).await {
            Ok(message) => CommandReply::ok(message),
            Err(e) => {
                if e.is_transient() || matches!(e, Error::Common(_) | Error::Database(_)) {
                    warn!(guild = %ctx.guild, command = name, error = %e, "Command failed");
                } else {
                    debug!(guild = %ctx.guild, command = name, error = %e, "Command rejected");
                }
                CommandReply::error(&e)
            }
        }
    }

    async fn dispatch(&self, ctx: CommandContext, command: Command) -> Result<String> {
        match command {
            Command::Play { query } => self.play(ctx, &query, false).await,
            Command::PlayNext { query } => self.play(ctx, &query, true).await,
            Command::Playlist { url, max_songs } => self.playlist(ctx, &url, max_songs).await,
            Command::Skip => {
                let session = self.require_shared(ctx).await?;
                session.controller.skip().await?;
                Ok("Skipped".to_string())
            }
            Command::Stop => {
                let session = self.require_shared(ctx).await?;
                session.votes.close().await;
                session.controller.stop("stop command").await;
                Ok("Stopped and cleared the queue".to_string())
            }
            Command::Pause => {
                let session = self.require_shared(ctx).await?;
                session.controller.pause().await?;
                Ok("Paused".to_string())
            }
            Command::Resume => {
                let session = self.require_shared(ctx).await?;
                session.controller.resume().await?;
                Ok("Resumed".to_string())
            }
            Command::Back => {
                let session = self.require_shared(ctx).await?;
                session.controller.back().await?;
                Ok("Playing the previous track".to_string())
            }
            Command::VoteSkip => self.vote_skip(ctx).await,
            Command::Queue { page } => {
                let session = self.require_shared(ctx).await?;
                self.queue_page(&session, page).await
            }
            Command::Shuffle => {
                let session = self.require_shared(ctx).await?;
                session.controller.shuffle().await;
                Ok("Shuffled the queue".to_string())
            }
            Command::Next { position } => {
                let session = self.require_shared(ctx).await?;
                let controller = &session.controller;
                controller.move_to_next(position).await?;
                let title = controller
                    .queue()
                    .read()
                    .await
                    .get(0)
                    .map(|t| t.title.clone())
                    .unwrap_or_default();
                Ok(format!("{} will play next", title))
            }
            Command::Clear => {
                let session = self.require_shared(ctx).await?;
                session.controller.clear_queue().await;
                Ok("Cleared the queue".to_string())
            }
            Command::Now => {
                let session = self.require_shared(ctx).await?;
                now_playing(&session).await
            }
            Command::Disconnect => {
                self.require_shared(ctx).await?;
                self.teardown(ctx.guild, "disconnect command").await;
                Ok("Disconnected".to_string())
            }
        }
    }

    // ========================================
    // Voice checks
    // ========================================

    /// Session for a command that may (re)join voice
    ///
    /// Joins the caller's channel when the bot is not connected, and moves
    /// there when the bot sits alone in another channel.
    async fn join_caller(&self, ctx: CommandContext) -> Result<Arc<GuildSession>> {
        let caller = self
            .roster
            .channel_of(ctx.guild, ctx.user)
            .await
            .ok_or(Error::UserNotInVoice)?;

        let session = self.registry.get_or_create(ctx.guild).await;
        let sink = session.controller.sink();

        match sink.channel() {
            Some(current) if current == caller => {}
            Some(current) => {
                if self.roster.non_bot_members(ctx.guild, current).await > 0 {
                    return Err(Error::DifferentVoiceChannel);
                }
                info!(guild = %ctx.guild, from = %current, to = %caller, "Moving to caller's channel");
                sink.connect(caller).await?;
            }
            None => {
                sink.connect(caller).await?;
            }
        }
        Ok(session)
    }

    /// Session for a command that needs the caller next to a connected bot
    async fn require_shared(&self, ctx: CommandContext) -> Result<Arc<GuildSession>> {
        let session = self.registry.get(ctx.guild).await.ok_or(Error::BotNotInVoice)?;
        let bot_channel = session.controller.sink().channel().ok_or(Error::BotNotInVoice)?;
        let caller = self
            .roster
            .channel_of(ctx.guild, ctx.user)
            .await
            .ok_or(Error::UserNotInVoice)?;

        if caller != bot_channel {
            return Err(Error::DifferentVoiceChannel);
        }
        Ok(session)
    }

    // ========================================
    // Commands with more than one step
    // ========================================

    async fn play(&self, ctx: CommandContext, query: &str, next: bool) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::BadRequest("Tell me what to play".to_string()));
        }

        let session = self.join_caller(ctx).await?;
        let controller = &session.controller;

        let catalog = &self.registry.services().catalog;
        let track = self
            .registry
            .services()
            .retry
            .run("resolve_query", |_| catalog.resolve(query))
            .await?;

        let was_idle = controller.state().await == PlayerState::Idle;
        let title = track.title.clone();
        if next {
            controller.enqueue_front(track).await;
        } else {
            controller.enqueue(track).await;
        }
        controller.request_start();

        if was_idle {
            Ok(format!("Playing {}", title))
        } else if next {
            Ok(format!("{} will play next", title))
        } else {
            let position = controller.queue().read().await.len();
            Ok(format!("Queued {} at position {}", title, position))
        }
    }

    async fn playlist(&self, ctx: CommandContext, url: &str, max_songs: usize) -> Result<String> {
        let ceiling = self.ingestion.ceiling();
        if max_songs > ceiling {
            return Err(Error::PlaylistTooLarge {
                requested: max_songs,
                ceiling,
            });
        }

        let session = self.join_caller(ctx).await?;
        let controller = Arc::clone(&session.controller);
        let epoch = controller.epoch();

        let mut stream = self.ingestion.ingest(url, max_songs);
        let first = match stream.next().await {
            Some(item) => item?,
            None => return Err(Error::ExtractionFailure(format!("Playlist {} is empty", url))),
        };

        let expected_total = first.expected_total;
        let Some(track) = first.track else {
            return Err(Error::ExtractionFailure(format!("Playlist {} is empty", url)));
        };
        if controller.epoch() != epoch {
            return Err(Error::SessionLost);
        }

        let title = track.title.clone();
        if controller.state().await == PlayerState::Idle {
            // First entry plays right away
            controller.enqueue_front(track).await;
            controller.request_start();
        } else {
            controller.enqueue(track).await;
        }

        tokio::spawn(continue_ingestion(controller, stream, epoch));

        Ok(format!(
            "Queued playlist starting with {} ({} tracks loading)",
            title, expected_total
        ))
    }

    async fn vote_skip(&self, ctx: CommandContext) -> Result<String> {
        let session = self.require_shared(ctx).await?;
        let controller = &session.controller;
        if controller.state().await == PlayerState::Idle {
            return Err(Error::NothingPlaying);
        }

        let bot_channel = controller.sink().channel().ok_or(Error::BotNotInVoice)?;
        let members = self.roster.non_bot_members(ctx.guild, bot_channel).await;

        let on_resolve = vote_resolver(ctx.guild, controller, self.events.clone());
        match session.votes.start_poll(members, on_resolve).await {
            Ok(PollStart::SkipImmediately) => {
                controller.skip().await?;
                Ok("Skipped".to_string())
            }
            Ok(PollStart::Started { required_votes }) => {
                self.events.emit(PlayerEvent::VoteStarted {
                    guild: ctx.guild,
                    required_votes,
                    timestamp: time::now(),
                });
                // The initiator votes yes
                self.count_vote(&session, ctx.user, true).await
            }
            Err(Error::PollActive) => self.count_vote(&session, ctx.user, false).await,
            Err(e) => Err(e),
        }
    }

    async fn count_vote(&self, session: &GuildSession, user: UserId, started: bool) -> Result<String> {
        let tally = session.votes.cast_vote(user).await?;
        if tally.threshold_met {
            session.votes.close().await;
            return Ok("Vote passed, skipping".to_string());
        }

        let verb = if started { "Vote to skip started" } else { "Vote counted" };
        Ok(format!("{}: {}/{}", verb, tally.votes, tally.required_votes))
    }

    async fn queue_page(&self, session: &GuildSession, page: usize) -> Result<String> {
        let queue = session.controller.queue();
        let queue = queue.read().await;
        if queue.is_empty() {
            return Ok("The queue is empty".to_string());
        }

        let page = queue.page(page, self.page_size);
        let mut out = format!(
            "{} tracks, total {}\n",
            page.total_tracks,
            format_clock(page.total_duration_secs)
        );
        for (position, track) in &page.entries {
            let _ = writeln!(out, "{}", queue_line(*position, track));
        }
        let _ = write!(out, "Page {} of {}", page.page, page.total_pages);
        Ok(out)
    }

    // ========================================
    // Voice-state updates
    // ========================================

    /// Apply a voice-state change and react to it
    ///
    /// The bot leaving voice resets the session. A human leaving the bot
    /// alone in its channel makes the bot disconnect.
    pub async fn voice_state_update(&self, guild: GuildId, update: VoiceStateUpdate) {
        self.roster
            .update(guild, update.user_id, update.channel_id, update.is_bot)
            .await;

        let Some(session) = self.registry.get(guild).await else {
            return;
        };
        let sink = Arc::clone(session.controller.sink());

        if update.user_id == self.bot_user {
            match update.channel_id {
                None => {
                    warn!(guild = %guild, "Bot was removed from voice");
                    self.teardown(guild, &Error::SessionLost.to_string()).await;
                }
                Some(channel) if sink.channel() != Some(channel) => {
                    info!(guild = %guild, channel = %channel, "Bot was moved");
                    if let Err(e) = sink.connect(channel).await {
                        warn!(guild = %guild, error = %e, "Failed to follow move");
                    }
                }
                Some(_) => {}
            }
            return;
        }

        if let Some(bot_channel) = sink.channel() {
            if self.is_alone(guild, bot_channel).await {
                info!(guild = %guild, channel = %bot_channel, "Left alone in voice, disconnecting");
                self.teardown(guild, "left alone in voice").await;
            }
        }
    }

    async fn is_alone(&self, guild: GuildId, channel: ChannelId) -> bool {
        self.roster.non_bot_members(guild, channel).await == 0
    }

    async fn teardown(&self, guild: GuildId, reason: &str) {
        if let Some(session) = self.registry.remove(guild).await {
            session.votes.close().await;
            session.controller.disconnect(reason).await;
        }
    }
}

fn queue_line(position: usize, track: &Track) -> String {
    let length = if track.duration_secs == 0 {
        "live".to_string()
    } else {
        format_clock(track.duration_secs)
    };
    format!("{}. {} - {} [{}]", position, track.title, track.artist, length)
}

/// Poll callback: announce the result and skip when approved
fn vote_resolver(
    guild: GuildId,
    controller: &Arc<PlaybackController>,
    events: EventBus,
) -> impl FnOnce(PollResolution) + Send + 'static {
    let controller = Arc::downgrade(controller);
    move |resolution| {
        events.emit(PlayerEvent::VoteResolved {
            guild,
            approved: resolution.approved,
            votes: resolution.votes,
            timestamp: time::now(),
        });
        if resolution.approved {
            if let Some(controller) = controller.upgrade() {
                controller.request_skip();
            }
        }
    }
}

async fn now_playing(session: &GuildSession) -> Result<String> {
    let now = session.controller.now().await;
    let track = now.track.ok_or(Error::NothingPlaying)?;

    let paused = if now.state == PlayerState::Paused { " (paused)" } else { "" };
    Ok(format!(
        "{}{} [{}]\n{}",
        track.title,
        paused,
        format_progress(now.elapsed_secs, track.duration_secs),
        track.url
    ))
}

/// Append the remaining playlist entries until done or the session resets
async fn continue_ingestion(
    controller: Arc<PlaybackController>,
    mut stream: BoxStream<'static, Result<IngestProgress>>,
    epoch: u64,
) {
    let guild = controller.guild();
    while let Some(item) = stream.next().await {
        if controller.epoch() != epoch || !controller.sink().is_connected() {
            info!(guild = %guild, "Session reset, playlist ingestion stopped");
            return;
        }

        match item {
            Ok(IngestProgress {
                track: Some(track), ..
            }) => controller.enqueue(track).await,
            Ok(progress) => {
                info!(
                    guild = %guild,
                    queued = progress.accumulated.len(),
                    expected = progress.expected_total,
                    "Playlist fully queued"
                );
            }
            Err(e) => {
                warn!(guild = %guild, error = %e, "Playlist ingestion ended early");
                return;
            }
        }
    }
}
