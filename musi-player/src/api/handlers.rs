//! HTTP request handlers

use super::AppContext;
use crate::commands::{Command, CommandContext, CommandReply};
use crate::controller::NowPlaying;
use crate::events::PlayerState;
use crate::queue::QueuePage;
use crate::voice::{GuildId, UserId, VoiceStateUpdate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

/// Command body: the issuing user plus the tagged command
///
/// `{"user_id": 7, "command": "play", "query": "song name"}`
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Deserialize)]
pub struct QueueParams {
    page: Option<usize>,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "musi-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Commands and voice state
// ============================================================================

/// POST /api/v1/guilds/:guild_id/commands
///
/// Command failures are user-facing replies (`ok: false`), not HTTP errors.
pub async fn run_command(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
    Json(req): Json<CommandRequest>,
) -> Json<CommandReply> {
    let command_ctx = CommandContext {
        guild: GuildId(guild_id),
        user: req.user_id,
    };
    Json(ctx.commands.execute(command_ctx, req.command).await)
}

/// POST /api/v1/guilds/:guild_id/voice-state
pub async fn voice_state(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
    Json(update): Json<VoiceStateUpdate>,
) -> StatusCode {
    debug!(guild = guild_id, user = %update.user_id, "Voice state update");
    ctx.commands.voice_state_update(GuildId(guild_id), update).await;
    StatusCode::NO_CONTENT
}

// ============================================================================
// Status
// ============================================================================

/// GET /api/v1/guilds/:guild_id/now
pub async fn now_playing(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
) -> Json<NowPlaying> {
    let now = match ctx.commands.registry().get(GuildId(guild_id)).await {
        Some(session) => session.controller.now().await,
        None => NowPlaying {
            state: PlayerState::Idle,
            track: None,
            elapsed_secs: 0,
            queue_len: 0,
        },
    };
    Json(now)
}

/// GET /api/v1/guilds/:guild_id/queue?page=N
pub async fn get_queue(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
    Query(params): Query<QueueParams>,
) -> Result<Json<QueuePage>, (StatusCode, Json<StatusResponse>)> {
    let session = ctx
        .commands
        .registry()
        .get(GuildId(guild_id))
        .await
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(StatusResponse {
                    status: format!("error: no session for guild {}", guild_id),
                }),
            )
        })?;

    let queue = session.controller.queue();
    let page = queue
        .read()
        .await
        .page(params.page.unwrap_or(1), ctx.commands.page_size());
    Ok(Json(page))
}
