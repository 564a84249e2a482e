//! HTTP control surface
//!
//! The gateway binding forwards user commands and voice-state updates
//! here and subscribes to the SSE event feed for presence updates.

pub mod handlers;
pub mod sse;

use crate::commands::CommandHandler;
use crate::events::EventBus;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub commands: Arc<CommandHandler>,
    pub events: EventBus,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                .route("/guilds/:guild_id/commands", post(handlers::run_command))
                .route("/guilds/:guild_id/voice-state", post(handlers::voice_state))
                .route("/guilds/:guild_id/now", get(handlers::now_playing))
                .route("/guilds/:guild_id/queue", get(handlers::get_queue))
                .route("/events", get(sse::event_stream)),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
