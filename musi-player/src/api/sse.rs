//! Server-Sent Events (SSE) broadcaster
//!
//! Streams player events to connected clients. `?guild=<id>` limits the
//! feed to one guild.

use super::AppContext;
use crate::voice::GuildId;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct EventParams {
    guild: Option<u64>,
}

/// GET /api/v1/events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(params): Query<EventParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(guild = ?params.guild, "New SSE client connected");

    let only = params.guild.map(GuildId);
    let stream = BroadcastStream::new(ctx.events.subscribe()).filter_map(move |result| async move {
        match result {
            Ok(event) => {
                if only.is_some_and(|guild| guild != event.guild()) {
                    return None;
                }
                match serde_json::to_string(&event) {
                    Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
                    Err(e) => {
                        warn!("Failed to serialize event: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                // Lagged receivers skip ahead
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
