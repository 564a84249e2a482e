//! # musi playback orchestrator (musi-player)
//!
//! Per-guild playback sessions for a voice-chat music bot.
//!
//! **Purpose:** Keep an ordered queue of tracks, advance playback through a
//! serialized state machine, repair expired stream URLs before use, and
//! stream large playlists so the first track plays while the rest resolve.
//!
//! **Architecture:** command surface → session registry → playback
//! controller (one per guild) → catalog / freshness probe / audio sink.
//! Sink completions come back over a channel to the controller's advance
//! loop.

pub mod api;
pub mod catalog;
pub mod commands;
pub mod controller;
pub mod error;
pub mod events;
pub mod ingest;
pub mod probe;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod sink;
pub mod voice;
pub mod vote;

pub use error::{Error, Result};
pub use musi_common::db::Track;
