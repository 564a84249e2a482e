//! # musi common library
//!
//! Shared code for the musi playback service:
//! - Database models and the track store
//! - Configuration loading
//! - Error types
//! - Time formatting helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
