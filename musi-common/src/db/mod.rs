//! Database access layer
//!
//! Schema setup, models, and the track store.

pub mod init;
pub mod models;
pub mod tracks;

pub use init::{create_schema, init_database, open_in_memory};
pub use models::{Artist, Platform, Track};
pub use tracks::TrackStore;
