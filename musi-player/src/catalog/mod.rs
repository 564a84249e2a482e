//! Catalog contract
//!
//! The catalog turns user queries and playlist URLs into [`Track`]s and
//! refreshes expired stream URLs. Lookups by canonical URL are idempotent;
//! name lookups are a normalized substring match where the first hit wins.

pub mod links;
pub mod ytdlp;

use crate::error::Result;
use async_trait::async_trait;
use musi_common::db::Track;
use serde::{Deserialize, Serialize};

pub use ytdlp::YtDlpCatalog;

/// Cheap playlist listing entry, resolved to a full track later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStub {
    /// Canonical source URL of the entry
    pub url: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Free-text search
    async fn resolve_by_name(&self, query: &str) -> Result<Track>;

    /// Resolve a single track URL
    async fn resolve_by_url(&self, url: &str) -> Result<Track>;

    /// Re-extract a track to obtain a fresh stream URL
    async fn reload(&self, track: &Track) -> Result<Track>;

    /// List up to `max` playlist entries without resolving them
    async fn list_playlist_entries(&self, url: &str, max: usize) -> Result<Vec<EntryStub>>;

    /// Resolve one listed entry
    async fn resolve_entry(&self, stub: &EntryStub) -> Result<Track>;

    /// URL queries resolve by URL, anything else by name
    async fn resolve(&self, query: &str) -> Result<Track> {
        let query = query.trim();
        if links::is_url(query) {
            self.resolve_by_url(query).await
        } else {
            self.resolve_by_name(query).await
        }
    }
}
