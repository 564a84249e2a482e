//! Playlist ingestion pipeline
//!
//! Lists playlist membership first (one cheap call), then resolves entries
//! one at a time as the consumer pulls. The stream is lazy, finite and not
//! restartable: dropping it stops all further catalog traffic, which is how
//! a session reset cancels an ingestion in flight.
//!
//! Yields one [`IngestProgress`] per resolved entry, then a final item with
//! no track carrying the complete accumulated list.

use crate::catalog::{Catalog, EntryStub};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use async_stream::try_stream;
use futures::stream::BoxStream;
use musi_common::db::{Track, TrackStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IngestProgress {
    /// Entry resolved by this step; `None` on the final item
    pub track: Option<Track>,
    /// Every track resolved so far, in listed order
    pub accumulated: Vec<Track>,
    /// Entries listed (after the cap)
    pub expected_total: usize,
}

impl IngestProgress {
    pub fn is_final(&self) -> bool {
        self.track.is_none()
    }
}

pub struct PlaylistIngestion {
    catalog: Arc<dyn Catalog>,
    store: TrackStore,
    retry: RetryPolicy,
    ceiling: usize,
}

impl PlaylistIngestion {
    pub fn new(catalog: Arc<dyn Catalog>, store: TrackStore, retry: RetryPolicy, ceiling: usize) -> Self {
        Self {
            catalog,
            store,
            retry,
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Requested size clamped into `1..=ceiling`
    pub fn effective_max(&self, max_songs: usize) -> usize {
        max_songs.clamp(1, self.ceiling)
    }

    pub fn ingest(&self, url: &str, max_songs: usize) -> BoxStream<'static, Result<IngestProgress>> {
        let catalog = Arc::clone(&self.catalog);
        let store = self.store.clone();
        let retry = self.retry;
        let max = self.effective_max(max_songs);
        let url = url.trim().to_string();

        Box::pin(try_stream! {
            let listed = retry
                .run("list_playlist", |_| catalog.list_playlist_entries(&url, max))
                .await?;
            let stubs: Vec<EntryStub> = listed.into_iter().take(max).collect();

            if stubs.is_empty() {
                Err::<(), Error>(Error::ExtractionFailure(format!("Playlist {} has no entries", url)))?;
            }

            let expected_total = stubs.len();
            info!(url = %url, expected_total, "Ingesting playlist");

            let mut accumulated: Vec<Track> = Vec::with_capacity(expected_total);
            for (index, stub) in stubs.iter().enumerate() {
                match resolve_entry(catalog.as_ref(), &store, &retry, stub).await {
                    Ok(track) => {
                        accumulated.push(track.clone());
                        yield IngestProgress {
                            track: Some(track),
                            accumulated: accumulated.clone(),
                            expected_total,
                        };
                    }
                    Err(e) => {
                        warn!(url = %stub.url, position = index + 1, error = %e, "Skipping playlist entry");
                    }
                }
            }

            if accumulated.is_empty() {
                Err::<(), Error>(Error::ExtractionFailure(format!(
                    "No entry of playlist {} could be resolved",
                    url
                )))?;
            }

            info!(url = %url, resolved = accumulated.len(), expected_total, "Playlist ingested");
            yield IngestProgress {
                track: None,
                accumulated,
                expected_total,
            };
        })
    }
}

/// Stored track for the entry's canonical URL, else a catalog resolve
async fn resolve_entry(
    catalog: &dyn Catalog,
    store: &TrackStore,
    retry: &RetryPolicy,
    stub: &EntryStub,
) -> Result<Track> {
    if let Some(track) = store.get_by_url(&stub.url).await? {
        debug!(url = %stub.url, "Reusing stored track");
        return Ok(track);
    }
    retry.run("resolve_entry", |_| catalog.resolve_entry(stub)).await
}
