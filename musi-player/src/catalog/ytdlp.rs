//! yt-dlp catalog backend
//!
//! Shells out to yt-dlp for metadata and stream URLs, and keeps the track
//! store in front of it: known canonical URLs and name matches are served
//! from the database, fresh extractions are persisted.

use super::links::{canonical_url, detect_platform};
use super::{Catalog, EntryStub};
use crate::error::{Error, Result};
use async_trait::async_trait;
use musi_common::db::{Track, TrackStore};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const UNKNOWN_TITLE: &str = "Unknown title";
const UNKNOWN_ARTIST: &str = "Unknown artist";

/// Subset of the yt-dlp `-J` info dict we use
#[derive(Debug, Default, Deserialize)]
struct InfoDict {
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    /// Direct media URL of the selected format; the source URL for flat entries
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<InfoDict>>,
}

impl InfoDict {
    fn into_track(self, requested_url: &str) -> Result<Track> {
        let stream_url = self
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::ExtractionFailure(format!("No stream for {}", requested_url)))?;

        let url = canonical_url(self.webpage_url.as_deref().unwrap_or(requested_url));
        let platform = detect_platform(&url);

        Ok(Track {
            title: self.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist: self
                .artist
                .or(self.uploader)
                .or(self.channel)
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            duration_secs: self
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(|d| d.round() as u64)
                .unwrap_or(0),
            stream_url,
            platform,
            url,
        })
    }

    fn into_stubs(self, max: usize) -> Vec<EntryStub> {
        self.entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let url = entry.webpage_url.or(entry.url)?;
                Some(EntryStub {
                    url: canonical_url(&url),
                    title: entry.title,
                })
            })
            .take(max)
            .collect()
    }
}

pub struct YtDlpCatalog {
    ytdlp: PathBuf,
    timeout: Duration,
    store: TrackStore,
}

impl YtDlpCatalog {
    pub fn new(ytdlp: PathBuf, timeout: Duration, store: TrackStore) -> Self {
        Self {
            ytdlp,
            timeout,
            store,
        }
    }

    /// Run yt-dlp with `-J` and parse its single JSON document
    async fn dump_json(&self, args: &[&str]) -> Result<InfoDict> {
        debug!(args = ?args, "Running yt-dlp");

        let child = Command::new(&self.ytdlp)
            .arg("-J")
            .arg("--no-warnings")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExtractionFailure(format!("Failed to spawn {}: {}", self.ytdlp.display(), e))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ExtractionFailure("yt-dlp timed out".to_string()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("no output").trim().to_string();
            return Err(Error::ExtractionFailure(reason));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::ExtractionFailure(format!("Unreadable yt-dlp output: {}", e)))
    }

    async fn extract(&self, url: &str) -> Result<Track> {
        let info = self
            .dump_json(&["-f", "bestaudio/best", "--no-playlist", url])
            .await?;
        info.into_track(url)
    }
}

#[async_trait]
impl Catalog for YtDlpCatalog {
    async fn resolve_by_name(&self, query: &str) -> Result<Track> {
        if let Some(track) = self.store.find_by_name(query).await? {
            debug!(query, url = %track.url, "Name matched stored track");
            return Ok(track);
        }

        let search = format!("ytsearch1:{}", query);
        let info = self
            .dump_json(&["-f", "bestaudio/best", "--no-playlist", &search])
            .await?;
        let first = info
            .entries
            .and_then(|entries| entries.into_iter().next())
            .ok_or_else(|| Error::ExtractionFailure(format!("No results for '{}'", query)))?;

        let track = first.into_track(&search)?;
        info!(query, url = %track.url, "Resolved search query");
        self.store.upsert(&track).await.map_err(Error::from)
    }

    async fn resolve_by_url(&self, url: &str) -> Result<Track> {
        let canonical = canonical_url(url);
        if let Some(track) = self.store.get_by_url(&canonical).await? {
            debug!(url = %canonical, "Serving stored track");
            return Ok(track);
        }

        let track = self.extract(&canonical).await?;
        self.store.upsert(&track).await.map_err(Error::from)
    }

    async fn reload(&self, track: &Track) -> Result<Track> {
        let fresh = self.extract(&track.url).await?;
        if !self.store.update_stream_url(&track.url, &fresh.stream_url).await? {
            warn!(url = %track.url, "Reloaded track was not stored; inserting");
            self.store.upsert(&fresh).await?;
        }
        info!(url = %track.url, "Stream URL reloaded");
        Ok(track.with_stream_url(fresh.stream_url))
    }

    async fn list_playlist_entries(&self, url: &str, max: usize) -> Result<Vec<EntryStub>> {
        let end = max.to_string();
        let info = self
            .dump_json(&["--flat-playlist", "--playlist-end", &end, url])
            .await?;
        let stubs = info.into_stubs(max);
        debug!(url, count = stubs.len(), "Listed playlist entries");
        Ok(stubs)
    }

    async fn resolve_entry(&self, stub: &EntryStub) -> Result<Track> {
        self.resolve_by_url(&stub.url).await
    }
}
