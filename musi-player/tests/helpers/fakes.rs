//! Fakes for the controller's collaborators
//!
//! Every fake records the calls it receives so tests can assert on
//! exactly how often the controller probed, reloaded or attached.

use async_trait::async_trait;
use musi_player::catalog::{Catalog, EntryStub};
use musi_player::controller::FinishSignal;
use musi_player::probe::{Freshness, FreshnessProbe};
use musi_player::sink::{AudioSink, SinkFactory};
use musi_player::voice::{ChannelId, GuildId};
use musi_player::{Error, Result, Track};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

// ============================================================================
// Gate
// ============================================================================

/// Parks callers while closed
///
/// Open by default. Closing installs a fresh zero-permit semaphore; opening
/// closes that semaphore, which wakes every parked caller at once.
#[derive(Default)]
pub struct Gate {
    semaphore: Mutex<Option<Arc<Semaphore>>>,
}

impl Gate {
    pub fn close(&self) {
        *self.semaphore.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn open(&self) {
        if let Some(semaphore) = self.semaphore.lock().unwrap().take() {
            semaphore.close();
        }
    }

    pub async fn pass(&self) {
        let semaphore = self.semaphore.lock().unwrap().clone();
        if let Some(semaphore) = semaphore {
            let _ = semaphore.acquire().await;
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    tracks: Mutex<HashMap<String, Track>>,
    playlists: Mutex<HashMap<String, Vec<EntryStub>>>,
    broken: Mutex<HashSet<String>>,
    pub reloads: AtomicUsize,
    pub resolved_entries: Mutex<Vec<String>>,
    pub listed_max: Mutex<Vec<usize>>,
    fail_reloads: AtomicBool,
    /// Entry resolves beyond `ungated_entries` wait on this gate
    pub entry_gate: Gate,
    ungated_entries: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, track: Track) {
        self.tracks.lock().unwrap().insert(track.url.clone(), track);
    }

    pub fn add_playlist(&self, url: &str, tracks: &[Track]) {
        for track in tracks {
            self.add(track.clone());
        }
        let stubs = tracks
            .iter()
            .map(|t| EntryStub {
                url: t.url.clone(),
                title: Some(t.title.clone()),
            })
            .collect();
        self.playlists.lock().unwrap().insert(url.to_string(), stubs);
    }

    /// Make every resolve of `url` fail
    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().insert(url.to_string());
    }

    /// Make every reload fail
    pub fn fail_reloads(&self) {
        self.fail_reloads.store(true, Ordering::SeqCst);
    }

    /// Let the first `n` entry resolves through, then park the rest
    pub fn hold_entries_after(&self, n: usize) {
        self.ungated_entries.store(n, Ordering::SeqCst);
        self.entry_gate.close();
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str) -> Result<Track> {
        if self.broken.lock().unwrap().contains(url) {
            return Err(Error::ExtractionFailure(format!("broken: {}", url)));
        }
        self.tracks
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ExtractionFailure(format!("unknown: {}", url)))
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn resolve_by_name(&self, query: &str) -> Result<Track> {
        let needle: String = query.split_whitespace().collect::<String>().to_lowercase();
        let tracks = self.tracks.lock().unwrap();
        let mut matches: Vec<&Track> = tracks
            .values()
            .filter(|t| {
                t.title
                    .split_whitespace()
                    .collect::<String>()
                    .to_lowercase()
                    .contains(&needle)
            })
            .collect();
        matches.sort_by(|a, b| a.url.cmp(&b.url));
        matches
            .first()
            .map(|t| (*t).clone())
            .ok_or_else(|| Error::ExtractionFailure(format!("no match for {}", query)))
    }

    async fn resolve_by_url(&self, url: &str) -> Result<Track> {
        self.lookup(url)
    }

    async fn reload(&self, track: &Track) -> Result<Track> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reloads.load(Ordering::SeqCst) {
            return Err(Error::ExtractionFailure(format!("reload refused: {}", track.url)));
        }
        Ok(track.with_stream_url(format!("{}?fresh", track.stream_url)))
    }

    async fn list_playlist_entries(&self, url: &str, max: usize) -> Result<Vec<EntryStub>> {
        self.listed_max.lock().unwrap().push(max);
        let playlists = self.playlists.lock().unwrap();
        let stubs = playlists
            .get(url)
            .ok_or_else(|| Error::ExtractionFailure(format!("no playlist {}", url)))?;
        Ok(stubs.iter().take(max).cloned().collect())
    }

    async fn resolve_entry(&self, stub: &EntryStub) -> Result<Track> {
        let resolved = {
            let mut entries = self.resolved_entries.lock().unwrap();
            entries.push(stub.url.clone());
            entries.len()
        };
        if resolved > self.ungated_entries.load(Ordering::SeqCst) {
            self.entry_gate.pass().await;
        }
        self.lookup(&stub.url)
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Probe answering from a per-URL status table (default 200)
///
/// Each check is recorded before it waits on `gate`, so a closed gate
/// leaves the controller parked mid-advance.
#[derive(Default)]
pub struct FakeProbe {
    statuses: Mutex<HashMap<String, u16>>,
    pub checks: Mutex<Vec<String>>,
    pub gate: Gate,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, stream_url: &str, status: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(stream_url.to_string(), status);
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().unwrap().len()
    }
}

#[async_trait]
impl FreshnessProbe for FakeProbe {
    async fn check(&self, stream_url: &str) -> Freshness {
        self.checks.lock().unwrap().push(stream_url.to_string());
        self.gate.pass().await;
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(stream_url)
            .copied()
            .unwrap_or(200);
        Freshness::from_status(status)
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Sink that "plays" until told to finish
///
/// `stop()` fires the pending finish signal the way a real source ends.
#[derive(Default)]
pub struct FakeSink {
    channel: Mutex<Option<ChannelId>>,
    pending: Mutex<Option<FinishSignal>>,
    pub played: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
    pub releases: AtomicUsize,
    pub muted: AtomicBool,
    failures_left: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected_to(channel: ChannelId) -> Self {
        let sink = Self::default();
        *sink.channel.lock().unwrap() = Some(channel);
        sink
    }

    /// Make the next `n` play calls fail
    pub fn fail_next_plays(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Drop the voice connection without telling the controller
    pub fn drop_connection(&self) {
        *self.channel.lock().unwrap() = None;
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// End the current source naturally
    pub fn finish_current(&self) -> bool {
        match self.pending.lock().unwrap().take() {
            Some(signal) => {
                signal.finish(None);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    fn is_connected(&self) -> bool {
        self.channel.lock().unwrap().is_some()
    }

    fn channel(&self) -> Option<ChannelId> {
        *self.channel.lock().unwrap()
    }

    async fn connect(&self, channel: ChannelId) -> Result<()> {
        *self.channel.lock().unwrap() = Some(channel);
        Ok(())
    }

    async fn disconnect(&self) {
        self.stop().await;
        *self.channel.lock().unwrap() = None;
    }

    async fn play(&self, stream_url: &str, on_finish: FinishSignal) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::SessionLost);
        }
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::Sink("attach refused".to_string()));
        }

        self.played.lock().unwrap().push(stream_url.to_string());
        self.muted.store(false, Ordering::SeqCst);
        if let Some(previous) = self.pending.lock().unwrap().replace(on_finish) {
            previous.finish(None);
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending.lock().unwrap().take();
        if let Some(signal) = pending {
            signal.finish(None);
        }
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending.lock().unwrap().take();
        if let Some(signal) = pending {
            signal.finish(None);
        }
    }
}

/// Hands out one shared fake sink for every guild
pub struct FakeSinkFactory {
    pub sink: Arc<FakeSink>,
}

impl SinkFactory for FakeSinkFactory {
    fn create(&self, _guild: GuildId) -> Arc<dyn AudioSink> {
        self.sink.clone()
    }
}
