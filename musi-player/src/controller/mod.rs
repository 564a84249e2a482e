//! Playback controller
//!
//! One controller per guild session. It owns the current/previous track
//! pair and drives the sink through a serialized state machine:
//!
//! ```text
//! Idle → Advancing → Playing ⇄ Paused
//!          ↑            │
//!          └────────────┘  completion, skip, back
//! ```
//!
//! `advance` is the only mutator of current/previous and runs under the
//! advance lock, which it holds through probe, reload and attach. The
//! session itself sits behind a separate mutex that is only held for
//! in-memory updates, so pause, skip and back answer immediately even while
//! an advance waits on the network. Sink completions arrive as [`Control`]
//! messages on a single-consumer channel read by a long-lived loop task.

mod session;

pub use session::NowPlaying;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::events::{EventBus, PlayerEvent, PlayerState};
use crate::probe::{Freshness, FreshnessProbe};
use crate::queue::QueueStore;
use crate::retry::RetryPolicy;
use crate::sink::AudioSink;
use crate::voice::GuildId;
use musi_common::db::Track;
use musi_common::time;
use session::{Session, Status};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Messages consumed by the advance loop
#[derive(Debug)]
pub(crate) enum Control {
    /// The sink source started under `play_id` ended
    Finished { play_id: u64, error: Option<String> },
    /// Start playback if nothing is playing
    StartIfIdle,
    /// Skip the current track
    Skip,
}

/// Completion callback handed to [`AudioSink::play`]
///
/// Consumed by [`FinishSignal::finish`], so a source can report its end at
/// most once.
#[derive(Debug)]
pub struct FinishSignal {
    tx: mpsc::UnboundedSender<Control>,
    play_id: u64,
}

impl FinishSignal {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Control>, play_id: u64) -> Self {
        Self { tx, play_id }
    }

    pub fn play_id(&self) -> u64 {
        self.play_id
    }

    /// Report that the source ended, with the error text if it failed
    pub fn finish(self, error: Option<String>) {
        // Controller gone means nobody cares any more
        let _ = self.tx.send(Control::Finished {
            play_id: self.play_id,
            error,
        });
    }
}

/// Shared collaborators of every controller
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn Catalog>,
    pub probe: Arc<dyn FreshnessProbe>,
    pub events: EventBus,
    pub retry: RetryPolicy,
}

pub struct PlaybackController {
    guild: GuildId,
    queue: Arc<RwLock<QueueStore>>,
    /// Serializes advances; held across network I/O
    advancing: Mutex<()>,
    /// Never held across network I/O
    session: Mutex<Session>,
    status: RwLock<Status>,
    sink: Arc<dyn AudioSink>,
    services: Services,
    /// Bumped by every reset; ingestion and in-flight advances compare it
    epoch: AtomicU64,
    next_play_id: AtomicU64,
    control_tx: mpsc::UnboundedSender<Control>,
}

impl PlaybackController {
    /// Create a controller and start its advance loop
    pub fn spawn(guild: GuildId, sink: Arc<dyn AudioSink>, services: Services) -> Arc<Self> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let controller = Arc::new(Self {
            guild,
            queue: Arc::new(RwLock::new(QueueStore::new())),
            advancing: Mutex::new(()),
            session: Mutex::new(Session::default()),
            status: RwLock::new(Status::default()),
            sink,
            services,
            epoch: AtomicU64::new(0),
            next_play_id: AtomicU64::new(0),
            control_tx,
        });

        tokio::spawn(run_loop(Arc::downgrade(&controller), control_rx));
        info!(guild = %guild, "Playback controller started");
        controller
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn sink(&self) -> &Arc<dyn AudioSink> {
        &self.sink
    }

    /// Queue handle shared with the ingestion pipeline
    pub fn queue(&self) -> Arc<RwLock<QueueStore>> {
        Arc::clone(&self.queue)
    }

    /// Session generation; changes whenever the session is reset
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> PlayerState {
        self.status.read().await.state
    }

    pub async fn current(&self) -> Option<Track> {
        self.status.read().await.session.current.clone()
    }

    pub async fn previous(&self) -> Option<Track> {
        self.status.read().await.session.previous.clone()
    }

    pub async fn now(&self) -> NowPlaying {
        let status = self.status.read().await;
        NowPlaying {
            state: status.state,
            track: status.session.current.clone(),
            elapsed_secs: status.session.elapsed().as_secs(),
            queue_len: self.queue.read().await.len(),
        }
    }

    // ========================================
    // Queue mutations
    // ========================================

    pub async fn enqueue(&self, track: Track) {
        let len = {
            let mut queue = self.queue.write().await;
            queue.enqueue(track);
            queue.len()
        };
        self.emit_queue_changed(len);
    }

    /// Insert so the track plays next
    pub async fn enqueue_front(&self, track: Track) {
        let len = {
            let mut queue = self.queue.write().await;
            queue.enqueue_front(track);
            queue.len()
        };
        self.emit_queue_changed(len);
    }

    pub async fn enqueue_many(&self, tracks: Vec<Track>) -> usize {
        let (added, len) = {
            let mut queue = self.queue.write().await;
            let added = queue.enqueue_many(tracks);
            (added, queue.len())
        };
        self.emit_queue_changed(len);
        added
    }

    pub async fn shuffle(&self) {
        let len = {
            let mut queue = self.queue.write().await;
            queue.shuffle();
            queue.len()
        };
        self.emit_queue_changed(len);
    }

    pub async fn clear_queue(&self) {
        self.queue.write().await.clear();
        self.emit_queue_changed(0);
    }

    /// Make the track at 1-based `position` play next
    pub async fn move_to_next(&self, position: usize) -> Result<()> {
        let mut queue = self.queue.write().await;
        let len = queue.len();
        if position == 0 || !queue.move_to_front(position - 1) {
            return Err(Error::PositionOutOfRange { position, len });
        }
        drop(queue);
        self.emit_queue_changed(len);
        Ok(())
    }

    // ========================================
    // Playback transitions
    // ========================================

    /// Move to the next queued track, or go idle when the queue is empty
    pub async fn advance(&self) {
        let _advancing = self.advancing.lock().await;
        self.advance_serialized().await;
    }

    /// Advance only when nothing is playing
    pub async fn start_if_idle(&self) {
        let _advancing = self.advancing.lock().await;
        if self.session.lock().await.is_playing() {
            return;
        }
        self.advance_serialized().await;
    }

    /// Ask the loop to start playback without waiting for it
    pub fn request_start(&self) {
        let _ = self.control_tx.send(Control::StartIfIdle);
    }

    /// Ask the loop to skip without waiting for it
    pub fn request_skip(&self) {
        let _ = self.control_tx.send(Control::Skip);
    }

    /// Stop the current source; its completion advances the queue
    pub async fn skip(&self) -> Result<()> {
        let session = self.session.lock().await;
        if !session.is_playing() {
            return Err(Error::NothingPlaying);
        }
        if let Some(track) = &session.current {
            self.services.events.emit(PlayerEvent::TrackSkipped {
                guild: self.guild,
                url: track.url.clone(),
                reason: "skip requested".to_string(),
                timestamp: time::now(),
            });
        }
        drop(session);

        self.sink.stop().await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if !session.is_playing() {
            return Err(Error::NothingPlaying);
        }
        if session.is_paused() {
            return Ok(());
        }

        self.sink.set_muted(true).await?;
        session.paused_at = Some(Instant::now());
        info!(guild = %self.guild, "Playback paused");
        self.publish(&session).await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if !session.is_playing() {
            return Err(Error::NothingPlaying);
        }
        let Some(paused_at) = session.paused_at else {
            return Ok(());
        };

        self.sink.set_muted(false).await?;
        let paused_for = paused_at.elapsed();
        session.started_at = session.started_at.map(|s| s + paused_for);
        session.paused_at = None;
        info!(guild = %self.guild, paused_secs = paused_for.as_secs(), "Playback resumed");
        self.publish(&session).await;
        Ok(())
    }

    /// Replay the previous track
    ///
    /// The previous track is front-inserted. While playing, the sink is
    /// stopped and its completion advances onto it; otherwise the loop is
    /// asked to start playback.
    pub async fn back(&self) -> Result<()> {
        let (previous, playing) = {
            let session = self.session.lock().await;
            let previous = session.previous.clone().ok_or(Error::NoPreviousTrack)?;
            (previous, session.is_playing())
        };

        self.enqueue_front(previous).await;

        if playing {
            self.sink.stop().await;
        } else {
            self.request_start();
        }
        Ok(())
    }

    /// Clear the whole session and release the sink
    ///
    /// Never fails; calling it on an empty session is a no-op apart from
    /// the published idle state.
    pub async fn stop(&self, reason: &str) {
        {
            let mut session = self.session.lock().await;
            // Bumped under the session lock so an advance either commits
            // before the reset or sees the new epoch
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *session = Session::default();
            self.publish(&session).await;
        }
        self.queue.write().await.clear();

        self.sink.stop().await;
        self.sink.release().await;

        info!(guild = %self.guild, reason, "Session reset");
        self.services.events.set_presence(self.guild, None);
        self.emit_queue_changed(0);
        self.services.events.emit(PlayerEvent::SessionReset {
            guild: self.guild,
            reason: reason.to_string(),
            timestamp: time::now(),
        });
    }

    /// Reset the session and leave voice
    pub async fn disconnect(&self, reason: &str) {
        self.stop(reason).await;
        self.sink.disconnect().await;
    }

    // ========================================
    // Advance loop internals
    // ========================================

    async fn on_finished(&self, play_id: u64, error: Option<String>) {
        let _advancing = self.advancing.lock().await;
        {
            let mut session = self.session.lock().await;
            if session.active_play != Some(play_id) {
                debug!(guild = %self.guild, play_id, "Ignoring stale completion");
                return;
            }

            match error {
                Some(e) => warn!(guild = %self.guild, error = %e, "Track ended with error"),
                None => debug!(guild = %self.guild, play_id, "Track finished"),
            }

            if !self.sink.is_connected() {
                warn!(guild = %self.guild, "Completion after sink disconnect; not advancing");
                session.clear_playback();
                self.publish(&session).await;
                return;
            }
        }

        self.advance_serialized().await;
    }

    /// One advance; the caller holds the advance lock
    async fn advance_serialized(&self) {
        let epoch = {
            let mut session = self.session.lock().await;
            session.clear_playback();

            if !self.sink.is_connected() {
                warn!(guild = %self.guild, "Sink not connected; advance aborted");
                self.publish(&session).await;
                return;
            }

            session.previous = session.current.take();
            self.publish(&session).await;
            self.epoch()
        };
        self.set_state(PlayerState::Advancing).await;

        loop {
            if self.epoch() != epoch {
                let session = self.session.lock().await;
                self.publish(&session).await;
                return;
            }
            let next = self.queue.write().await.dequeue_head();
            let Some(track) = next else {
                self.go_idle(epoch).await;
                return;
            };
            self.emit_queue_changed(self.queue.read().await.len());

            match self.attach(track.clone(), epoch).await {
                Ok((track, play_id)) => {
                    let mut session = self.session.lock().await;
                    if self.epoch() != epoch {
                        // Reset raced the attach
                        self.publish(&session).await;
                        drop(session);
                        self.sink.stop().await;
                        return;
                    }

                    info!(guild = %self.guild, url = %track.url, title = %track.title, "Now playing");
                    self.services.events.set_presence(self.guild, Some(&track.title));
                    self.services.events.emit(PlayerEvent::TrackStarted {
                        guild: self.guild,
                        url: track.url.clone(),
                        title: track.title.clone(),
                        timestamp: time::now(),
                    });
                    session.current = Some(track);
                    session.active_play = Some(play_id);
                    session.started_at = Some(Instant::now());
                    self.publish(&session).await;
                    return;
                }
                Err(e) => {
                    warn!(guild = %self.guild, url = %track.url, error = %e, "Skipping unplayable track");
                    self.services.events.emit(PlayerEvent::TrackSkipped {
                        guild: self.guild,
                        url: track.url.clone(),
                        reason: e.to_string(),
                        timestamp: time::now(),
                    });

                    if self.epoch() != epoch || !self.sink.is_connected() {
                        let session = self.session.lock().await;
                        self.publish(&session).await;
                        return;
                    }
                }
            }
        }
    }

    /// Probe, reload if stale, and hand the stream to the sink
    ///
    /// The whole sequence runs under the retry policy. The probe verdict is
    /// kept across attempts, so a stale URL is reloaded once per successful
    /// reload rather than once per attach attempt.
    async fn attach(&self, track: Track, epoch: u64) -> Result<(Track, u64)> {
        let state = Mutex::new((track, false));

        let play_id = self
            .services
            .retry
            .run("attach", |attempt| {
                let state = &state;
                async move {
                    if self.epoch() != epoch {
                        return Err(Error::SessionLost);
                    }

                    let mut guard = state.lock().await;
                    let (track, verified) = &mut *guard;

                    if !*verified {
                        if let Freshness::Stale(reason) =
                            self.services.probe.check(&track.stream_url).await
                        {
                            info!(
                                guild = %self.guild,
                                url = %track.url,
                                attempt,
                                reason = %reason,
                                "Stream URL stale, reloading"
                            );
                            *track = self.services.catalog.reload(track).await.map_err(|e| {
                                Error::StaleStreamUrl(format!("{} could not be reloaded: {}", track.url, e))
                            })?;
                        }
                        *verified = true;
                    }

                    let play_id = self.next_play_id.fetch_add(1, Ordering::SeqCst) + 1;
                    let signal = FinishSignal::new(self.control_tx.clone(), play_id);
                    self.sink.play(&track.stream_url, signal).await?;
                    Ok(play_id)
                }
            })
            .await?;

        let (track, _) = state.into_inner();
        Ok((track, play_id))
    }

    async fn go_idle(&self, epoch: u64) {
        {
            let mut session = self.session.lock().await;
            if self.epoch() != epoch {
                self.publish(&session).await;
                return;
            }
            session.current = None;
            session.clear_playback();
            self.publish(&session).await;
        }
        self.sink.release().await;
        self.services.events.set_presence(self.guild, None);
        info!(guild = %self.guild, "Queue exhausted, idle");
    }

    /// Copy the session into the status snapshot and announce state changes
    async fn publish(&self, session: &Session) {
        let state = session.state();
        let mut status = self.status.write().await;
        let changed = status.state != state;
        status.state = state;
        status.session = session.clone();
        drop(status);

        if changed {
            self.emit_state(state);
        }
    }

    async fn set_state(&self, state: PlayerState) {
        let mut status = self.status.write().await;
        if status.state == state {
            return;
        }
        status.state = state;
        drop(status);
        self.emit_state(state);
    }

    fn emit_state(&self, state: PlayerState) {
        debug!(guild = %self.guild, state = %state, "State changed");
        self.services.events.emit(PlayerEvent::StateChanged {
            guild: self.guild,
            state,
            timestamp: time::now(),
        });
    }

    fn emit_queue_changed(&self, len: usize) {
        self.services.events.emit(PlayerEvent::QueueChanged {
            guild: self.guild,
            len,
            timestamp: time::now(),
        });
    }
}

/// Single consumer of the control channel
///
/// Holds only a weak handle so dropping the last controller reference ends
/// the loop.
async fn run_loop(controller: Weak<PlaybackController>, mut rx: mpsc::UnboundedReceiver<Control>) {
    while let Some(message) = rx.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };

        match message {
            Control::Finished { play_id, error } => controller.on_finished(play_id, error).await,
            Control::StartIfIdle => controller.start_if_idle().await,
            Control::Skip => {
                if let Err(e) = controller.skip().await {
                    debug!(guild = %controller.guild, error = %e, "Skip request ignored");
                }
            }
        }
    }
    debug!("Advance loop exited");
}
