//! Wiring for controller and command-level tests

use super::fakes::{FakeCatalog, FakeProbe, FakeSink, FakeSinkFactory};
use musi_common::db::{open_in_memory, Platform, TrackStore};
use musi_player::commands::{Command, CommandContext, CommandHandler, CommandReply};
use musi_player::controller::{PlaybackController, Services};
use musi_player::events::{EventBus, PlayerEvent};
use musi_player::ingest::PlaylistIngestion;
use musi_player::registry::SessionRegistry;
use musi_player::retry::RetryPolicy;
use musi_player::voice::{ChannelId, GuildId, UserId, VoiceRoster, VoiceStateUpdate};
use musi_player::Track;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const GUILD: GuildId = GuildId(1);
pub const CHANNEL: ChannelId = ChannelId(100);
pub const BOT: UserId = UserId(999);

/// Create a test track with a predictable url, title and stream
pub fn test_track(id: u32) -> Track {
    Track {
        url: format!("https://www.youtube.com/watch?v=track{}", id),
        title: format!("Track {}", id),
        artist: "Test Artist".to_string(),
        duration_secs: 180,
        stream_url: format!("https://media.example/{}", id),
        platform: Some(Platform::YouTube),
    }
}

/// Poll `condition` until it holds, panicking after about two seconds
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Drain every event currently buffered on a receiver
pub fn drain(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_millis(1))
}

/// One controller wired to fakes, sink already connected
pub struct Harness {
    pub controller: Arc<PlaybackController>,
    pub sink: Arc<FakeSink>,
    pub catalog: Arc<FakeCatalog>,
    pub probe: Arc<FakeProbe>,
    pub events: EventBus,
}

impl Harness {
    pub fn new() -> Self {
        let sink = Arc::new(FakeSink::connected_to(CHANNEL));
        let catalog = Arc::new(FakeCatalog::new());
        let probe = Arc::new(FakeProbe::new());
        let events = EventBus::new();

        let services = Services {
            catalog: catalog.clone(),
            probe: probe.clone(),
            events: events.clone(),
            retry: fast_retry(),
        };
        let controller = PlaybackController::spawn(GUILD, sink.clone(), services);

        Self {
            controller,
            sink,
            catalog,
            probe,
            events,
        }
    }

    pub async fn enqueue(&self, ids: &[u32]) {
        let tracks = ids.iter().map(|&id| test_track(id)).collect();
        self.controller.enqueue_many(tracks).await;
    }

    pub async fn queue_titles(&self) -> Vec<String> {
        self.controller
            .queue()
            .read()
            .await
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    pub async fn current_title(&self) -> Option<String> {
        self.controller.current().await.map(|t| t.title)
    }

    pub async fn previous_title(&self) -> Option<String> {
        self.controller.previous().await.map(|t| t.title)
    }

    pub async fn wait_for_current(&self, title: &str) {
        let controller = &self.controller;
        wait_until(title, || async move {
            controller.current().await.map(|t| t.title).as_deref() == Some(title)
        })
        .await;
    }
}

/// Full command surface over fakes and an in-memory track store
pub struct CommandHarness {
    pub handler: Arc<CommandHandler>,
    pub sink: Arc<FakeSink>,
    pub catalog: Arc<FakeCatalog>,
    pub probe: Arc<FakeProbe>,
    pub events: EventBus,
    pub store: TrackStore,
}

impl CommandHarness {
    pub async fn new() -> Self {
        Self::with_sink(FakeSink::new()).await
    }

    pub async fn with_sink(sink: FakeSink) -> Self {
        let store = TrackStore::new(open_in_memory().await.expect("in-memory database"));
        let sink = Arc::new(sink);
        let catalog = Arc::new(FakeCatalog::new());
        let probe = Arc::new(FakeProbe::new());
        let events = EventBus::new();

        let services = Services {
            catalog: catalog.clone(),
            probe: probe.clone(),
            events: events.clone(),
            retry: fast_retry(),
        };
        let registry = Arc::new(SessionRegistry::new(
            services,
            Arc::new(FakeSinkFactory { sink: sink.clone() }),
            Duration::from_secs(30),
        ));
        let ingestion = Arc::new(PlaylistIngestion::new(
            catalog.clone(),
            store.clone(),
            RetryPolicy::once(),
            200,
        ));
        let handler = Arc::new(CommandHandler::new(
            registry,
            Arc::new(VoiceRoster::new()),
            ingestion,
            BOT,
            15,
        ));

        Self {
            handler,
            sink,
            catalog,
            probe,
            events,
            store,
        }
    }

    /// Report a user joining (or leaving, with `None`) voice
    pub async fn voice(&self, user: u64, channel: Option<u64>) {
        self.handler
            .voice_state_update(
                GUILD,
                VoiceStateUpdate {
                    user_id: UserId(user),
                    channel_id: channel.map(ChannelId),
                    is_bot: user == BOT.0,
                },
            )
            .await;
    }

    pub async fn run(&self, user: u64, command: Command) -> CommandReply {
        self.handler
            .execute(
                CommandContext {
                    guild: GUILD,
                    user: UserId(user),
                },
                command,
            )
            .await
    }

    pub async fn controller(&self) -> Arc<PlaybackController> {
        self.handler
            .registry()
            .get(GUILD)
            .await
            .expect("session exists")
            .controller
            .clone()
    }

    pub async fn wait_for_current(&self, title: &str) {
        let controller = self.controller().await;
        let controller = &controller;
        wait_until(title, || async move {
            controller.current().await.map(|t| t.title).as_deref() == Some(title)
        })
        .await;
    }
}
