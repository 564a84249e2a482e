//! Session registry
//!
//! Maps each guild to its independent playback session. Sessions are
//! created on first use and removed on disconnect.

use crate::controller::{PlaybackController, Services};
use crate::sink::SinkFactory;
use crate::voice::GuildId;
use crate::vote::VoteSkipCoordinator;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Everything one guild's playback needs
pub struct GuildSession {
    pub controller: Arc<PlaybackController>,
    pub votes: VoteSkipCoordinator,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<GuildId, Arc<GuildSession>>>,
    services: Services,
    sinks: Arc<dyn SinkFactory>,
    vote_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(services: Services, sinks: Arc<dyn SinkFactory>, vote_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            services,
            sinks,
            vote_timeout,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn get(&self, guild: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.read().await.get(&guild).cloned()
    }

    pub async fn get_or_create(&self, guild: GuildId) -> Arc<GuildSession> {
        if let Some(session) = self.get(guild).await {
            return session;
        }

        let mut sessions = self.sessions.write().await;
        // Another caller may have created it between the locks
        if let Some(session) = sessions.get(&guild) {
            return Arc::clone(session);
        }

        let session = Arc::new(GuildSession {
            controller: PlaybackController::spawn(
                guild,
                self.sinks.create(guild),
                self.services.clone(),
            ),
            votes: VoteSkipCoordinator::new(self.vote_timeout),
        });
        sessions.insert(guild, Arc::clone(&session));
        info!(guild = %guild, "Session created");
        session
    }

    pub async fn remove(&self, guild: GuildId) -> Option<Arc<GuildSession>> {
        let removed = self.sessions.write().await.remove(&guild);
        if removed.is_some() {
            info!(guild = %guild, "Session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
