//! Voice channel membership
//!
//! The gateway binding owns the real voice state; it reports voice-state
//! updates here so commands can check "caller shares the bot's channel"
//! and vote-skip can count channel members.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Guild (server) identity; one playback session per guild
    GuildId
);
id_type!(UserId);
id_type!(ChannelId);

/// Voice-state change reported by the gateway binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    pub user_id: UserId,
    /// `None` when the user left voice
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Clone, Copy)]
struct Member {
    channel: ChannelId,
    is_bot: bool,
}

/// Who sits in which voice channel, per guild
#[derive(Default)]
pub struct VoiceRoster {
    guilds: RwLock<HashMap<GuildId, HashMap<UserId, Member>>>,
}

impl VoiceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a voice-state update; `None` means the user left voice
    pub async fn update(
        &self,
        guild: GuildId,
        user: UserId,
        channel: Option<ChannelId>,
        is_bot: bool,
    ) {
        let mut guilds = self.guilds.write().await;
        let members = guilds.entry(guild).or_default();
        match channel {
            Some(channel) => {
                members.insert(user, Member { channel, is_bot });
            }
            None => {
                members.remove(&user);
            }
        }
    }

    pub async fn channel_of(&self, guild: GuildId, user: UserId) -> Option<ChannelId> {
        self.guilds
            .read()
            .await
            .get(&guild)
            .and_then(|members| members.get(&user))
            .map(|m| m.channel)
    }

    /// Members of `channel` that are not bots
    pub async fn non_bot_members(&self, guild: GuildId, channel: ChannelId) -> usize {
        self.guilds
            .read()
            .await
            .get(&guild)
            .map(|members| {
                members
                    .values()
                    .filter(|m| m.channel == channel && !m.is_bot)
                    .count()
            })
            .unwrap_or(0)
    }
}
