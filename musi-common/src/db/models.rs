//! Database models

use serde::{Deserialize, Serialize};

/// Streaming platforms known to the platform registry
///
/// The registry table is seeded from [`Platform::ALL`]; ids are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    SoundCloud,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::YouTube, Platform::SoundCloud];

    /// Registry primary key
    pub fn id(self) -> i64 {
        match self {
            Platform::YouTube => 1,
            Platform::SoundCloud => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::SoundCloud => "SoundCloud",
        }
    }

    pub fn home_url(self) -> &'static str {
        match self {
            Platform::YouTube => "https://www.youtube.com",
            Platform::SoundCloud => "https://soundcloud.com",
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// A playable unit
///
/// Identity is the canonical source `url`. Everything except `stream_url`
/// is fixed once resolved; the stream URL is time-limited and gets
/// replaced when the catalog reloads the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Canonical source URL (unique key)
    pub url: String,
    pub title: String,
    pub artist: String,
    /// Length in whole seconds, 0 when unknown (live streams)
    pub duration_secs: u64,
    /// Platform-issued media URL, expires
    pub stream_url: String,
    pub platform: Option<Platform>,
}

impl Track {
    /// Same track regardless of stream URL freshness
    pub fn same_source(&self, other: &Track) -> bool {
        self.url == other.url
    }

    /// Copy of this track pointing at a new stream URL
    pub fn with_stream_url(&self, stream_url: impl Into<String>) -> Track {
        Track {
            stream_url: stream_url.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_ids_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_id(platform.id()), Some(platform));
        }
        assert_eq!(Platform::from_id(99), None);
    }

    #[test]
    fn test_with_stream_url_keeps_identity() {
        let track = Track {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            title: "Song".to_string(),
            artist: "Band".to_string(),
            duration_secs: 180,
            stream_url: "https://media.example/old".to_string(),
            platform: Some(Platform::YouTube),
        };
        let fresh = track.with_stream_url("https://media.example/new");
        assert!(fresh.same_source(&track));
        assert_ne!(fresh, track);
        assert_eq!(fresh.stream_url, "https://media.example/new");
    }
}
