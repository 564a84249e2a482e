//! Configuration loading and config file resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `MUSI_CONFIG` environment variable
//! 3. Per-user config file (`~/.config/musi/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: a warning is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MUSI_CONFIG";

/// Hard upper bound on playlist ingestion, regardless of configuration
pub const PLAYLIST_HARD_CEILING: usize = 200;

/// Service configuration, deserialized from TOML
///
/// Every key is optional in the file; absent keys take the values from
/// [`MusiConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusiConfig {
    /// Address the HTTP control surface binds to
    pub bind_addr: String,
    /// Port the HTTP control surface listens on
    pub port: u16,
    /// SQLite database file (None = platform data directory)
    pub db_path: Option<PathBuf>,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
    /// User id of the bot account (excluded from member counts)
    pub bot_user_id: u64,
    /// Freshness probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Attempts to hand a stream to the sink before skipping the track
    pub attach_attempts: u32,
    /// Fixed delay between attach attempts in seconds
    pub attach_delay_secs: u64,
    /// Vote-skip poll window in seconds
    pub vote_timeout_secs: u64,
    /// Maximum tracks accepted from a single playlist
    pub playlist_ceiling: usize,
    /// Entries shown per page by the queue command
    pub queue_page_size: usize,
    /// yt-dlp executable used by the catalog backend
    pub ytdlp_path: PathBuf,
    /// Timeout for a single yt-dlp invocation in seconds
    pub ytdlp_timeout_secs: u64,
    /// ffmpeg executable used by the audio sink
    pub ffmpeg_path: PathBuf,
    /// Directory where the sink writes one PCM pipe per guild
    pub sink_output_dir: PathBuf,
}

impl Default for MusiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5780,
            db_path: None,
            log_level: "info".to_string(),
            bot_user_id: 0,
            probe_timeout_secs: 10,
            attach_attempts: 3,
            attach_delay_secs: 2,
            vote_timeout_secs: 30,
            playlist_ceiling: PLAYLIST_HARD_CEILING,
            queue_page_size: 15,
            ytdlp_path: PathBuf::from("yt-dlp"),
            ytdlp_timeout_secs: 60,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            sink_output_dir: std::env::temp_dir().join("musi"),
        }
    }
}

impl MusiConfig {
    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MusiConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        config.validate()
    }

    /// Reject values the playback loop cannot work with
    ///
    /// The playlist ceiling is clamped rather than rejected.
    pub fn validate(mut self) -> Result<Self> {
        if self.attach_attempts == 0 {
            return Err(Error::Config("attach_attempts must be at least 1".to_string()));
        }
        if self.queue_page_size == 0 {
            return Err(Error::Config("queue_page_size must be at least 1".to_string()));
        }
        if self.vote_timeout_secs == 0 {
            return Err(Error::Config("vote_timeout_secs must be at least 1".to_string()));
        }
        if self.playlist_ceiling == 0 || self.playlist_ceiling > PLAYLIST_HARD_CEILING {
            warn!(
                "playlist_ceiling {} out of range, clamping to {}",
                self.playlist_ceiling, PLAYLIST_HARD_CEILING
            );
            self.playlist_ceiling = PLAYLIST_HARD_CEILING;
        }
        Ok(self)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn attach_delay(&self) -> Duration {
        Duration::from_secs(self.attach_delay_secs)
    }

    pub fn vote_timeout(&self) -> Duration {
        Duration::from_secs(self.vote_timeout_secs)
    }

    pub fn ytdlp_timeout(&self) -> Duration {
        Duration::from_secs(self.ytdlp_timeout_secs)
    }

    /// Database path, falling back to the platform data directory
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

/// Locate the config file to load, if any
///
/// Returns `None` when no candidate exists; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    dirs::config_dir()
        .map(|d| d.join("musi").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration following the resolution order
///
/// An explicitly named file that cannot be read is reported as a warning
/// and replaced by defaults; a file that exists but does not parse is an
/// error, since silently ignoring a typo is worse than refusing to start.
pub fn load_config(cli_arg: Option<&Path>) -> Result<MusiConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return Ok(MusiConfig::default());
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            info!("Loading config from {}", path.display());
            MusiConfig::from_toml_str(&content)
        }
        Err(e) => {
            warn!(
                "Config file {} unreadable ({}), using compiled defaults",
                path.display(),
                e
            );
            Ok(MusiConfig::default())
        }
    }
}

/// OS-dependent default database location
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("musi"))
        .unwrap_or_else(|| PathBuf::from("./musi_data"))
        .join("musi.db")
}
