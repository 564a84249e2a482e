//! Source URL helpers
//!
//! Platform detection and canonicalization. Tracks are keyed by canonical
//! URL, so every YouTube link form (`youtu.be/ID`, `/embed/ID`, `?v=ID&t=3`)
//! maps to `https://www.youtube.com/watch?v=ID`.

use musi_common::db::Platform;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((?:https?:)?//)?((?:www|m|music)\.)?(youtube(?:-nocookie)?\.com|youtu\.be)(/(?:[\w\-]+\?v=|embed/|live/|v/|shorts/)?)([\w\-]+)(\S+)?$",
    )
    .expect("youtube pattern is valid")
});

static SOUNDCLOUD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:https?:)?//)?((?:www|m)\.)?soundcloud\.com/\S+$")
        .expect("soundcloud pattern is valid")
});

const YOUTUBE_WATCH: &str = "https://www.youtube.com/watch?v=";

/// Path prefixes whose last segment is a video id
const YOUTUBE_ID_PATHS: &[&str] = &["embed", "live", "v", "shorts"];

pub fn detect_platform(url: &str) -> Option<Platform> {
    let url = url.trim();
    if YOUTUBE_RE.is_match(url) {
        Some(Platform::YouTube)
    } else if SOUNDCLOUD_RE.is_match(url) {
        Some(Platform::SoundCloud)
    } else {
        None
    }
}

/// Whether a query should be treated as a link rather than search text
pub fn is_url(query: &str) -> bool {
    let query = query.trim();
    if detect_platform(query).is_some() {
        return true;
    }
    matches!(Url::parse(query), Ok(u) if u.scheme() == "http" || u.scheme() == "https")
}

/// Canonical form used as the track key
///
/// YouTube video links collapse to the watch URL; playlist and channel
/// pages, and links on other platforms, are returned trimmed but otherwise
/// unchanged.
pub fn canonical_url(url: &str) -> String {
    let url = url.trim();
    if detect_platform(url) != Some(Platform::YouTube) {
        return url.to_string();
    }

    match youtube_video_id(url) {
        Some(id) => format!("{}{}", YOUTUBE_WATCH, id),
        None => url.to_string(),
    }
}

fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = if url.starts_with("//") {
        Url::parse(&format!("https:{}", url))
    } else if url.contains("://") {
        Url::parse(url)
    } else {
        Url::parse(&format!("https://{}", url))
    }
    .ok()?;

    if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        return valid_id(&id);
    }

    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    let host = parsed.host_str()?;

    if host.ends_with("youtu.be") {
        return segments.first().and_then(|id| valid_id(id));
    }

    match segments.as_slice() {
        [prefix, .., id] if YOUTUBE_ID_PATHS.contains(prefix) => valid_id(id),
        _ => None,
    }
}

fn valid_id(id: &str) -> Option<String> {
    let ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    ok.then(|| id.to_string())
}
