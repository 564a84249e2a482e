//! Track persistence
//!
//! Tracks are keyed by canonical source URL and written with upserts, so
//! resolving the same URL twice never creates a second row.

use super::models::{Artist, Platform, Track};
use crate::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::debug;

/// Idempotent key-value style store for tracks and artists
#[derive(Clone)]
pub struct TrackStore {
    db: SqlitePool,
}

impl TrackStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Exact lookup by canonical URL
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Track>> {
        let row = sqlx::query(
            r#"
            SELECT url, title, artist, duration_secs, stream_url, platform_id
            FROM tracks
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| track_from_row(&r)))
    }

    /// Best-effort name lookup
    ///
    /// Both the query and stored titles are compared with spaces, tabs and
    /// line breaks removed and ASCII case folded; the first stored match
    /// (insertion order) wins. There is no relevance ranking.
    pub async fn find_by_name(&self, query: &str) -> Result<Option<Track>> {
        let needle = normalize_title(query);
        if needle.is_empty() {
            return Ok(None);
        }
        let pattern = format!("%{}%", escape_like(&needle));

        let row = sqlx::query(
            r#"
            SELECT url, title, artist, duration_secs, stream_url, platform_id
            FROM tracks
            WHERE REPLACE(REPLACE(REPLACE(REPLACE(LOWER(title),
                      ' ', ''), char(9), ''), char(10), ''), char(13), '') LIKE ? ESCAPE '\'
            ORDER BY rowid ASC
            LIMIT 1
            "#,
        )
        .bind(pattern)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| track_from_row(&r)))
    }

    /// Insert or refresh a track; returns the stored row
    pub async fn upsert(&self, track: &Track) -> Result<Track> {
        self.get_or_add_artist(&track.artist).await?;

        sqlx::query(
            r#"
            INSERT INTO tracks (url, title, artist, duration_secs, stream_url, platform_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                duration_secs = excluded.duration_secs,
                stream_url = excluded.stream_url,
                platform_id = excluded.platform_id,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&track.url)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(track.duration_secs as i64)
        .bind(&track.stream_url)
        .bind(track.platform.map(Platform::id))
        .execute(&self.db)
        .await?;

        debug!("Upserted track {}", track.url);
        Ok(track.clone())
    }

    /// Persist a refreshed stream URL; returns whether the track existed
    pub async fn update_stream_url(&self, url: &str, stream_url: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tracks SET stream_url = ?, updated_at = CURRENT_TIMESTAMP WHERE url = ?",
        )
        .bind(stream_url)
        .bind(url)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Artist keyed by exact name, created on first use
    pub async fn get_or_add_artist(&self, name: &str) -> Result<Artist> {
        sqlx::query("INSERT OR IGNORE INTO artists (name) VALUES (?)")
            .bind(name)
            .execute(&self.db)
            .await?;

        Ok(Artist {
            name: name.to_string(),
        })
    }

    /// Registered platforms as (id, name) pairs
    pub async fn platforms(&self) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM platforms ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

fn track_from_row(row: &SqliteRow) -> Track {
    let duration: i64 = row.get("duration_secs");
    let platform_id: Option<i64> = row.get("platform_id");

    Track {
        url: row.get("url"),
        title: row.get("title"),
        artist: row.get("artist"),
        duration_secs: duration.max(0) as u64,
        stream_url: row.get("stream_url"),
        platform: platform_id.and_then(Platform::from_id),
    }
}

/// Characters removed from both sides of a name match
const STRIPPED: [char; 4] = [' ', '\t', '\n', '\r'];

/// Mirror of the SQL side of the match: SQLite's `LOWER` folds ASCII only
fn normalize_title(s: &str) -> String {
    s.chars()
        .filter(|c| !STRIPPED.contains(c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Never Gonna\tGive You Up "), "nevergonnagiveyouup");
        assert_eq!(normalize_title("Line\r\nBreak"), "linebreak");
        // Non-ASCII letters keep their case, as in SQLite
        assert_eq!(normalize_title("ÉTÉ Song"), "ÉTÉsong");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
