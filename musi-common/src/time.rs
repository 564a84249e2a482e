//! Timestamp and duration display utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format whole seconds as `H:MM:SS`
///
/// Hours are not wrapped into days, so a 25 hour queue reads `25:00:00`.
///
/// ```
/// use musi_common::time::format_clock;
///
/// assert_eq!(format_clock(0), "0:00:00");
/// assert_eq!(format_clock(380), "0:06:20");
/// assert_eq!(format_clock(3661), "1:01:01");
/// ```
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, secs)
}

/// Format a playback position against a track length
///
/// Unknown lengths (live streams report 0) show only the position.
pub fn format_progress(elapsed_secs: u64, total_secs: u64) -> String {
    if total_secs == 0 {
        format_clock(elapsed_secs)
    } else {
        format!(
            "{} / {}",
            format_clock(elapsed_secs.min(total_secs)),
            format_clock(total_secs)
        )
    }
}
