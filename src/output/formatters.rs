//! Reusable formatting utilities for CLI output

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Format an instant in a named time zone.
///
/// Returns "never" when there is no instant.
///
/// # Example output
/// `2025-01-15 03:00 EST`
pub fn format_instant(at: Option<DateTime<Utc>>, tz: Tz) -> String {
    match at {
        Some(at) => at.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
        None => "never".to_string(),
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format a duration to a human-readable string.
///
/// # Example output
/// - `2h 15m 30s` (hours, minutes, seconds)
/// - `5m 10s` (minutes, seconds)
/// - `45s` (seconds only)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_instant_in_zone() {
        let at = DateTime::parse_from_rfc3339("2025-01-15T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let tz: Tz = "America/New_York".parse().unwrap();
        assert_eq!(format_instant(Some(at), tz), "2025-01-15 03:00 EST");
    }

    #[test]
    fn test_format_instant_never() {
        assert_eq!(format_instant(None, chrono_tz::UTC), "never");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_format_duration_hours() {
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h 0m 0s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_format_duration_seconds_only() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
