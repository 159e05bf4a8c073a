//! "Updated N minutes ago" status text.

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Describe how long ago the last successful load happened.
///
/// `last_load` and `now` are unix seconds. A timestamp in the future (clock
/// moved backwards) reads as "just now".
pub fn format_staleness(last_load: Option<i64>, now: i64) -> String {
    let Some(last) = last_load else {
        return "Never updated.".to_string();
    };

    let elapsed = now.saturating_sub(last).max(0);
    let ago = if elapsed < HOUR {
        match elapsed / MINUTE {
            0 => "just now".to_string(),
            1 => "1 minute ago".to_string(),
            n => format!("{} minutes ago", n),
        }
    } else if elapsed < DAY {
        match elapsed / HOUR {
            1 => "1 hour ago".to_string(),
            n => format!("{} hours ago", n),
        }
    } else if elapsed < 2 * DAY {
        "yesterday".to_string()
    } else {
        "ages ago".to_string()
    };

    format!("Updated {}", ago)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_never_updated() {
        assert_eq!(format_staleness(None, NOW), "Never updated.");
    }

    #[test]
    fn test_minutes() {
        assert_eq!(format_staleness(Some(NOW - 59), NOW), "Updated just now");
        assert_eq!(format_staleness(Some(NOW - 60), NOW), "Updated 1 minute ago");
        assert_eq!(format_staleness(Some(NOW - 119), NOW), "Updated 1 minute ago");
        assert_eq!(format_staleness(Some(NOW - 45 * 60), NOW), "Updated 45 minutes ago");
        assert_eq!(format_staleness(Some(NOW - 3599), NOW), "Updated 59 minutes ago");
    }

    #[test]
    fn test_hours() {
        assert_eq!(format_staleness(Some(NOW - 3600), NOW), "Updated 1 hour ago");
        assert_eq!(format_staleness(Some(NOW - 5 * 3600 - 10), NOW), "Updated 5 hours ago");
        assert_eq!(format_staleness(Some(NOW - DAY + 1), NOW), "Updated 23 hours ago");
    }

    #[test]
    fn test_days() {
        assert_eq!(format_staleness(Some(NOW - DAY), NOW), "Updated yesterday");
        assert_eq!(format_staleness(Some(NOW - 2 * DAY + 1), NOW), "Updated yesterday");
        assert_eq!(format_staleness(Some(NOW - 2 * DAY), NOW), "Updated ages ago");
    }

    #[test]
    fn test_future_timestamp_is_just_now() {
        assert_eq!(format_staleness(Some(NOW + 600), NOW), "Updated just now");
    }
}
