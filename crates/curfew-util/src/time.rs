//! Time utilities for curfew
//!
//! Grant expiry is enforced on the monotonic clock owned by the async runtime;
//! wall-clock time is only used for what operators see.

use chrono::{DateTime, Local};
use std::time::Duration;

/// Current local wall-clock time.
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Wall-clock time `d` from now, saturating on overflow.
pub fn wall_deadline(d: Duration) -> DateTime<Local> {
    let now = now();
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|cd| now.checked_add_signed(cd))
        .unwrap_or(now)
}

/// Format a DateTime as a short clock time for chat messages.
pub fn format_clock_time(dt: &DateTime<Local>) -> String {
    dt.format("%H:%M").to_string()
}

/// Round a remaining duration to whole minutes for operator display ("~5 min").
pub fn format_minutes(d: Duration) -> String {
    let minutes = (d.as_secs() + 30) / 60;
    format!("{} min", minutes)
}

pub fn minutes(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_minutes_rounds() {
        assert_eq!(format_minutes(Duration::from_secs(89)), "1 min");
        assert_eq!(format_minutes(Duration::from_secs(90)), "2 min");
        assert_eq!(format_minutes(Duration::ZERO), "0 min");
    }

    #[test]
    fn test_format_clock_time() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_clock_time(&dt), "14:30");
    }

    #[test]
    fn test_wall_deadline_is_ahead() {
        let before = now();
        let deadline = wall_deadline(Duration::from_secs(600));
        assert!(deadline > before);
    }

    #[test]
    fn test_minutes() {
        assert_eq!(minutes(15), Duration::from_secs(900));
    }
}
