use chrono::{DateTime, Months, TimeZone, Utc};

pub const SECONDS_PER_DAY: i64 = 86_400;

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Adds calendar months to a unix timestamp, clamping to the end of shorter months.
pub fn add_months(ts: i64, months: u32) -> i64 {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt
            .checked_add_months(Months::new(months))
            .map(|d| d.timestamp())
            .unwrap_or(ts + i64::from(months) * 30 * SECONDS_PER_DAY),
        None => ts + i64::from(months) * 30 * SECONDS_PER_DAY,
    }
}

pub fn add_days(ts: i64, days: i64) -> i64 {
    ts + days * SECONDS_PER_DAY
}

/// "March 5, 2026" style date used in outgoing emails.
pub fn format_long_date(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%B %-d, %Y").to_string(),
        None => ts.to_string(),
    }
}

pub fn parse_rfc3339(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn test_add_months_clamps_month_end() {
        assert_eq!(add_months(ts(2026, 1, 31), 1), ts(2026, 2, 28));
        assert_eq!(add_months(ts(2026, 3, 15), 6), ts(2026, 9, 15));
    }

    #[test]
    fn test_add_days() {
        assert_eq!(add_days(ts(2026, 1, 1), 14), ts(2026, 1, 15));
    }

    #[test]
    fn test_format_long_date() {
        assert_eq!(format_long_date(ts(2026, 3, 5)), "March 5, 2026");
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(parse_rfc3339("2026-01-01T12:00:00Z"), Some(ts(2026, 1, 1)));
        assert_eq!(parse_rfc3339("2026-01-01T15:00:00+03:00"), Some(ts(2026, 1, 1)));
        assert_eq!(parse_rfc3339("next tuesday"), None);
    }
}
