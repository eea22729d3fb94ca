use chrono::{DateTime, SubsecRound, Utc};

pub fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

/// Current instant at millisecond precision, the resolution comments are
/// stamped and persisted with.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Lenient integer query value: missing, blank, non-numeric, or below `min`
/// all yield `default`.
pub fn parse_or(raw: Option<&str>, default: usize, min: usize) -> usize {
    raw.map(str::trim)
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|v| *v >= min as i64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn parse_or_falls_back() {
        assert_eq!(parse_or(None, 10, 1), 10);
        assert_eq!(parse_or(Some(""), 10, 1), 10);
        assert_eq!(parse_or(Some("abc"), 10, 1), 10);
        assert_eq!(parse_or(Some("0"), 10, 1), 10);
        assert_eq!(parse_or(Some("-3"), 0, 0), 0);
        assert_eq!(parse_or(Some(" 7 "), 10, 1), 7);
        assert_eq!(parse_or(Some("0"), 5, 0), 0);
    }

    #[test]
    fn now_millis_has_no_sub_millisecond_part() {
        assert_eq!(now_millis().nanosecond() % 1_000_000, 0);
    }
}
