use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A minute-granular time window within a single day, half-open: `[start, end)`.
///
/// All slot/booking overlap math goes through this type so the half-open
/// comparison lives in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Minutes from midnight, inclusive.
    pub start_min: i64,
    /// Minutes from midnight, exclusive.
    pub end_min: i64,
}

impl TimeRange {
    pub fn new(start_min: i64, end_min: i64) -> Self {
        Self { start_min, end_min }
    }

    pub fn from_start(start_min: i64, duration_min: i64) -> Self {
        Self {
            start_min,
            end_min: start_min + duration_min,
        }
    }

    /// Half-open interval overlap: `a.start < b.end && a.end > b.start`.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_min < other.end_min && self.end_min > other.start_min
    }
}

/// Parse "HH:MM" into minutes from midnight. Exactly two digits per component;
/// signs are rejected so "-1:00" or "12:-3" never reach storage.
pub fn parse_time(time: &str) -> Option<i64> {
    let (h, m) = time.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: i64 = h.parse().ok()?;
    let min: i64 = m.parse().ok()?;
    if hour > 23 || min > 59 {
        return None;
    }
    Some(hour * 60 + min)
}

/// Format minutes from midnight back into "HH:MM".
pub fn format_time(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Combine a "YYYY-MM-DD" date and "HH:MM" time into one timestamp.
pub fn session_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let d = parse_date(date)?;
    let t = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    Some(d.and_time(t))
}

/// Minutes from `now` until `target`; negative once the moment has passed.
pub fn minutes_until(target: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (target - now).num_minutes()
}

// ── Tests ──
