use chrono::{Datelike, Duration, NaiveDate};

/// Enumerate every date in `[start, end]` whose weekday is in `days_of_week`
/// (0 = Monday … 6 = Sunday). Output is ascending.
pub fn expand_dates(start: NaiveDate, end: NaiveDate, days_of_week: &[u8]) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let weekday = cursor.weekday().num_days_from_monday() as u8;
        if days_of_week.contains(&weekday) {
            dates.push(cursor);
        }
        cursor += Duration::days(1);
    }
    dates
}

/// A fresh recurring-group identifier shared by every booking in one batch.
///
/// Timestamp plus a process-wide sequence number, hex-encoded. Unique within
/// the deployment, which is all the grouping tag needs.
pub fn new_group_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&chrono::Utc::now().timestamp_micros().to_be_bytes());
    bytes[8..].copy_from_slice(&SEQ.fetch_add(1, Ordering::Relaxed).to_be_bytes());
    hex::encode(bytes)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_expand_single_weekday() {
        // 2026-03-02 is a Monday
        let dates = expand_dates(d("2026-03-02"), d("2026-03-31"), &[0]);
        assert_eq!(
            dates,
            vec![d("2026-03-02"), d("2026-03-09"), d("2026-03-16"), d("2026-03-23"), d("2026-03-30")]
        );
    }

    #[test]
    fn test_expand_two_weekdays() {
        // Mondays and Thursdays across two weeks
        let dates = expand_dates(d("2026-03-02"), d("2026-03-13"), &[0, 3]);
        assert_eq!(
            dates,
            vec![d("2026-03-02"), d("2026-03-05"), d("2026-03-09"), d("2026-03-12")]
        );
    }

    #[test]
    fn test_expand_bounds_inclusive() {
        let dates = expand_dates(d("2026-03-02"), d("2026-03-02"), &[0]);
        assert_eq!(dates, vec![d("2026-03-02")]);
    }

    #[test]
    fn test_expand_no_matching_weekday() {
        // Sunday never appears in a Mon–Fri range
        let dates = expand_dates(d("2026-03-02"), d("2026-03-06"), &[6]);
        assert!(dates.is_empty());
    }

    #[test]
    fn test_expand_empty_days() {
        assert!(expand_dates(d("2026-03-02"), d("2026-03-31"), &[]).is_empty());
    }

    #[test]
    fn test_expand_inverted_range() {
        assert!(expand_dates(d("2026-03-31"), d("2026-03-02"), &[0]).is_empty());
    }

    #[test]
    fn test_group_ids_distinct() {
        let a = new_group_id();
        let b = new_group_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
