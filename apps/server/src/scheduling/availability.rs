use crate::models::AvailabilityDay;
use crate::scheduling::time::{format_time, parse_time, TimeRange};

/// Default slot width and booking duration when none is recorded.
pub const DEFAULT_SLOT_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub range: TimeRange,
    pub available: bool,
}

impl Slot {
    pub fn start_time(&self) -> String {
        format_time(self.range.start_min)
    }

    pub fn end_time(&self) -> String {
        format_time(self.range.end_min)
    }
}

/// Result of the availability computation for one (trainer, date).
///
/// "Not available" (off day, blackout, no schedule) is distinct from a working
/// day where every slot happens to be taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayAvailability {
    NotAvailable,
    Slots(Vec<Slot>),
}

/// Derive bookable slots for a trainer on one date.
///
/// Pure function of the weekday schedule entry, blackout flag, and the active
/// (pending/confirmed) bookings already on the calendar. Working hours are
/// partitioned into fixed-width slots; a slot is available iff it overlaps no
/// existing booking (half-open comparison).
pub fn day_slots(
    day: Option<&AvailabilityDay>,
    is_blackout: bool,
    booked: &[TimeRange],
    slot_minutes: i64,
) -> DayAvailability {
    let day = match day {
        Some(d) if d.is_available && !is_blackout => d,
        _ => return DayAvailability::NotAvailable,
    };

    let (start, end) = match (parse_time(&day.start_time), parse_time(&day.end_time)) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => return DayAvailability::NotAvailable,
    };

    let mut slots = Vec::new();
    let mut cursor = start;
    // Only full-width slots; a trailing partial window is not bookable
    while cursor + slot_minutes <= end {
        let range = TimeRange::from_start(cursor, slot_minutes);
        let available = !booked.iter().any(|b| range.overlaps(b));
        slots.push(Slot { range, available });
        cursor += slot_minutes;
    }

    DayAvailability::Slots(slots)
}

/// Parse a booking row's (session_time, duration_min) into its occupied range.
pub fn booking_range(session_time: &str, duration_min: i64) -> Option<TimeRange> {
    let start = parse_time(session_time)?;
    let duration = if duration_min > 0 {
        duration_min
    } else {
        DEFAULT_SLOT_MINUTES
    };
    Some(TimeRange::from_start(start, duration))
}

/// Check whether one target slot is inside working hours and conflict-free.
///
/// Used by the booking path: the target range must be contained in the day's
/// working hours and must not overlap any active booking. Starts are not
/// snapped to the slot grid, so off-grid times (a 90-minute reschedule, a
/// 10:30 start) stay bookable as long as they fit.
pub fn slot_is_free(
    day: Option<&AvailabilityDay>,
    is_blackout: bool,
    booked: &[TimeRange],
    start_min: i64,
    duration_min: i64,
) -> bool {
    let day = match day {
        Some(d) if d.is_available && !is_blackout => d,
        _ => return false,
    };
    let (open, close) = match (parse_time(&day.start_time), parse_time(&day.end_time)) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => return false,
    };

    let target = TimeRange::from_start(start_min, duration_min);
    if target.start_min < open || target.end_min > close {
        return false;
    }
    !booked.iter().any(|b| target.overlaps(b))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn working_day(start: &str, end: &str) -> AvailabilityDay {
        AvailabilityDay {
            id: 1,
            trainer_id: 7,
            weekday: 0,
            is_available: true,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    fn booked(start: &str, duration: i64) -> TimeRange {
        booking_range(start, duration).unwrap()
    }

    #[test]
    fn test_no_schedule_row_not_available() {
        assert_eq!(
            day_slots(None, false, &[], DEFAULT_SLOT_MINUTES),
            DayAvailability::NotAvailable
        );
    }

    #[test]
    fn test_off_day_not_available() {
        let mut day = working_day("09:00", "17:00");
        day.is_available = false;
        assert_eq!(
            day_slots(Some(&day), false, &[], DEFAULT_SLOT_MINUTES),
            DayAvailability::NotAvailable
        );
    }

    #[test]
    fn test_blackout_overrides_schedule() {
        let day = working_day("09:00", "17:00");
        assert_eq!(
            day_slots(Some(&day), true, &[], DEFAULT_SLOT_MINUTES),
            DayAvailability::NotAvailable
        );
    }

    #[test]
    fn test_full_day_partition() {
        let day = working_day("09:00", "17:00");
        let result = day_slots(Some(&day), false, &[], DEFAULT_SLOT_MINUTES);
        let DayAvailability::Slots(slots) = result else {
            panic!("expected slots");
        };
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0].start_time(), "09:00");
        assert_eq!(slots[7].end_time(), "17:00");
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn test_trailing_partial_window_dropped() {
        let day = working_day("09:00", "10:30");
        let DayAvailability::Slots(slots) =
            day_slots(Some(&day), false, &[], DEFAULT_SLOT_MINUTES)
        else {
            panic!("expected slots");
        };
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].end_time(), "10:00");
    }

    #[test]
    fn test_booked_slot_flagged() {
        let day = working_day("09:00", "12:00");
        let taken = [booked("10:00", 60)];
        let DayAvailability::Slots(slots) =
            day_slots(Some(&day), false, &taken, DEFAULT_SLOT_MINUTES)
        else {
            panic!("expected slots");
        };
        assert!(slots[0].available); // 09:00
        assert!(!slots[1].available); // 10:00
        assert!(slots[2].available); // 11:00
    }

    #[test]
    fn test_long_booking_blocks_two_slots() {
        let day = working_day("09:00", "12:00");
        let taken = [booked("09:30", 90)];
        let DayAvailability::Slots(slots) =
            day_slots(Some(&day), false, &taken, DEFAULT_SLOT_MINUTES)
        else {
            panic!("expected slots");
        };
        assert!(!slots[0].available); // 09:00–10:00 overlaps 09:30–11:00
        assert!(!slots[1].available); // 10:00–11:00 overlaps
        assert!(slots[2].available); // 11:00–12:00 starts exactly at booking end
    }

    #[test]
    fn test_all_slots_taken_is_not_not_available() {
        let day = working_day("09:00", "11:00");
        let taken = [booked("09:00", 60), booked("10:00", 60)];
        let result = day_slots(Some(&day), false, &taken, DEFAULT_SLOT_MINUTES);
        let DayAvailability::Slots(slots) = result else {
            panic!("a fully booked working day still reports slots");
        };
        assert!(slots.iter().all(|s| !s.available));
    }

    #[test]
    fn test_half_hour_slots() {
        let day = working_day("09:00", "11:00");
        let DayAvailability::Slots(slots) = day_slots(Some(&day), false, &[], 30) else {
            panic!("expected slots");
        };
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[1].start_time(), "09:30");
    }

    #[test]
    fn test_zero_duration_booking_defaults_to_hour() {
        let range = booking_range("10:00", 0).unwrap();
        assert_eq!(range.end_min - range.start_min, 60);
    }

    #[test]
    fn test_slot_is_free_inside_hours() {
        let day = working_day("09:00", "17:00");
        assert!(slot_is_free(Some(&day), false, &[], 600, 60)); // 10:00
    }

    #[test]
    fn test_slot_is_free_outside_hours() {
        let day = working_day("09:00", "17:00");
        assert!(!slot_is_free(Some(&day), false, &[], 480, 60)); // 08:00
        assert!(!slot_is_free(Some(&day), false, &[], 990, 60)); // 16:30–17:30 spills over
    }

    #[test]
    fn test_slot_is_free_conflict() {
        let day = working_day("09:00", "17:00");
        let taken = [booked("10:00", 60)];
        assert!(!slot_is_free(Some(&day), false, &taken, 600, 60));
        assert!(!slot_is_free(Some(&day), false, &taken, 630, 60)); // 10:30 overlaps
        assert!(slot_is_free(Some(&day), false, &taken, 660, 60)); // 11:00 adjacent
    }

    #[test]
    fn test_slot_is_free_blackout() {
        let day = working_day("09:00", "17:00");
        assert!(!slot_is_free(Some(&day), true, &[], 600, 60));
    }
}
