use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::AvailabilityDay;
use crate::scheduling::time::parse_time;

/// Gap between completed sessions (in days) that still counts as one streak.
pub const STREAK_MAX_GAP_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streaks {
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub retained: usize,
    pub lost: usize,
    pub new: usize,
}

/// Sum a trainer's working hours across every day in `[from, to]`.
///
/// Off days, days with no schedule entry, and blackout dates contribute zero.
pub fn available_hours(
    schedule: &[AvailabilityDay],
    blackouts: &HashSet<NaiveDate>,
    from: NaiveDate,
    to: NaiveDate,
) -> f64 {
    let mut total_min: i64 = 0;
    let mut cursor = from;
    while cursor <= to {
        if !blackouts.contains(&cursor) {
            let weekday = cursor.weekday().num_days_from_monday() as i64;
            if let Some(day) = schedule.iter().find(|d| d.weekday == weekday) {
                if day.is_available {
                    if let (Some(start), Some(end)) =
                        (parse_time(&day.start_time), parse_time(&day.end_time))
                    {
                        if end > start {
                            total_min += end - start;
                        }
                    }
                }
            }
        }
        cursor += Duration::days(1);
    }
    total_min as f64 / 60.0
}

/// Hours consumed by confirmed/completed bookings. Bookings with no recorded
/// duration count as one hour.
pub fn booked_hours(durations_min: &[i64]) -> f64 {
    durations_min
        .iter()
        .map(|&d| if d > 0 { d } else { 60 })
        .sum::<i64>() as f64
        / 60.0
}

/// Utilization = booked hours / available hours; zero when nothing is offered.
pub fn utilization(booked: f64, available: f64) -> f64 {
    if available <= 0.0 {
        0.0
    } else {
        booked / available
    }
}

/// Compute current/longest completed-session streaks for a client.
///
/// `completed_desc` must be sorted by session date descending. A streak spans
/// consecutive sessions at most `STREAK_MAX_GAP_DAYS` apart; the current streak
/// only counts if the latest session is itself within that gap of `today`.
pub fn streaks(completed_desc: &[NaiveDate], today: NaiveDate) -> Streaks {
    if completed_desc.is_empty() {
        return Streaks {
            current: 0,
            longest: 0,
        };
    }

    let mut longest: u32 = 1;
    let mut run: u32 = 1;
    let mut first_run: u32 = 1;
    let mut first_run_open = true;

    for pair in completed_desc.windows(2) {
        let gap = (pair[0] - pair[1]).num_days();
        if gap <= STREAK_MAX_GAP_DAYS {
            run += 1;
            if first_run_open {
                first_run += 1;
            }
        } else {
            run = 1;
            first_run_open = false;
        }
        longest = longest.max(run);
    }

    let current = if (today - completed_desc[0]).num_days() <= STREAK_MAX_GAP_DAYS {
        first_run
    } else {
        0
    };

    Streaks { current, longest }
}

/// Client retention between two equal-length periods.
pub fn retention(previous: &HashSet<i64>, current: &HashSet<i64>) -> Retention {
    let retained = previous.intersection(current).count();
    Retention {
        retained,
        lost: previous.len() - retained,
        new: current.len() - retained,
    }
}

/// The equal-length period immediately before `[from, to]`.
pub fn previous_period(from: NaiveDate, to: NaiveDate) -> (NaiveDate, NaiveDate) {
    let len = (to - from).num_days();
    let prev_to = from - Duration::days(1);
    (prev_to - Duration::days(len), prev_to)
}

// ── Tests ──
