use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Datelike;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::scheduling::availability::{
    booking_range, day_slots, slot_is_free, DayAvailability, DEFAULT_SLOT_MINUTES,
};
use crate::scheduling::time::{parse_date, TimeRange};
use crate::AppState;

// ── Shared slot queries (used by booking.rs too) ──

/// The weekly-schedule entry for a trainer on one weekday, if configured.
pub async fn weekday_entry(
    db: &SqlitePool,
    trainer_id: i64,
    weekday: i64,
) -> Result<Option<AvailabilityDay>, sqlx::Error> {
    sqlx::query_as::<_, AvailabilityDay>(
        "SELECT id, trainer_id, weekday, is_available, start_time, end_time
         FROM trainer_availability WHERE trainer_id = ? AND weekday = ?",
    )
    .bind(trainer_id)
    .bind(weekday)
    .fetch_optional(db)
    .await
}

pub async fn is_blackout(
    db: &SqlitePool,
    trainer_id: i64,
    date: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM blackout_dates WHERE trainer_id = ? AND date = ?")
        .bind(trainer_id)
        .bind(date)
        .fetch_one(db)
        .await
}

/// Occupied time ranges on one date: all pending/confirmed bookings for the
/// trainer, optionally excluding one booking id (the reschedule case).
pub async fn active_ranges(
    db: &SqlitePool,
    trainer_id: i64,
    date: &str,
    exclude_booking: Option<i64>,
) -> Result<Vec<TimeRange>, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT session_time, duration_min FROM bookings
         WHERE trainer_id = ? AND session_date = ?
           AND status IN ('pending', 'confirmed')
           AND id != ?",
    )
    .bind(trainer_id)
    .bind(date)
    .bind(exclude_booking.unwrap_or(-1))
    .fetch_all(db)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|(time, duration)| booking_range(time, *duration))
        .collect())
}

/// Full check for one target slot: working hours, blackout, and conflicts.
pub async fn target_slot_free(
    db: &SqlitePool,
    trainer_id: i64,
    date: &str,
    start_min: i64,
    duration_min: i64,
    exclude_booking: Option<i64>,
) -> Result<bool, ApiError> {
    let parsed = parse_date(date).ok_or_else(|| ApiError::Validation("Invalid date format".into()))?;
    let weekday = parsed.weekday().num_days_from_monday() as i64;

    let day = weekday_entry(db, trainer_id, weekday).await?;
    let blackout = is_blackout(db, trainer_id, date).await?;
    let booked = active_ranges(db, trainer_id, date, exclude_booking).await?;

    Ok(slot_is_free(
        day.as_ref(),
        blackout,
        &booked,
        start_min,
        duration_min,
    ))
}

// ── Endpoints ──

/// GET /api/trainers/:id/availability?date=YYYY-MM-DD — bookable slots for a date.
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(trainer_id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, ApiError> {
    let date = parse_date(&query.date)
        .ok_or_else(|| ApiError::Validation("Invalid date format".into()))?;
    let slot_minutes = query.slot_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
    if slot_minutes <= 0 || slot_minutes > 24 * 60 {
        return Err(ApiError::Validation("Invalid slot duration".into()));
    }

    let weekday = date.weekday().num_days_from_monday() as i64;
    let day = weekday_entry(&state.db, trainer_id, weekday).await?;
    let blackout = is_blackout(&state.db, trainer_id, &query.date).await?;
    let booked = active_ranges(&state.db, trainer_id, &query.date, None).await?;

    let response = match day_slots(day.as_ref(), blackout, &booked, slot_minutes) {
        DayAvailability::NotAvailable => AvailabilityResponse {
            trainer_available: false,
            slots: vec![],
        },
        DayAvailability::Slots(slots) => AvailabilityResponse {
            trainer_available: true,
            slots: slots
                .iter()
                .map(|s| SlotView {
                    start_time: s.start_time(),
                    end_time: s.end_time(),
                    available: s.available,
                })
                .collect(),
        },
    };

    Ok(Json(ApiResponse::success(response)))
}

/// GET /api/trainers/:id/schedule — the weekly working-hours template.
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path(trainer_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<AvailabilityDay>>>, ApiError> {
    let days = sqlx::query_as::<_, AvailabilityDay>(
        "SELECT id, trainer_id, weekday, is_available, start_time, end_time
         FROM trainer_availability WHERE trainer_id = ? ORDER BY weekday ASC",
    )
    .bind(trainer_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(days)))
}
