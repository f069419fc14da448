use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::require_identity;
use crate::collaborators::{notify_detached, settle_refund};
use crate::error::ApiError;
use crate::handlers::availability::target_slot_free;
use crate::models::*;
use crate::scheduling::availability::DEFAULT_SLOT_MINUTES;
use crate::scheduling::policy;
use crate::scheduling::recurring::{expand_dates, new_group_id};
use crate::scheduling::time::{minutes_until, parse_date, parse_time, session_datetime};
use crate::AppState;

/// Upper bound on a recurring request's date range.
const MAX_RECURRING_RANGE_DAYS: i64 = 366;

// ── Shared helpers ──

pub async fn load_booking(db: &SqlitePool, id: i64) -> Result<Booking, ApiError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Booking not found".into()))
}

/// Whether the caller owns this booking (client side, trainer side, or admin).
pub fn owns_booking(identity: &Identity, booking: &Booking) -> bool {
    match identity.role {
        Role::Admin => true,
        Role::Client => identity.client_id == Some(booking.client_id),
        Role::Trainer => identity.trainer_id == Some(booking.trainer_id),
    }
}

fn require_client(identity: &Identity) -> Result<i64, ApiError> {
    match (identity.role, identity.client_id) {
        (Role::Client, Some(client_id)) => Ok(client_id),
        _ => Err(ApiError::Forbidden("Client role required".into())),
    }
}

async fn load_active_package(db: &SqlitePool, package_id: i64) -> Result<Package, ApiError> {
    sqlx::query_as::<_, Package>(
        "SELECT id, name, price, total_sessions, duration_weeks, is_active
         FROM packages WHERE id = ? AND is_active = 1",
    )
    .bind(package_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::Validation("package_unavailable".into()))
}

fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Validate every date of a recurring batch against the trainer's calendar.
/// Dates that fail the slot check come back formatted, in order.
async fn sweep_unavailable_dates(
    db: &SqlitePool,
    trainer_id: i64,
    dates: &[NaiveDate],
    start_min: i64,
) -> Result<Vec<String>, ApiError> {
    let mut unavailable = Vec::new();
    for date in dates {
        let date_str = date.format("%Y-%m-%d").to_string();
        let free = target_slot_free(
            db,
            trainer_id,
            &date_str,
            start_min,
            DEFAULT_SLOT_MINUTES,
            None,
        )
        .await?;
        if !free {
            unavailable.push(date_str);
        }
    }
    Ok(unavailable)
}

/// All-or-nothing recurring insert: every date must pass the sweep, then the
/// whole batch commits in one transaction under a shared group id. A concurrent
/// racer tripping the unique index on any row aborts every insert.
async fn book_recurring_slots(
    db: &SqlitePool,
    client_id: i64,
    trainer_id: i64,
    package: &Package,
    dates: &[NaiveDate],
    time: &str,
    start_min: i64,
    location: &str,
    notes: &str,
) -> Result<String, ApiError> {
    let unavailable = sweep_unavailable_dates(db, trainer_id, dates, start_min).await?;
    if !unavailable.is_empty() {
        return Err(ApiError::Conflict {
            message: "Some dates are unavailable".into(),
            unavailable_dates: unavailable,
        });
    }

    let group_id = new_group_id();
    let created_at = now_str();

    let mut tx = db.begin().await?;
    for date in dates {
        let date_str = date.format("%Y-%m-%d").to_string();
        let package_end_date = (*date + Duration::weeks(package.duration_weeks))
            .format("%Y-%m-%d")
            .to_string();

        sqlx::query(
            "INSERT INTO bookings (client_id, trainer_id, package_id, session_date, session_time,
             duration_min, status, amount, remaining_sessions, package_end_date,
             recurring_group_id, location, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(client_id)
        .bind(trainer_id)
        .bind(package.id)
        .bind(&date_str)
        .bind(time)
        .bind(DEFAULT_SLOT_MINUTES)
        .bind(package.price)
        .bind(package.total_sessions)
        .bind(&package_end_date)
        .bind(&group_id)
        .bind(location)
        .bind(notes)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(group_id)
}

/// Minutes from now until the booking's scheduled slot (negative once past).
fn minutes_before_session(booking: &Booking) -> Result<i64, ApiError> {
    let session = session_datetime(&booking.session_date, &booking.session_time)
        .ok_or(ApiError::Internal)?;
    Ok(minutes_until(session, Utc::now().naive_utc()))
}

// ── Endpoints ──

/// POST /api/bookings — create a pending booking on a free slot.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let client_id = require_client(&identity)?;

    let date = parse_date(&body.date)
        .ok_or_else(|| ApiError::Validation("Invalid date format".into()))?;
    let start_min = parse_time(&body.time)
        .ok_or_else(|| ApiError::Validation("Invalid time format".into()))?;

    let package = load_active_package(&state.db, body.package_id).await?;

    let free = target_slot_free(
        &state.db,
        body.trainer_id,
        &body.date,
        start_min,
        DEFAULT_SLOT_MINUTES,
        None,
    )
    .await?;
    if !free {
        return Err(ApiError::conflict("trainer_unavailable"));
    }

    let package_end_date = (date + Duration::weeks(package.duration_weeks))
        .format("%Y-%m-%d")
        .to_string();

    // The partial unique index serializes concurrent creates on the same slot;
    // a violation comes back as a Conflict through the sqlx error mapping.
    let booking_id = sqlx::query(
        "INSERT INTO bookings (client_id, trainer_id, package_id, session_date, session_time,
         duration_min, status, amount, remaining_sessions, package_end_date,
         location, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?)",
    )
    .bind(client_id)
    .bind(body.trainer_id)
    .bind(package.id)
    .bind(&body.date)
    .bind(&body.time)
    .bind(DEFAULT_SLOT_MINUTES)
    .bind(package.price)
    .bind(package.total_sessions)
    .bind(&package_end_date)
    .bind(&body.location)
    .bind(&body.notes)
    .bind(now_str())
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let booking = load_booking(&state.db, booking_id).await?;

    tracing::info!(
        "booking {} created: client {} with trainer {} on {} {}",
        booking_id,
        client_id,
        body.trainer_id,
        body.date,
        body.time
    );

    notify_detached(
        &state,
        booking.trainer_id,
        "booking_created",
        serde_json::json!({
            "booking_id": booking.id,
            "date": booking.session_date,
            "time": booking.session_time,
        }),
    );

    Ok(Json(ApiResponse::success(booking)))
}

/// POST /api/bookings/recurring — all-or-nothing batch over a weekday pattern.
pub async fn create_recurring_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RecurringBookingRequest>,
) -> Result<Json<ApiResponse<RecurringBookingResponse>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let client_id = require_client(&identity)?;

    let start = parse_date(&body.start_date)
        .ok_or_else(|| ApiError::Validation("Invalid start date".into()))?;
    let end = parse_date(&body.end_date)
        .ok_or_else(|| ApiError::Validation("Invalid end date".into()))?;
    let start_min = parse_time(&body.time)
        .ok_or_else(|| ApiError::Validation("Invalid time format".into()))?;

    if end < start {
        return Err(ApiError::Validation("End date before start date".into()));
    }
    if (end - start).num_days() > MAX_RECURRING_RANGE_DAYS {
        return Err(ApiError::Validation("Date range too long".into()));
    }
    if body.days_of_week.is_empty() || body.days_of_week.iter().any(|&d| d > 6) {
        return Err(ApiError::Validation("Invalid days of week".into()));
    }

    let package = load_active_package(&state.db, body.package_id).await?;

    let dates = expand_dates(start, end, &body.days_of_week);
    if dates.is_empty() {
        return Err(ApiError::Validation("No matching dates in range".into()));
    }

    let group_id = book_recurring_slots(
        &state.db,
        client_id,
        body.trainer_id,
        &package,
        &dates,
        &body.time,
        start_min,
        &body.location,
        &body.notes,
    )
    .await?;

    let bookings = sqlx::query_as::<_, Booking>(
        "SELECT * FROM bookings WHERE recurring_group_id = ? ORDER BY session_date ASC",
    )
    .bind(&group_id)
    .fetch_all(&state.db)
    .await?;

    tracing::info!(
        "recurring group {} created: {} bookings for client {} with trainer {}",
        group_id,
        bookings.len(),
        client_id,
        body.trainer_id
    );

    notify_detached(
        &state,
        body.trainer_id,
        "recurring_booking_created",
        serde_json::json!({
            "recurring_group_id": group_id,
            "count": bookings.len(),
        }),
    );

    Ok(Json(ApiResponse::success(RecurringBookingResponse {
        recurring_group_id: group_id,
        bookings,
    })))
}

/// GET /api/bookings/my — the caller's upcoming pending/confirmed bookings.
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Booking>>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;

    let (column, owner_id) = match identity.role {
        Role::Client => (
            "client_id",
            identity.client_id.ok_or_else(|| {
                ApiError::Forbidden("Client id missing from identity".into())
            })?,
        ),
        Role::Trainer => (
            "trainer_id",
            identity.trainer_id.ok_or_else(|| {
                ApiError::Forbidden("Trainer id missing from identity".into())
            })?,
        ),
        Role::Admin => {
            return Err(ApiError::Validation(
                "Admin has no personal bookings".into(),
            ))
        }
    };

    let query = format!(
        "SELECT * FROM bookings
         WHERE {} = ? AND status IN ('pending', 'confirmed')
           AND session_date >= date('now')
         ORDER BY session_date ASC, session_time ASC",
        column
    );

    let bookings = sqlx::query_as::<_, Booking>(&query)
        .bind(owner_id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/bookings/:id/confirm — trainer accepts a pending booking.
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let booking = load_booking(&state.db, id).await?;

    let is_owning_trainer =
        identity.role == Role::Trainer && identity.trainer_id == Some(booking.trainer_id);
    if !is_owning_trainer {
        return Err(ApiError::Forbidden(
            "Only the owning trainer may confirm a booking".into(),
        ));
    }

    let result = sqlx::query("UPDATE bookings SET status = 'confirmed' WHERE id = ? AND status = 'pending'")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Validation("Booking is not pending".into()));
    }

    let booking = load_booking(&state.db, id).await?;

    notify_detached(
        &state,
        booking.client_id,
        "booking_confirmed",
        serde_json::json!({
            "booking_id": booking.id,
            "date": booking.session_date,
            "time": booking.session_time,
        }),
    );

    Ok(Json(ApiResponse::success(booking)))
}

/// POST /api/bookings/:id/cancel — cancel with time-window refund tiers.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<CancelBookingResponse>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let booking = load_booking(&state.db, id).await?;

    if !owns_booking(&identity, &booking) {
        return Err(ApiError::Forbidden("Not your booking".into()));
    }
    if booking.status != "pending" && booking.status != "confirmed" {
        return Err(ApiError::Validation(
            "Booking can no longer be cancelled".into(),
        ));
    }

    let minutes_before = minutes_before_session(&booking)?;
    let refund = policy::refund_amount(booking.amount, identity.role, minutes_before);
    let refund_status = if refund > 0 { "pending" } else { "none" };

    // Guarded transition; a concurrent cancel/complete loses the race here
    let result = sqlx::query(
        "UPDATE bookings
         SET status = 'cancelled', cancelled_at = ?, cancelled_by = ?,
             cancellation_reason = ?, refund_amount = ?, refund_status = ?
         WHERE id = ? AND status IN ('pending', 'confirmed')",
    )
    .bind(now_str())
    .bind(identity.role.as_str())
    .bind(&body.reason)
    .bind(refund)
    .bind(refund_status)
    .bind(id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::Validation(
            "Booking can no longer be cancelled".into(),
        ));
    }

    tracing::info!(
        "booking {} cancelled by {} ({}h before), refund {}",
        id,
        identity.role.as_str(),
        policy::hours(minutes_before).round(),
        refund
    );

    // Refund execution is decoupled: the cancel has committed no matter what
    // the payment collaborator does next.
    if refund > 0 {
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            settle_refund(&state_clone, id, refund).await;
        });
    }

    let counterparty = if identity.role == Role::Client {
        booking.trainer_id
    } else {
        booking.client_id
    };
    notify_detached(
        &state,
        counterparty,
        "booking_cancelled",
        serde_json::json!({
            "booking_id": id,
            "date": booking.session_date,
            "time": booking.session_time,
            "refund_amount": refund,
        }),
    );

    let booking = load_booking(&state.db, id).await?;
    Ok(Json(ApiResponse::success(CancelBookingResponse {
        booking,
        refund_amount: refund,
    })))
}

/// POST /api/bookings/:id/reschedule — move to a new free slot, ≥24h ahead.
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<RescheduleBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let booking = load_booking(&state.db, id).await?;

    if !owns_booking(&identity, &booking) {
        return Err(ApiError::Forbidden("Not your booking".into()));
    }
    if booking.status != "pending" && booking.status != "confirmed" {
        return Err(ApiError::Validation(
            "Booking can no longer be rescheduled".into(),
        ));
    }

    parse_date(&body.new_date)
        .ok_or_else(|| ApiError::Validation("Invalid date format".into()))?;
    let start_min = parse_time(&body.new_time)
        .ok_or_else(|| ApiError::Validation("Invalid time format".into()))?;

    let minutes_before = minutes_before_session(&booking)?;
    policy::check_reschedule(minutes_before, booking.reschedule_count, state.max_reschedules)?;

    let free = target_slot_free(
        &state.db,
        booking.trainer_id,
        &body.new_date,
        start_min,
        booking.duration_min,
        Some(id),
    )
    .await?;
    if !free {
        return Err(ApiError::conflict("trainer_unavailable"));
    }

    // Move + log atomically; the unique index guards the new slot under race
    let mut tx = state.db.begin().await?;
    sqlx::query(
        "UPDATE bookings
         SET session_date = ?, session_time = ?, reschedule_count = reschedule_count + 1
         WHERE id = ?",
    )
    .bind(&body.new_date)
    .bind(&body.new_time)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO reschedule_log (booking_id, old_date, old_time, new_date, new_time,
         reason, requested_by, requested_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&booking.session_date)
    .bind(&booking.session_time)
    .bind(&body.new_date)
    .bind(&body.new_time)
    .bind(&body.reason)
    .bind(identity.role.as_str())
    .bind(now_str())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(
        "booking {} rescheduled by {}: {} {} -> {} {}",
        id,
        identity.role.as_str(),
        booking.session_date,
        booking.session_time,
        body.new_date,
        body.new_time
    );

    let counterparty = if identity.role == Role::Client {
        booking.trainer_id
    } else {
        booking.client_id
    };
    notify_detached(
        &state,
        counterparty,
        "booking_rescheduled",
        serde_json::json!({
            "booking_id": id,
            "new_date": body.new_date,
            "new_time": body.new_time,
        }),
    );

    let booking = load_booking(&state.db, id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

// ── Tests ──
