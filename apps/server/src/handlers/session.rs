use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::auth::require_identity;
use crate::collaborators::notify_detached;
use crate::error::ApiError;
use crate::handlers::booking::{load_booking, owns_booking};
use crate::models::*;
use crate::scheduling::time::session_datetime;
use crate::AppState;

/// Apply the completed transition: guarded status flip, history row, trainer
/// counter, all in one transaction.
///
/// Returns false (and writes nothing) when the booking is no longer confirmed,
/// so a repeated completion never double-decrements `remaining_sessions` or
/// duplicates the history row.
async fn apply_completion(
    db: &sqlx::SqlitePool,
    booking: &Booking,
    duration_min: i64,
    exercises: &str,
    notes: &str,
) -> Result<bool, sqlx::Error> {
    let completed_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let mut tx = db.begin().await?;

    let result = sqlx::query(
        "UPDATE bookings
         SET status = 'completed',
             remaining_sessions = MAX(0, remaining_sessions - 1)
         WHERE id = ? AND status = 'confirmed'",
    )
    .bind(booking.id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO session_history (booking_id, date, time, duration_min, exercises, notes, completed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(booking.id)
    .bind(&booking.session_date)
    .bind(&booking.session_time)
    .bind(duration_min)
    .bind(exercises)
    .bind(notes)
    .bind(&completed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO trainers (trainer_id, display_name, completed_sessions)
         VALUES (?, '', 0)
         ON CONFLICT(trainer_id) DO NOTHING",
    )
    .bind(booking.trainer_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE trainers SET completed_sessions = completed_sessions + 1 WHERE trainer_id = ?")
        .bind(booking.trainer_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// POST /api/bookings/:id/complete — trainer records a delivered session.
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<CompleteSessionRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let booking = load_booking(&state.db, id).await?;

    let is_owning_trainer =
        identity.role == Role::Trainer && identity.trainer_id == Some(booking.trainer_id);
    if !is_owning_trainer {
        return Err(ApiError::Forbidden(
            "Only the owning trainer may complete a session".into(),
        ));
    }
    if booking.status != "confirmed" {
        return Err(ApiError::Validation(
            "Only confirmed bookings can be completed".into(),
        ));
    }

    // No completing sessions that have not started yet
    let session = session_datetime(&booking.session_date, &booking.session_time)
        .ok_or(ApiError::Internal)?;
    if session > Utc::now().naive_utc() {
        return Err(ApiError::Validation(
            "Session has not started yet".into(),
        ));
    }

    let duration = match body.duration_min {
        Some(d) if d > 0 => d,
        Some(_) => return Err(ApiError::Validation("Invalid session duration".into())),
        None => booking.duration_min,
    };

    let applied = apply_completion(&state.db, &booking, duration, &body.exercises, &body.notes)
        .await?;
    if !applied {
        return Err(ApiError::Validation(
            "Booking was already completed or cancelled".into(),
        ));
    }

    tracing::info!(
        "booking {} completed by trainer {} ({} min)",
        id,
        booking.trainer_id,
        duration
    );

    notify_detached(
        &state,
        booking.client_id,
        "session_completed",
        serde_json::json!({
            "booking_id": id,
            "date": booking.session_date,
        }),
    );

    let booking = load_booking(&state.db, id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// GET /api/bookings/:id/history — reschedule log plus completion record.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<BookingHistory>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let booking = load_booking(&state.db, id).await?;

    if !owns_booking(&identity, &booking) {
        return Err(ApiError::Forbidden("Not your booking".into()));
    }

    let reschedules = sqlx::query_as::<_, RescheduleEvent>(
        "SELECT * FROM reschedule_log WHERE booking_id = ? ORDER BY requested_at ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let sessions = sqlx::query_as::<_, SessionRecord>(
        "SELECT * FROM session_history WHERE booking_id = ? ORDER BY completed_at ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(BookingHistory {
        booking,
        reschedules,
        sessions,
    })))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn confirmed_booking(pool: &SqlitePool) -> Booking {
        let id = sqlx::query(
            "INSERT INTO bookings (client_id, trainer_id, package_id, session_date, session_time,
             status, amount, remaining_sessions, package_end_date, created_at)
             VALUES (1, 7, 1, '2026-03-02', '10:00', 'confirmed', 400, 10, '2026-12-31',
                     '2026-01-01 10:00:00')",
        )
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn remaining_sessions(pool: &SqlitePool, id: i64) -> i64 {
        sqlx::query_scalar("SELECT remaining_sessions FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn history_rows(pool: &SqlitePool, id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM session_history WHERE booking_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_completion_decrements_and_records() {
        let pool = test_pool().await;
        let booking = confirmed_booking(&pool).await;

        assert!(apply_completion(&pool, &booking, 60, "squats", "")
            .await
            .unwrap());

        assert_eq!(remaining_sessions(&pool, booking.id).await, 9);
        assert_eq!(history_rows(&pool, booking.id).await, 1);

        let counter: i64 =
            sqlx::query_scalar("SELECT completed_sessions FROM trainers WHERE trainer_id = 7")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(counter, 1);
    }

    #[tokio::test]
    async fn test_repeat_completion_is_noop() {
        let pool = test_pool().await;
        let booking = confirmed_booking(&pool).await;

        assert!(apply_completion(&pool, &booking, 60, "", "").await.unwrap());
        // Second run hits a 'completed' row: the guarded UPDATE matches nothing
        assert!(!apply_completion(&pool, &booking, 60, "", "").await.unwrap());

        assert_eq!(remaining_sessions(&pool, booking.id).await, 9);
        assert_eq!(history_rows(&pool, booking.id).await, 1);
    }

    #[tokio::test]
    async fn test_completion_refused_after_cancel() {
        let pool = test_pool().await;
        let booking = confirmed_booking(&pool).await;

        sqlx::query("UPDATE bookings SET status = 'cancelled' WHERE id = ?")
            .bind(booking.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(!apply_completion(&pool, &booking, 60, "", "").await.unwrap());
        assert_eq!(history_rows(&pool, booking.id).await, 0);
    }

    #[tokio::test]
    async fn test_remaining_sessions_never_negative() {
        let pool = test_pool().await;
        let booking = confirmed_booking(&pool).await;
        sqlx::query("UPDATE bookings SET remaining_sessions = 0 WHERE id = ?")
            .bind(booking.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(apply_completion(&pool, &booking, 60, "", "").await.unwrap());
        assert_eq!(remaining_sessions(&pool, booking.id).await, 0);
    }
}
