use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::models::*;
use crate::scheduling::time::{parse_date, parse_time};
use crate::AppState;

/// PUT /api/admin/trainers/:id/schedule — replace weekday entries in bulk.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trainer_id): Path<i64>,
    Json(body): Json<UpdateScheduleRequest>,
) -> Result<Json<ApiResponse<Vec<AvailabilityDay>>>, ApiError> {
    require_admin(&headers, &state.auth_secret)?;

    if body.days.is_empty() {
        return Err(ApiError::Validation("No schedule entries provided".into()));
    }
    for day in &body.days {
        if day.weekday > 6 {
            return Err(ApiError::Validation(format!(
                "Invalid weekday {}",
                day.weekday
            )));
        }
        let start = parse_time(&day.start_time)
            .ok_or_else(|| ApiError::Validation("Invalid start time".into()))?;
        let end = parse_time(&day.end_time)
            .ok_or_else(|| ApiError::Validation("Invalid end time".into()))?;
        if day.is_available && end <= start {
            return Err(ApiError::Validation(
                "End time must be after start time".into(),
            ));
        }
    }

    let mut tx = state.db.begin().await?;

    sqlx::query(
        "INSERT INTO trainers (trainer_id, display_name, completed_sessions)
         VALUES (?, '', 0)
         ON CONFLICT(trainer_id) DO NOTHING",
    )
    .bind(trainer_id)
    .execute(&mut *tx)
    .await?;

    for day in &body.days {
        sqlx::query(
            "INSERT INTO trainer_availability (trainer_id, weekday, is_available, start_time, end_time)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(trainer_id, weekday) DO UPDATE SET
               is_available = excluded.is_available,
               start_time = excluded.start_time,
               end_time = excluded.end_time",
        )
        .bind(trainer_id)
        .bind(day.weekday as i64)
        .bind(day.is_available)
        .bind(&day.start_time)
        .bind(&day.end_time)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        "schedule updated for trainer {} ({} entries)",
        trainer_id,
        body.days.len()
    );

    let days = sqlx::query_as::<_, AvailabilityDay>(
        "SELECT id, trainer_id, weekday, is_available, start_time, end_time
         FROM trainer_availability WHERE trainer_id = ? ORDER BY weekday ASC",
    )
    .bind(trainer_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(days)))
}

/// POST /api/admin/trainers/:id/blackouts — idempotent per (trainer, date).
pub async fn add_blackout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trainer_id): Path<i64>,
    Json(body): Json<AddBlackoutRequest>,
) -> Result<Json<ApiResponse<BlackoutDate>>, ApiError> {
    require_admin(&headers, &state.auth_secret)?;

    parse_date(&body.date).ok_or_else(|| ApiError::Validation("Invalid date format".into()))?;

    sqlx::query(
        "INSERT OR IGNORE INTO blackout_dates (trainer_id, date, reason) VALUES (?, ?, ?)",
    )
    .bind(trainer_id)
    .bind(&body.date)
    .bind(&body.reason)
    .execute(&state.db)
    .await?;

    let blackout = sqlx::query_as::<_, BlackoutDate>(
        "SELECT id, trainer_id, date, reason FROM blackout_dates WHERE trainer_id = ? AND date = ?",
    )
    .bind(trainer_id)
    .bind(&body.date)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("blackout added for trainer {} on {}", trainer_id, body.date);
    Ok(Json(ApiResponse::success(blackout)))
}

/// DELETE /api/admin/trainers/:id/blackouts/:date
pub async fn remove_blackout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((trainer_id, date)): Path<(i64, String)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    require_admin(&headers, &state.auth_secret)?;

    let result = sqlx::query("DELETE FROM blackout_dates WHERE trainer_id = ? AND date = ?")
        .bind(trainer_id)
        .bind(&date)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Blackout not found".into()));
    }

    tracing::info!("blackout removed for trainer {} on {}", trainer_id, date);
    Ok(Json(ApiResponse::success(())))
}

/// POST /api/admin/packages
pub async fn create_package(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePackageRequest>,
) -> Result<Json<ApiResponse<Package>>, ApiError> {
    require_admin(&headers, &state.auth_secret)?;

    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("Package name required".into()));
    }
    if body.price < 0 || body.total_sessions <= 0 || body.duration_weeks <= 0 {
        return Err(ApiError::Validation("Invalid package parameters".into()));
    }

    let id = sqlx::query(
        "INSERT INTO packages (name, price, total_sessions, duration_weeks, is_active)
         VALUES (?, ?, ?, ?, 1)",
    )
    .bind(body.name.trim())
    .bind(body.price)
    .bind(body.total_sessions)
    .bind(body.duration_weeks)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let package = sqlx::query_as::<_, Package>(
        "SELECT id, name, price, total_sessions, duration_weeks, is_active
         FROM packages WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("package {} created: {}", id, package.name);
    Ok(Json(ApiResponse::success(package)))
}

/// GET /api/admin/packages — includes inactive ones.
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Package>>>, ApiError> {
    require_admin(&headers, &state.auth_secret)?;

    let packages = sqlx::query_as::<_, Package>(
        "SELECT id, name, price, total_sessions, duration_weeks, is_active
         FROM packages ORDER BY id ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(packages)))
}
