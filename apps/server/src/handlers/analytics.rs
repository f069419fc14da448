use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::require_identity;
use crate::error::ApiError;
use crate::models::*;
use crate::scheduling::analytics;
use crate::scheduling::time::parse_date;
use crate::AppState;

fn parse_range(query: &RangeQuery) -> Result<(NaiveDate, NaiveDate), ApiError> {
    let from = parse_date(&query.from)
        .ok_or_else(|| ApiError::Validation("Invalid 'from' date".into()))?;
    let to =
        parse_date(&query.to).ok_or_else(|| ApiError::Validation("Invalid 'to' date".into()))?;
    if to < from {
        return Err(ApiError::Validation("'to' date before 'from' date".into()));
    }
    Ok((from, to))
}

fn require_trainer_view(identity: &Identity, trainer_id: i64) -> Result<(), ApiError> {
    let allowed = identity.role == Role::Admin
        || (identity.role == Role::Trainer && identity.trainer_id == Some(trainer_id));
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not your analytics".into()))
    }
}

/// Distinct clients with a non-cancelled booking in the period.
async fn clients_in_period(
    db: &sqlx::SqlitePool,
    trainer_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HashSet<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT client_id FROM bookings
         WHERE trainer_id = ? AND session_date BETWEEN ? AND ?
           AND status != 'cancelled'",
    )
    .bind(trainer_id)
    .bind(from.format("%Y-%m-%d").to_string())
    .bind(to.format("%Y-%m-%d").to_string())
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// GET /api/analytics/trainers/:id/utilization?from=..&to=..
pub async fn trainer_utilization(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trainer_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<ApiResponse<UtilizationResponse>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    require_trainer_view(&identity, trainer_id)?;
    let (from, to) = parse_range(&query)?;

    let schedule = sqlx::query_as::<_, AvailabilityDay>(
        "SELECT id, trainer_id, weekday, is_available, start_time, end_time
         FROM trainer_availability WHERE trainer_id = ?",
    )
    .bind(trainer_id)
    .fetch_all(&state.db)
    .await?;

    let blackout_rows: Vec<(String,)> = sqlx::query_as(
        "SELECT date FROM blackout_dates WHERE trainer_id = ? AND date BETWEEN ? AND ?",
    )
    .bind(trainer_id)
    .bind(&query.from)
    .bind(&query.to)
    .fetch_all(&state.db)
    .await?;
    let blackouts: HashSet<NaiveDate> = blackout_rows
        .iter()
        .filter_map(|(d,)| parse_date(d))
        .collect();

    let durations: Vec<(i64,)> = sqlx::query_as(
        "SELECT duration_min FROM bookings
         WHERE trainer_id = ? AND session_date BETWEEN ? AND ?
           AND status IN ('confirmed', 'completed')",
    )
    .bind(trainer_id)
    .bind(&query.from)
    .bind(&query.to)
    .fetch_all(&state.db)
    .await?;
    let durations: Vec<i64> = durations.into_iter().map(|(d,)| d).collect();

    let available = analytics::available_hours(&schedule, &blackouts, from, to);
    let booked = analytics::booked_hours(&durations);

    Ok(Json(ApiResponse::success(UtilizationResponse {
        trainer_id,
        from: query.from,
        to: query.to,
        available_hours: available,
        booked_hours: booked,
        utilization: analytics::utilization(booked, available),
    })))
}

/// GET /api/analytics/clients/:id/streak — completed-session streaks.
pub async fn client_streak(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<i64>,
) -> Result<Json<ApiResponse<StreakResponse>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    let allowed = identity.role == Role::Admin
        || (identity.role == Role::Client && identity.client_id == Some(client_id));
    if !allowed {
        return Err(ApiError::Forbidden("Not your analytics".into()));
    }

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT session_date FROM bookings
         WHERE client_id = ? AND status = 'completed'
         ORDER BY session_date DESC",
    )
    .bind(client_id)
    .fetch_all(&state.db)
    .await?;
    let dates: Vec<NaiveDate> = rows.iter().filter_map(|(d,)| parse_date(d)).collect();

    let result = analytics::streaks(&dates, Utc::now().date_naive());

    Ok(Json(ApiResponse::success(StreakResponse {
        client_id,
        current: result.current,
        longest: result.longest,
    })))
}

/// GET /api/analytics/trainers/:id/retention?from=..&to=..
pub async fn trainer_retention(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(trainer_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<ApiResponse<RetentionResponse>>, ApiError> {
    let identity = require_identity(&headers, &state.auth_secret)?;
    require_trainer_view(&identity, trainer_id)?;
    let (from, to) = parse_range(&query)?;

    let (prev_from, prev_to) = analytics::previous_period(from, to);
    let previous = clients_in_period(&state.db, trainer_id, prev_from, prev_to).await?;
    let current = clients_in_period(&state.db, trainer_id, from, to).await?;

    let result = analytics::retention(&previous, &current);

    Ok(Json(ApiResponse::success(RetentionResponse {
        trainer_id,
        from: query.from,
        to: query.to,
        retained: result.retained,
        lost: result.lost,
        new: result.new,
    })))
}
