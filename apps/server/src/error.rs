use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::ApiResponse;
use crate::scheduling::policy::PolicyDenial;

/// Error taxonomy for every scheduling operation.
///
/// All variants are computed locally and returned to the caller as-is; none of
/// them is retried server-side. Collaborator failures (refund, notification)
/// never surface through this type — they are logged and retried out-of-band.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input, or a referenced entity is missing/inactive.
    Validation(String),
    /// Requested slot is occupied, or a recurring batch has unavailable dates.
    Conflict {
        message: String,
        unavailable_dates: Vec<String>,
    },
    /// A policy rule blocked the operation (notice window, reschedule cap).
    /// `detail` carries the rule context for the caller.
    PolicyViolation {
        message: String,
        detail: serde_json::Value,
    },
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Caller does not own the booking/trainer resource.
    Forbidden(String),
    NotFound(String),
    Internal,
}

impl ApiError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            unavailable_dates: Vec::new(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::PolicyViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Conflict {
                message,
                unavailable_dates,
            } if !unavailable_dates.is_empty() => ApiResponse {
                ok: false,
                data: Some(json!({ "unavailable_dates": unavailable_dates })),
                error: Some(message),
            },
            ApiError::PolicyViolation { message, detail } => ApiResponse {
                ok: false,
                data: Some(detail),
                error: Some(message),
            },
            ApiError::Conflict { message, .. } => ApiResponse::error(message),
            ApiError::Validation(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => ApiResponse::error(msg),
            ApiError::Internal => ApiResponse::error("Internal server error"),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PolicyDenial> for ApiError {
    fn from(denial: PolicyDenial) -> Self {
        match denial {
            PolicyDenial::TooLate { hours_before } => ApiError::PolicyViolation {
                message: "Too close to the session".into(),
                detail: json!({ "hours_before": hours_before }),
            },
            PolicyDenial::RescheduleLimit { count, max } => ApiError::PolicyViolation {
                message: "Reschedule limit reached".into(),
                detail: json!({ "reschedule_count": count, "max_reschedules": max }),
            },
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return ApiError::NotFound("Not found".into());
        }
        if let Some(db_err) = err.as_database_error() {
            // The partial unique index over active (trainer, date, time) slots
            if db_err.is_unique_violation() {
                return ApiError::conflict("trainer_unavailable");
            }
        }
        tracing::error!("database error: {}", err);
        ApiError::Internal
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::PolicyViolation {
                message: "x".into(),
                detail: json!({})
            }
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_too_late_denial_maps_to_policy_violation() {
        let err = ApiError::from(PolicyDenial::TooLate { hours_before: 3.5 });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let ApiError::PolicyViolation { detail, .. } = err else {
            panic!("expected policy violation");
        };
        assert_eq!(detail["hours_before"], 3.5);
    }

    #[test]
    fn test_reschedule_limit_denial_maps_to_policy_violation() {
        let err = ApiError::from(PolicyDenial::RescheduleLimit { count: 3, max: 3 });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let ApiError::PolicyViolation { detail, .. } = err else {
            panic!("expected policy violation");
        };
        assert_eq!(detail["reschedule_count"], 3);
        assert_eq!(detail["max_reschedules"], 3);
    }
}
