use serde::{Deserialize, Serialize};

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub price: i64,
    pub total_sessions: i64,
    pub duration_weeks: i64,
    pub is_active: bool,
}

/// One weekday entry of a trainer's weekly schedule.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvailabilityDay {
    pub id: i64,
    pub trainer_id: i64,
    /// 0 = Monday … 6 = Sunday (chrono's num_days_from_monday).
    pub weekday: i64,
    pub is_available: bool,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlackoutDate {
    pub id: i64,
    pub trainer_id: i64,
    pub date: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    pub client_id: i64,
    pub trainer_id: i64,
    pub package_id: i64,
    pub session_date: String,
    pub session_time: String,
    pub duration_min: i64,
    pub status: String,
    pub amount: i64,
    pub remaining_sessions: i64,
    pub package_end_date: String,
    pub reschedule_count: i64,
    pub recurring_group_id: Option<String>,
    pub location: String,
    pub notes: String,
    pub created_at: String,
    pub cancelled_at: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub refund_amount: Option<i64>,
    pub refund_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RescheduleEvent {
    pub id: i64,
    pub booking_id: i64,
    pub old_date: String,
    pub old_time: String,
    pub new_date: String,
    pub new_time: String,
    pub reason: String,
    pub requested_by: String,
    pub requested_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub booking_id: i64,
    pub date: String,
    pub time: String,
    pub duration_min: i64,
    pub exercises: String,
    pub notes: String,
    pub completed_at: String,
}

// ── Identity ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Trainer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Trainer => "trainer",
            Role::Admin => "admin",
        }
    }
}

/// Authenticated caller context. The scheduler trusts this for ownership checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
    pub trainer_id: Option<i64>,
    pub client_id: Option<i64>,
    pub issued_at: i64,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trainer_id: i64,
    pub package_id: i64,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct RecurringBookingRequest {
    pub trainer_id: i64,
    pub package_id: i64,
    pub start_date: String,
    pub end_date: String,
    /// 0 = Monday … 6 = Sunday.
    pub days_of_week: Vec<u8>,
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBookingRequest {
    pub new_date: String,
    pub new_time: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub exercises: String,
    pub duration_min: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub slot_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleDayUpdate {
    pub weekday: u8,
    pub is_available: bool,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub days: Vec<ScheduleDayUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct AddBlackoutRequest {
    pub date: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub name: String,
    pub price: i64,
    pub total_sessions: i64,
    pub duration_weeks: i64,
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub start_time: String,
    pub end_time: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// False when the trainer does not work that day at all (off day or blackout).
    pub trainer_available: bool,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Serialize)]
pub struct CancelBookingResponse {
    pub booking: Booking,
    pub refund_amount: i64,
}

#[derive(Debug, Serialize)]
pub struct RecurringBookingResponse {
    pub recurring_group_id: String,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Serialize)]
pub struct BookingHistory {
    pub booking: Booking,
    pub reschedules: Vec<RescheduleEvent>,
    pub sessions: Vec<SessionRecord>,
}

#[derive(Debug, Serialize)]
pub struct UtilizationResponse {
    pub trainer_id: i64,
    pub from: String,
    pub to: String,
    pub available_hours: f64,
    pub booked_hours: f64,
    pub utilization: f64,
}

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub client_id: i64,
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Serialize)]
pub struct RetentionResponse {
    pub trainer_id: i64,
    pub from: String,
    pub to: String,
    pub retained: usize,
    pub lost: usize,
    pub new: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
