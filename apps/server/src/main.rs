mod alerts;
mod auth;
mod collaborators;
mod db;
mod error;
mod handlers;
mod models;
mod rate_limit;
mod scheduling;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use rate_limit::{RateLimitConfig, RateLimiter};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub auth_secret: String,
    pub payments_url: String,
    pub payments_api_key: String,
    pub notify_url: String,
    pub max_reschedules: i64,
    pub started_at: Instant,
}

/// Pending-refund retry interval (seconds).
const REFUND_RETRY_INTERVAL_SECS: u64 = 300;
/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

/// Optional collaborator base URL; must parse when set.
fn collaborator_url(var: &str) -> String {
    let value = std::env::var(var).unwrap_or_default();
    if !value.is_empty() && url::Url::parse(&value).is_err() {
        panic!("{} must be a valid URL", var);
    }
    value
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Required env vars ──
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:fitsched.db?mode=rwc".into());
    let auth_secret = std::env::var("AUTH_SECRET").expect("AUTH_SECRET must be set");

    // ── Tracing: console + optional webhook error alerts ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    let alert_webhook_url = collaborator_url("ALERT_WEBHOOK_URL");
    if !alert_webhook_url.is_empty() {
        registry.with(alerts::AlertLayer::new(alert_webhook_url)).init();
    } else {
        registry.init();
    }

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());

    // ── Optional env vars ──
    let payments_url = collaborator_url("PAYMENTS_URL");
    let payments_api_key = std::env::var("PAYMENTS_API_KEY").unwrap_or_default();
    let notify_url = collaborator_url("NOTIFY_URL");
    let webapp_url = std::env::var("WEBAPP_URL").unwrap_or_default();
    let max_reschedules: i64 = std::env::var("MAX_RESCHEDULES")
        .unwrap_or_else(|_| "3".into())
        .parse()
        .expect("MAX_RESCHEDULES must be a number");

    if payments_url.is_empty() {
        tracing::warn!("PAYMENTS_URL not set — refunds will stay pending");
    }
    if notify_url.is_empty() {
        tracing::warn!("NOTIFY_URL not set — notifications disabled");
    }

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        auth_secret,
        payments_url: payments_url.clone(),
        payments_api_key: payments_api_key.clone(),
        notify_url,
        max_reschedules,
        started_at: Instant::now(),
    });

    // ── Background task: retry pending refunds ──
    let refund_db = state.db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            REFUND_RETRY_INTERVAL_SECS,
        ));
        loop {
            interval.tick().await;
            collaborators::retry_pending_refunds(&refund_db, &payments_url, &payments_api_key)
                .await;
        }
    });

    // ── Rate limiter ──
    let rate_limiter = RateLimiter::new();
    rate_limiter.add_tier(
        "public",
        RateLimitConfig {
            max_requests: 60,
            window: Duration::from_secs(60),
        },
    );
    rate_limiter.add_tier(
        "auth",
        RateLimitConfig {
            max_requests: 30,
            window: Duration::from_secs(60),
        },
    );
    rate_limiter.add_tier(
        "booking",
        RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(300),
        },
    );
    rate_limiter.add_tier(
        "admin",
        RateLimitConfig {
            max_requests: 120,
            window: Duration::from_secs(60),
        },
    );

    // ── Background task: cleanup stale rate limit entries ──
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = if !webapp_url.is_empty() {
        let origin: axum::http::HeaderValue =
            webapp_url.parse().expect("WEBAPP_URL must be a valid URL");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (5 groups with per-group rate limits) ──

    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: read-only schedule lookups (no auth, 60 req/min)
    let public_routes = Router::new()
        .route(
            "/api/trainers/{id}/availability",
            get(handlers::availability::get_availability),
        )
        .route(
            "/api/trainers/{id}/schedule",
            get(handlers::availability::get_schedule),
        )
        .layer(from_fn_with_state(
            rate_limiter.tier("public"),
            rate_limit::enforce,
        ));

    // 3. Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::booking::create_booking))
        .route(
            "/api/bookings/recurring",
            post(handlers::booking::create_recurring_booking),
        )
        .layer(from_fn_with_state(
            rate_limiter.tier("booking"),
            rate_limit::enforce,
        ));

    // 4. Auth: authenticated lifecycle endpoints (30 req/min)
    let auth_routes = Router::new()
        .route("/api/bookings/my", get(handlers::booking::my_bookings))
        .route(
            "/api/bookings/{id}/confirm",
            post(handlers::booking::confirm_booking),
        )
        .route(
            "/api/bookings/{id}/cancel",
            post(handlers::booking::cancel_booking),
        )
        .route(
            "/api/bookings/{id}/reschedule",
            post(handlers::booking::reschedule_booking),
        )
        .route(
            "/api/bookings/{id}/complete",
            post(handlers::session::complete_session),
        )
        .route(
            "/api/bookings/{id}/history",
            get(handlers::session::get_history),
        )
        .layer(from_fn_with_state(
            rate_limiter.tier("auth"),
            rate_limit::enforce,
        ));

    // 5. Admin + analytics (120 req/min)
    let admin_routes = Router::new()
        .route(
            "/api/admin/trainers/{id}/schedule",
            put(handlers::admin::update_schedule),
        )
        .route(
            "/api/admin/trainers/{id}/blackouts",
            post(handlers::admin::add_blackout),
        )
        .route(
            "/api/admin/trainers/{id}/blackouts/{date}",
            delete(handlers::admin::remove_blackout),
        )
        .route("/api/admin/packages", post(handlers::admin::create_package))
        .route("/api/admin/packages", get(handlers::admin::list_packages))
        .route(
            "/api/analytics/trainers/{id}/utilization",
            get(handlers::analytics::trainer_utilization),
        )
        .route(
            "/api/analytics/clients/{id}/streak",
            get(handlers::analytics::client_streak),
        )
        .route(
            "/api/analytics/trainers/{id}/retention",
            get(handlers::analytics::trainer_retention),
        )
        .layer(from_fn_with_state(
            rate_limiter.tier("admin"),
            rate_limit::enforce,
        ));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(auth_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("FitSched server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
