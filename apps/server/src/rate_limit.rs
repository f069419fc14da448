use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Configuration ──

/// Configuration for a single rate limit tier.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed within the sliding window.
    pub max_requests: u32,
    /// Duration of the sliding window.
    pub window: Duration,
}

#[derive(Debug)]
struct Tier {
    config: RateLimitConfig,
    /// Request timestamps per client IP.
    hits: DashMap<IpAddr, Vec<Instant>>,
}

// ── Core Rate Limiter ──

/// In-memory per-IP rate limiter using sliding window counters.
///
/// Each tier (e.g. "public", "booking") has its own config and tracking map.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tiers: Arc<DashMap<&'static str, Tier>>,
}

impl RateLimiter {
    /// Create a new empty rate limiter. Call `add_tier()` to configure.
    pub fn new() -> Self {
        Self {
            tiers: Arc::new(DashMap::new()),
        }
    }

    /// Register a named tier with its configuration.
    pub fn add_tier(&self, name: &'static str, config: RateLimitConfig) {
        self.tiers.insert(
            name,
            Tier {
                config,
                hits: DashMap::new(),
            },
        );
    }

    /// Bind a tier name for use as middleware state on a router group.
    pub fn tier(&self, name: &'static str) -> TierLimiter {
        TierLimiter {
            limiter: self.clone(),
            tier: name,
        }
    }

    /// Check if a request from `ip` is allowed under the given tier.
    ///
    /// Returns `Ok(())` if allowed, `Err(retry_after_secs)` if rate limited.
    pub fn check(&self, tier: &'static str, ip: IpAddr) -> Result<(), u64> {
        let tier = self.tiers.get(tier).expect("unknown rate limit tier");
        let now = Instant::now();
        let window_start = now - tier.config.window;

        let mut entry = tier.hits.entry(ip).or_insert_with(Vec::new);

        // Evict expired timestamps
        entry.retain(|t| *t > window_start);

        if entry.len() >= tier.config.max_requests as usize {
            // Time until the oldest request expires from the window
            let oldest = entry[0];
            let retry_after = (oldest + tier.config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Remove stale entries (older than 2× window) from all tiers.
    /// Call periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for tier in self.tiers.iter() {
            let cutoff = tier.config.window * 2;
            tier.hits.retain(|_ip, timestamps| {
                timestamps.retain(|t| now.duration_since(*t) < cutoff);
                !timestamps.is_empty()
            });
        }
    }
}

// ── Middleware ──

/// A rate limiter bound to one tier; state for the shared middleware fn.
#[derive(Clone)]
pub struct TierLimiter {
    limiter: RateLimiter,
    tier: &'static str,
}

/// The single middleware used by every router group; the tier comes from state.
pub async fn enforce(
    State(scoped): State<TierLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    scoped
        .limiter
        .check(scoped.tier, ip)
        .map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Extract client IP from X-Forwarded-For (reverse proxy) or ConnectInfo.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| "127.0.0.1".parse().unwrap())
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn limiter_with(max_requests: u32, window: Duration) -> RateLimiter {
        let limiter = RateLimiter::new();
        limiter.add_tier(
            "test",
            RateLimitConfig {
                max_requests,
                window,
            },
        );
        limiter
    }

    #[test]
    fn test_allows_requests_under_limit() {
        let limiter = limiter_with(3, Duration::from_secs(60));
        let ip = test_ip(1);
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_ok());
    }

    #[test]
    fn test_rejects_over_limit() {
        let limiter = limiter_with(2, Duration::from_secs(60));
        let ip = test_ip(1);
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_err());
    }

    #[test]
    fn test_returns_retry_after() {
        let limiter = limiter_with(1, Duration::from_secs(60));
        let ip = test_ip(1);
        limiter.check("test", ip).unwrap();
        let retry_after = limiter.check("test", ip).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn test_different_ips_independent() {
        let limiter = limiter_with(1, Duration::from_secs(60));
        assert!(limiter.check("test", test_ip(1)).is_ok());
        assert!(limiter.check("test", test_ip(1)).is_err());
        assert!(limiter.check("test", test_ip(2)).is_ok());
    }

    #[test]
    fn test_different_tiers_independent() {
        let limiter = RateLimiter::new();
        for name in ["tier_a", "tier_b"] {
            limiter.add_tier(
                name,
                RateLimitConfig {
                    max_requests: 1,
                    window: Duration::from_secs(60),
                },
            );
        }
        let ip = test_ip(1);
        assert!(limiter.check("tier_a", ip).is_ok());
        assert!(limiter.check("tier_a", ip).is_err());
        assert!(limiter.check("tier_b", ip).is_ok());
    }

    #[test]
    fn test_window_expiry_allows_again() {
        let limiter = limiter_with(1, Duration::from_millis(100));
        let ip = test_ip(1);
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_err());

        sleep(Duration::from_millis(150));

        assert!(limiter.check("test", ip).is_ok());
    }

    #[test]
    fn test_cleanup_removes_stale_entries() {
        let limiter = limiter_with(10, Duration::from_millis(50));
        let ip = test_ip(1);
        limiter.check("test", ip).unwrap();

        sleep(Duration::from_millis(120)); // > 2× window

        limiter.cleanup();
        assert!(limiter.check("test", ip).is_ok());
    }

    #[test]
    fn test_cleanup_preserves_active_entries() {
        let limiter = limiter_with(2, Duration::from_secs(60));
        let ip = test_ip(1);
        limiter.check("test", ip).unwrap();

        limiter.cleanup();

        limiter.check("test", ip).unwrap();
        assert!(limiter.check("test", ip).is_err());
    }
}
