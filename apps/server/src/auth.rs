use axum::http::header;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ApiError;
use crate::models::{Identity, Role};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a token before it's considered expired (24 hours).
const MAX_TOKEN_AGE_SECS: i64 = 86400;

/// Sign an identity payload into a token: `hex(payload_json).hex(hmac)`.
///
/// Issued by the identity service in production; used directly by tests.
pub fn sign_token(identity: &Identity, secret: &str) -> String {
    let payload = serde_json::to_string(identity).expect("identity serializes");
    let encoded = hex::encode(payload.as_bytes());

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(encoded.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    format!("{}.{}", encoded, signature)
}

/// Validates a signed identity token and extracts the caller context.
pub fn validate_token(token: &str, secret: &str) -> Option<Identity> {
    let (encoded, signature) = token.split_once('.')?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(encoded.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != signature {
        tracing::warn!("identity token signature mismatch");
        return None;
    }

    let payload = hex::decode(encoded).ok()?;
    let identity: Identity = serde_json::from_slice(&payload).ok()?;

    // Reject stale tokens (prevent replay)
    let now = chrono::Utc::now().timestamp();
    if (now - identity.issued_at) > MAX_TOKEN_AGE_SECS {
        tracing::warn!(
            "identity token expired: issued_at={}, age={}s",
            identity.issued_at,
            now - identity.issued_at
        );
        return None;
    }

    Some(identity)
}

/// Extract the identity from the Authorization header.
/// Header format: `fsk <token>`
pub fn extract_identity_from_header(auth_header: &str, secret: &str) -> Option<Identity> {
    let token = auth_header.strip_prefix("fsk ")?;
    validate_token(token, secret)
}

/// Helper for handlers: resolve the caller identity or fail with 401.
pub fn require_identity(
    headers: &axum::http::HeaderMap,
    secret: &str,
) -> Result<Identity, ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

    extract_identity_from_header(auth_header, secret)
        .ok_or_else(|| ApiError::Unauthorized("Invalid identity token".into()))
}

/// Helper for admin routes: resolve the caller and require the admin role.
pub fn require_admin(
    headers: &axum::http::HeaderMap,
    secret: &str,
) -> Result<Identity, ApiError> {
    let identity = require_identity(headers, secret)?;
    if identity.role != Role::Admin {
        return Err(ApiError::Forbidden("Admin access required".into()));
    }
    Ok(identity)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn client_identity() -> Identity {
        Identity {
            user_id: 42,
            role: Role::Client,
            trainer_id: None,
            client_id: Some(42),
            issued_at: chrono::Utc::now().timestamp(),
        }
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let token = sign_token(&client_identity(), "secret");
        let identity = validate_token(&token, "secret").unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.role, Role::Client);
        assert_eq!(identity.client_id, Some(42));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_token(&client_identity(), "secret");
        assert!(validate_token(&token, "other").is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign_token(&client_identity(), "secret");
        let (encoded, sig) = token.split_once('.').unwrap();
        let mut bytes = hex::decode(encoded).unwrap();
        // Flip a byte inside the JSON payload
        bytes[10] ^= 1;
        let tampered = format!("{}.{}", hex::encode(bytes), sig);
        assert!(validate_token(&tampered, "secret").is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut identity = client_identity();
        identity.issued_at = chrono::Utc::now().timestamp() - MAX_TOKEN_AGE_SECS - 10;
        let token = sign_token(&identity, "secret");
        assert!(validate_token(&token, "secret").is_none());
    }

    #[test]
    fn test_header_prefix_required() {
        let token = sign_token(&client_identity(), "secret");
        assert!(extract_identity_from_header(&token, "secret").is_none());
        let header = format!("fsk {}", token);
        assert!(extract_identity_from_header(&header, "secret").is_some());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validate_token("not-a-token", "secret").is_none());
        assert!(validate_token("abc.def", "secret").is_none());
    }
}
