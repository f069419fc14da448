//! Outbound calls to the payment and notification collaborators.
//!
//! Both are decoupled from booking state: a scheduling write never waits on or
//! rolls back for a collaborator. Refunds that fail stay `refund_status =
//! 'pending'` and are retried by the background sweep; notifications are pure
//! fire-and-forget.

use sqlx::SqlitePool;

use crate::AppState;

/// Ask the payment collaborator to execute a refund.
///
/// Idempotent on the collaborator side by booking id, so the retry sweep can
/// safely re-send.
pub async fn request_refund(
    payments_url: &str,
    payments_api_key: &str,
    booking_id: i64,
    amount: i64,
) -> anyhow::Result<()> {
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "booking_id": booking_id,
        "amount": amount,
    });

    let resp = client
        .post(format!("{}/refunds", payments_url))
        .bearer_auth(payments_api_key)
        .header("Idempotency-Key", format!("refund-{}", booking_id))
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        tracing::error!("refund request failed: {} - {}", status, text);
        anyhow::bail!("payment collaborator error: {}", status);
    }

    tracing::info!("refund accepted for booking {}", booking_id);
    Ok(())
}

/// Best-effort notification send. Failures are logged and dropped.
pub async fn notify(notify_url: &str, user_id: i64, kind: &str, payload: serde_json::Value) {
    if notify_url.is_empty() {
        return;
    }
    let client = reqwest::Client::new();
    if let Err(e) = client
        .post(format!("{}/notifications", notify_url))
        .json(&serde_json::json!({
            "user_id": user_id,
            "kind": kind,
            "payload": payload,
        }))
        .send()
        .await
    {
        tracing::warn!("notification send failed (kind={}): {}", kind, e);
    }
}

/// Spawn a notification without blocking the request path.
pub fn notify_detached(state: &AppState, user_id: i64, kind: &'static str, payload: serde_json::Value) {
    let url = state.notify_url.clone();
    tokio::spawn(async move {
        notify(&url, user_id, kind, payload).await;
    });
}

/// Execute the refund for a just-cancelled booking and record the outcome.
///
/// Called after the cancel transition has committed. On collaborator failure
/// the booking keeps `refund_status = 'pending'` for the retry sweep.
pub async fn settle_refund(state: &AppState, booking_id: i64, amount: i64) {
    if amount <= 0 {
        return;
    }
    if state.payments_url.is_empty() {
        tracing::warn!(
            "refund for booking {} left pending: payment collaborator not configured",
            booking_id
        );
        return;
    }

    match request_refund(&state.payments_url, &state.payments_api_key, booking_id, amount).await {
        Ok(()) => {
            mark_refund(&state.db, booking_id, "completed").await;
        }
        Err(e) => {
            tracing::error!("refund for booking {} failed, will retry: {}", booking_id, e);
        }
    }
}

/// Retry refunds that previous attempts failed to deliver.
/// Runs from a background task every few minutes.
pub async fn retry_pending_refunds(
    db: &SqlitePool,
    payments_url: &str,
    payments_api_key: &str,
) {
    if payments_url.is_empty() {
        return;
    }

    let pending: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT id, refund_amount FROM bookings
         WHERE refund_status = 'pending' AND refund_amount > 0",
    )
    .fetch_all(db)
    .await
    .unwrap_or_default();

    for (booking_id, amount) in pending {
        tracing::info!("retrying refund for booking {}", booking_id);
        if request_refund(payments_url, payments_api_key, booking_id, amount)
            .await
            .is_ok()
        {
            mark_refund(db, booking_id, "completed").await;
        }
    }
}

async fn mark_refund(db: &SqlitePool, booking_id: i64, status: &str) {
    if let Err(e) = sqlx::query("UPDATE bookings SET refund_status = ? WHERE id = ?")
        .bind(status)
        .bind(booking_id)
        .execute(db)
        .await
    {
        tracing::error!(
            "failed to update refund_status for booking {}: {}",
            booking_id,
            e
        );
    }
}
