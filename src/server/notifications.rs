//! Inbound notification endpoint (consumer side).
//!
//! Validates the envelope's shape, maps `subscriptionRef` to a local mirror,
//! queues the envelope on that mirror's worker and returns 202 Accepted.
//! Reconciliation happens afterwards, off the request.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, warn};

use super::AppState;
use super::error::ServerError;
use crate::notification::NotificationEnvelope;

/// Notification handler.
///
/// # Response
///
/// - 202 Accepted: queued for reconciliation
/// - 400 Bad Request: not a valid notification envelope
/// - 404 Not Found: `subscriptionRef` is not tracked here
pub async fn notification_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ServerError> {
    let envelope = NotificationEnvelope::from_slice(&body).inspect_err(|e| {
        warn!(error = %e, "rejected malformed notification");
    })?;

    let mirror = app_state
        .reconciler()
        .find_by_remote(&envelope.subscription_ref)
        .ok_or_else(|| ServerError::UnknownSubscriptionRef(envelope.subscription_ref.clone()))?;

    debug!(
        subscription_id = %mirror.id,
        kind = %envelope.kind,
        position = %envelope.position(),
        "received notification"
    );

    app_state.inbound().dispatch(mirror.id, envelope).await?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
