//! Consumer registration and read-only state inspection.
//!
//! Listings are snapshot reads and may race with in-flight passes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use super::error::ServerError;
use crate::types::{
    EventNumber, Subscription, SubscriptionData, SubscriptionId, SubscriptionStatus, TopicDescriptor,
};

/// Body of `POST /api/v1/mirrors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRequest {
    pub id: SubscriptionId,
    pub remote_id: String,
    pub source: String,
    #[serde(flatten)]
    pub topic: TopicDescriptor,
    #[serde(rename = "heartbeatPeriod")]
    pub heartbeat_period_secs: u64,
    /// Position to start from when attaching to an existing subscription.
    #[serde(default)]
    pub events_received: EventNumber,
    #[serde(default = "default_true")]
    pub liveness_check: bool,
}

fn default_true() -> bool {
    true
}

impl From<MirrorRequest> for SubscriptionData {
    fn from(req: MirrorRequest) -> Self {
        SubscriptionData {
            id: req.id,
            remote_id: req.remote_id,
            source: req.source,
            topic: req.topic,
            events_received: req.events_received,
            status: SubscriptionStatus::Requested,
            last_update: Utc::now(),
            heartbeat_period_secs: req.heartbeat_period_secs,
            liveness_check: req.liveness_check,
        }
    }
}

/// `POST /api/v1/mirrors`: start tracking a remote subscription. 409 on
/// duplicate id or remote id.
pub async fn track_handler(
    State(app_state): State<AppState>,
    Json(request): Json<MirrorRequest>,
) -> Result<(StatusCode, Json<SubscriptionData>), ServerError> {
    let data = SubscriptionData::from(request);
    app_state.reconciler().track(data.clone())?;
    Ok((StatusCode::CREATED, Json(data)))
}

/// `DELETE /api/v1/mirrors/{id}`: stop tracking and retire the worker.
///
/// The mirror goes first so no new worker can be spawned for it afterwards.
pub async fn untrack_handler(
    State(app_state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<StatusCode, ServerError> {
    app_state.reconciler().untrack(id).await?;
    app_state.inbound().remove_worker(id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/mirrors/{id}/resync`: queue a forced resync. 404 if the
/// mirror is not tracked.
pub async fn resync_handler(
    State(app_state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<StatusCode, ServerError> {
    app_state.inbound().request_resync(id).await?;
    info!(subscription_id = %id, "resync requested");
    Ok(StatusCode::ACCEPTED)
}

/// `GET /api/v1/mirrors`.
pub async fn list_mirrors_handler(State(app_state): State<AppState>) -> Json<Vec<SubscriptionData>> {
    Json(app_state.reconciler().mirrors())
}

/// `GET /api/v1/subscriptions`.
pub async fn list_subscriptions_handler(State(app_state): State<AppState>) -> Json<Vec<Subscription>> {
    Json(app_state.publisher().subscriptions())
}
