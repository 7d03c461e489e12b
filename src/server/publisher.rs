//! Publisher REST surface: topics, subscribe/unsubscribe, and the status and
//! range queries consumers use for recovery.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ServerError;
use crate::notification::{EventRange, NotificationEnvelope};
use crate::publisher::NewSubscription;
use crate::types::{SubscriptionId, SubscriptionStatus, Topic, TopicId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub id: SubscriptionId,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicChanges {
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicChangesResponse {
    pub notified: usize,
}

/// `POST /api/v1/topics`. 409 if the id is taken.
pub async fn create_topic_handler(
    State(app_state): State<AppState>,
    Json(topic): Json<Topic>,
) -> Result<(StatusCode, Json<Topic>), ServerError> {
    app_state.publisher().register_topic(topic.clone())?;
    Ok((StatusCode::CREATED, Json(topic)))
}

/// `GET /api/v1/topics`.
pub async fn list_topics_handler(State(app_state): State<AppState>) -> Json<Vec<Topic>> {
    Json(app_state.publisher().topics())
}

/// `POST /api/v1/topics/{topic}/changes`: numbers and sends `references` to
/// every subscription bound to the topic.
pub async fn topic_changes_handler(
    State(app_state): State<AppState>,
    Path(topic): Path<String>,
    Json(changes): Json<TopicChanges>,
) -> Result<Json<TopicChangesResponse>, ServerError> {
    let notified = app_state
        .publisher()
        .notify_topic(&TopicId::new(topic), changes.references)
        .await?;
    Ok(Json(TopicChangesResponse { notified }))
}

/// `POST /api/v1/subscriptions` with `{callback, topic, heartbeatPeriod}`.
///
/// - 201 Created with `{id, status: "requested"}`
/// - 404 if the topic is unknown
/// - 400 for a zero heartbeat period or a blank callback
pub async fn subscribe_handler(
    State(app_state): State<AppState>,
    Json(request): Json<NewSubscription>,
) -> Result<(StatusCode, Json<SubscribeResponse>), ServerError> {
    let subscription = app_state.publisher().subscribe(request)?;
    Ok((
        StatusCode::CREATED,
        Json(SubscribeResponse {
            id: subscription.id,
            status: subscription.status,
        }),
    ))
}

/// `DELETE /api/v1/subscriptions/{id}`: removes the subscription and cancels
/// its heartbeat.
pub async fn unsubscribe_handler(
    State(app_state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<StatusCode, ServerError> {
    app_state.publisher().unsubscribe(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/subscriptions/{id}/status`: a `query-status` envelope.
pub async fn status_query_handler(
    State(app_state): State<AppState>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<NotificationEnvelope>, ServerError> {
    Ok(Json(app_state.publisher().handle_status_query(id)?))
}

/// `GET /api/v1/subscriptions/{id}/events?eventsSinceNumber=&eventsUntilNumber=`:
/// a `query-event` envelope listing the range, ascending.
pub async fn event_query_handler(
    State(app_state): State<AppState>,
    Path(id): Path<SubscriptionId>,
    Query(range): Query<EventRange>,
) -> Result<Json<NotificationEnvelope>, ServerError> {
    Ok(Json(app_state.publisher().handle_event_query(id, range)?))
}
