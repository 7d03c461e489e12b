//! HTTP server for the relay.
//!
//! One process can play both roles of the protocol:
//! - as a publisher it manages topics and subscriptions and answers the
//!   status and range queries consumers use for recovery
//! - as a consumer it accepts notifications on `/notifications` and hands
//!   them to per-subscription workers
//!
//! # Endpoints
//!
//! - `POST /notifications` - inbound notification envelopes (202 Accepted)
//! - `GET|POST /api/v1/topics`
//! - `POST /api/v1/topics/{topic}/changes` - notify a batch of changed references
//! - `GET|POST /api/v1/subscriptions`, `DELETE /api/v1/subscriptions/{id}`
//! - `GET /api/v1/subscriptions/{id}/status` and `/events`
//! - `GET|POST /api/v1/mirrors`, `DELETE /api/v1/mirrors/{id}`
//! - `POST /api/v1/mirrors/{id}/resync`
//! - `GET /health`

use std::sync::Arc;

use crate::consumer::NotificationReconciler;
use crate::publisher::PublisherDeliveryEngine;
use crate::worker::InboundDispatcher;

pub mod error;
pub mod health;
pub mod notifications;
pub mod publisher;
pub mod state;

pub use error::ServerError;
pub use health::health_handler;
pub use notifications::notification_handler;

/// Shared application state, handed to handlers through axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    publisher: Arc<PublisherDeliveryEngine>,
    inbound: Arc<InboundDispatcher>,
}

impl AppState {
    pub fn new(publisher: Arc<PublisherDeliveryEngine>, inbound: Arc<InboundDispatcher>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { publisher, inbound }),
        }
    }

    pub fn publisher(&self) -> &Arc<PublisherDeliveryEngine> {
        &self.inner.publisher
    }

    pub fn inbound(&self) -> &Arc<InboundDispatcher> {
        &self.inner.inbound
    }

    pub fn reconciler(&self) -> &Arc<NotificationReconciler> {
        self.inner.inbound.reconciler()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{delete, get, post};

    axum::Router::new()
        .route("/notifications", post(notification_handler))
        .route(
            "/api/v1/topics",
            get(publisher::list_topics_handler).post(publisher::create_topic_handler),
        )
        .route("/api/v1/topics/{topic}/changes", post(publisher::topic_changes_handler))
        .route(
            "/api/v1/subscriptions",
            get(state::list_subscriptions_handler).post(publisher::subscribe_handler),
        )
        .route("/api/v1/subscriptions/{id}", delete(publisher::unsubscribe_handler))
        .route("/api/v1/subscriptions/{id}/status", get(publisher::status_query_handler))
        .route("/api/v1/subscriptions/{id}/events", get(publisher::event_query_handler))
        .route(
            "/api/v1/mirrors",
            get(state::list_mirrors_handler).post(state::track_handler),
        )
        .route("/api/v1/mirrors/{id}", delete(state::untrack_handler))
        .route("/api/v1/mirrors/{id}/resync", post(state::resync_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
