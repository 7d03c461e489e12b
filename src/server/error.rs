//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::consumer::{DataStoreError, ReconcileError};
use crate::notification::ProtocolError;
use crate::publisher::{PublisherError, StoreError};
use crate::worker::DispatchError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The payload does not have the protocol's shape.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// No local mirror for the envelope's `subscriptionRef`.
    #[error("unknown subscription reference: {0}")]
    UnknownSubscriptionRef(String),

    #[error(transparent)]
    Publisher(#[from] PublisherError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::UnknownSubscriptionRef(_) => StatusCode::NOT_FOUND,
            ServerError::Publisher(e) => match e {
                PublisherError::NotFound(_) | PublisherError::UnknownTopic(_) => StatusCode::NOT_FOUND,
                PublisherError::Store(StoreError::TopicExists(_)) => StatusCode::CONFLICT,
                PublisherError::Store(StoreError::InvalidHeartbeatPeriod | StoreError::MissingCallback) => {
                    StatusCode::BAD_REQUEST
                }
                PublisherError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Reconcile(e) => match e {
                ReconcileError::Unknown(_) => StatusCode::NOT_FOUND,
                ReconcileError::Store(
                    DataStoreError::AlreadyTracked(_) | DataStoreError::DuplicateRemote(_),
                ) => StatusCode::CONFLICT,
                ReconcileError::Store(DataStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Dispatch(DispatchError::Untracked(_)) => StatusCode::NOT_FOUND,
            ServerError::Dispatch(DispatchError::ChannelClosed(_)) => StatusCode::SERVICE_UNAVAILABLE,
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
