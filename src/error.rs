// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use crate::services::{GeofenceError, PresenceError, ProjectionError, SessionError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid area: {0}")]
    InvalidArea(String),

    #[error("You can't add yourself as a friend")]
    SelfReference,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::InvalidArea(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_area", Some(msg.clone()))
            }
            AppError::SelfReference => (
                StatusCode::BAD_REQUEST,
                "self_reference",
                Some(self.to_string()),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                (StatusCode::BAD_GATEWAY, "store_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<GeofenceError> for AppError {
    fn from(err: GeofenceError) -> Self {
        match err {
            GeofenceError::InvalidArea(msg) => AppError::InvalidArea(msg),
            GeofenceError::NotAuthoring
            | GeofenceError::AwaitingName
            | GeofenceError::NotClosed => {
                AppError::Conflict(err.to_string())
            }
            GeofenceError::UnknownArea(id) => AppError::NotFound(format!("area {}", id)),
            GeofenceError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<PresenceError> for AppError {
    fn from(err: PresenceError) -> Self {
        match err {
            PresenceError::NotFound(email) => AppError::NotFound(format!("user {}", email)),
            PresenceError::SelfReference => AppError::SelfReference,
            PresenceError::NotAuthenticated => AppError::Unauthorized,
            PresenceError::EmptyArea(id) => AppError::InvalidArea(format!("area {} has no vertices", id)),
            PresenceError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<ProjectionError> for AppError {
    fn from(err: ProjectionError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Geofence(e) => e.into(),
            SessionError::Presence(e) => e.into(),
            SessionError::Projection(e) => e.into(),
            SessionError::WrongPasscode | SessionError::DeveloperLocked => {
                AppError::Forbidden(err.to_string())
            }
            SessionError::Closed => AppError::Conflict(err.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
