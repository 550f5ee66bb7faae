//! Error types for the equipment inventory

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::equipment::EquipmentField;

/// Stable numeric error codes carried in every error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    TransportFailure = 3,
    NoSuchEquipment = 5,
    BadValue = 18,
    MalformedData = 20,
}

/// Failure talking to the remote database (subscription or write)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("subscription stream failed: {0}")]
    Stream(String),

    #[error("remote cancelled the subscription: {0}")]
    Cancelled(String),

    #[error("timed out waiting for the remote")]
    Timeout,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// A value read from the remote did not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed data at {path}: {reason}")]
pub struct DecodeError {
    pub path: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Field → message map produced by draft validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<EquipmentField, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message for a field wins.
    pub fn add(&mut self, field: EquipmentField, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: EquipmentField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: EquipmentField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Convert into a result: `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, msg)| format!("{}: {}", field.wire_name(), msg))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Remote database error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Per-field validation messages, present on validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object, nullable)]
    pub fields: Option<FieldErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut fields = None;
        let (status, code, message) = match self {
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchEquipment, msg),
            AppError::Validation(errors) => {
                let msg = errors.to_string();
                fields = Some(errors);
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg)
            }
            AppError::Transport(e) => {
                tracing::error!("Remote database error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::TransportFailure,
                    "Could not reach the equipment database. Please try again.".to_string(),
                )
            }
            AppError::Decode(e) => {
                tracing::warn!("Decode error: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::MalformedData, e.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            fields,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
