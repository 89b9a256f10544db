//! Error types for Subgate Web
//!
//! Each component owns a `thiserror` enum. The crate-level [`Error`] covers
//! service assembly ([`crate::handlers::AppState::from_config`]), and
//! [`ApiError`] is the HTTP-facing type that renders the wire error codes
//! (`validation_error`, `conflict`, ...).

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use crate::store::format_timestamp;

/// The main error type for Subgate Web operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Subscription store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is absent or blank
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting is present but unusable
    #[error("Invalid setting {field}: {message}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Subscription store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A pending write was refused because an unexpired subscription exists
    #[error("Subscription already active until {}", format_timestamp(expires_at))]
    Conflict {
        /// Expiry of the subscription that blocked the write
        expires_at: DateTime<Utc>,
    },

    /// The storage backend failed
    #[error("Storage backend failure: {0}")]
    Backend(String),

    /// A persisted value could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Payment gateway errors (`gateway_error` on the wire)
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The processor could not be reached
    #[error("Gateway unreachable: {0}")]
    Transport(String),

    /// The processor answered with a non-success HTTP status
    #[error("Gateway returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Upstream diagnostic payload
        details: Option<serde_json::Value>,
    },

    /// The processor answered but the payload is missing required fields
    #[error("Malformed gateway response: {message}")]
    Malformed {
        /// What was missing or unreadable
        message: String,
        /// Upstream payload as received
        details: Option<serde_json::Value>,
    },
}

impl GatewayError {
    /// Upstream diagnostic payload, when the processor sent one
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            GatewayError::Transport(_) => None,
            GatewayError::Status { details, .. } | GatewayError::Malformed { details, .. } => {
                details.as_ref()
            }
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// Webhook signature failures (`auth_error` on the wire)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// No signature header on the request
    #[error("Missing signature header")]
    Missing,

    /// Header is not valid hex
    #[error("Signature header is not valid hex")]
    InvalidEncoding,

    /// Digest does not match the body
    #[error("Signature mismatch")]
    Mismatch,
}

/// Reasons the reconciliation engine refuses a verified payment
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Processor-reported amount differs from the configured price
    #[error("Amount mismatch: expected {expected}, processor reported {reported}")]
    AmountMismatch {
        /// Configured price in minor units
        expected: u64,
        /// Amount reported by the processor in minor units
        reported: u64,
    },

    /// Event metadata lacks email, deviceId or appId
    #[error("Payment metadata is missing email, deviceId or appId")]
    IncompleteMetadata,

    /// The reference was already applied and the window it paid for is over
    #[error("Reference already applied; subscription expired at {}", format_timestamp(expired_at))]
    ExpiredReference {
        /// End of the window this reference paid for
        expired_at: DateTime<Utc>,
    },

    /// The store refused or failed the write
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Wire code for client-facing rejections
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::AmountMismatch { .. } => "amount_mismatch",
            ReconcileError::IncompleteMetadata => "incomplete_metadata",
            ReconcileError::ExpiredReference { .. } => "expired_reference",
            ReconcileError::Store(_) => "internal_error",
        }
    }

    /// Whether this is a business rejection rather than an infrastructure failure
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ReconcileError::Store(_))
    }
}

/// Webhook pipeline errors after authentication
#[derive(Error, Debug)]
pub enum WebhookError {
    /// The processing queue is at capacity
    #[error("Webhook queue is full")]
    QueueFull,

    /// The background processor has shut down
    #[error("Webhook processor is not running")]
    QueueClosed,

    /// Authenticated payload could not be decoded
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Reconciliation failed
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Processing exceeded its time budget
    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),
}

/// HTTP-facing error with the wire taxonomy
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed request fields (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate pay attempt against an active subscription (409)
    #[error("Subscription already active until {}", format_timestamp(expires_at))]
    Conflict {
        /// Current expiry of the active subscription
        expires_at: DateTime<Utc>,
    },

    /// Processor unreachable or malformed response (500)
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Webhook signature rejected (403)
    #[error("Webhook authentication failed: {0}")]
    Auth(#[from] SignatureError),

    /// Store failure; details are logged, not exposed (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Conflict { .. } => "conflict",
            ApiError::Gateway(_) => "gateway_error",
            ApiError::Auth(_) => "auth_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Gateway(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { expires_at } => ApiError::Conflict { expires_at },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Validation(message) => json!({
                "ok": false,
                "error": self.code(),
                "message": message,
            }),
            ApiError::Conflict { expires_at } => json!({
                "ok": false,
                "error": self.code(),
                "expiresAt": format_timestamp(expires_at),
            }),
            ApiError::Gateway(err) => json!({
                "ok": false,
                "error": self.code(),
                "details": err.details().cloned().unwrap_or_else(|| json!({ "message": err.to_string() })),
            }),
            ApiError::Auth(_) | ApiError::Internal(_) => json!({
                "ok": false,
                "error": self.code(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for Subgate Web operations
pub type Result<T> = std::result::Result<T, Error>;
