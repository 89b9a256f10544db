//! Status, health and metrics handlers.
//!
//! - `/status` - subscription status for one identity triple
//! - `/health` - liveness check
//! - `/metrics` - Prometheus text exposition
//!
//! # Example Response
//!
//! ```json
//! { "active": true, "expiresAt": "2025-07-01T12:00:00.000Z" }
//! ```

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::store::{format_timestamp, SubscriptionKey};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always true if responding
    pub ok: bool,
    /// Server time
    pub ts: String,
}

/// Identity triple as sent in query strings and JSON bodies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityParams {
    /// Subscriber email
    pub email: Option<String>,
    /// Device identifier
    pub device_id: Option<String>,
    /// Application identifier
    pub app_id: Option<String>,
}

impl IdentityParams {
    /// Normalized key, or a `validation_error`
    pub fn into_key(self) -> Result<SubscriptionKey, ApiError> {
        SubscriptionKey::from_parts(
            self.email.as_deref(),
            self.device_id.as_deref(),
            self.app_id.as_deref(),
        )
        .ok_or_else(|| ApiError::Validation("email, deviceId, appId required".to_string()))
    }
}

/// Subscription status response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Whether the subscription is live right now
    pub active: bool,
    /// Expiry, present only when active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Health check endpoint handler.
///
/// # Route
/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    Json(HealthResponse {
        ok: true,
        ts: format_timestamp(&Utc::now()),
    })
}

/// Subscription status endpoint handler.
///
/// Read only. A stored `active` flag whose expiry has passed reports
/// `active: false`.
///
/// # Route
/// `GET /status?email=&deviceId=&appId=`
///
/// # Response
/// - `200 OK` - `{active, expiresAt?}`
/// - `400 Bad Request` - a field is missing
#[instrument(skip_all)]
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IdentityParams>,
) -> Result<Json<StatusResponse>, ApiError> {
    let key = params.into_key()?;
    let record = state.store.get(&key).await?;

    let expires_at = record.and_then(|record| record.live_expiry(Utc::now()));
    debug!(subscriber = %key, active = expires_at.is_some(), "Status requested");

    Ok(Json(StatusResponse {
        active: expires_at.is_some(),
        expires_at: expires_at.as_ref().map(format_timestamp),
    }))
}

/// Metrics endpoint handler.
///
/// # Route
/// `GET /metrics`
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus_format(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_params_validation() {
        let params = IdentityParams {
            email: Some("A@B.com".into()),
            device_id: Some("d1".into()),
            app_id: Some("app1".into()),
        };
        assert_eq!(params.into_key().unwrap().email(), "a@b.com");

        let missing = IdentityParams {
            email: Some("a@b.com".into()),
            ..Default::default()
        };
        assert_eq!(missing.into_key().unwrap_err().code(), "validation_error");
    }

    #[test]
    fn test_status_response_omits_expiry_when_inactive() {
        let inactive = serde_json::to_value(StatusResponse {
            active: false,
            expires_at: None,
        })
        .unwrap();
        assert_eq!(inactive, serde_json::json!({ "active": false }));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
