//! Payment initiation handler.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, StoreError};
use crate::handlers::status::IdentityParams;
use crate::handlers::AppState;
use crate::paystack::{InitializeRequest, TransactionMetadata};

/// Successful pay response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayResponse {
    /// Always true
    pub ok: bool,
    /// Hosted checkout page
    pub authorization_url: String,
    /// Processor reference of the new transaction
    pub reference: String,
}

/// Start a subscription payment.
///
/// Refuses with `conflict` while a subscription is live; otherwise
/// initializes a transaction with Paystack and records it as pending.
///
/// # Route
/// `POST /pay` with `{email, deviceId, appId}`
///
/// # Response
/// - `200 OK` - `{ok, authorizationUrl, reference}`
/// - `400 Bad Request` - missing fields or malformed JSON
/// - `409 Conflict` - subscription already active
/// - `500 Internal Server Error` - `gateway_error` with upstream details
#[instrument(skip_all)]
pub async fn pay_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IdentityParams>, JsonRejection>,
) -> Result<Json<PayResponse>, ApiError> {
    let Json(params) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    let key = params.into_key()?;

    if let Some(expires_at) = state
        .store
        .get(&key)
        .await?
        .and_then(|record| record.live_expiry(Utc::now()))
    {
        state.metrics.record_pay_conflict();
        info!(subscriber = %key, "Pay refused: subscription already active");
        return Err(ApiError::Conflict { expires_at });
    }

    let request = InitializeRequest {
        email: key.email().to_string(),
        amount: state.settings.price_minor_units,
        metadata: TransactionMetadata::for_key(&key, &state.settings.app_tag),
        callback_url: state.settings.callback_url.clone(),
    };

    let initialized = state
        .gateway
        .initialize_transaction(&request)
        .await
        .map_err(|e| {
            state.metrics.record_gateway_error();
            warn!(subscriber = %key, error = %e, "Paystack initialization failed");
            ApiError::from(e)
        })?;

    // An activation may have landed while the gateway call was in flight.
    if let Err(e) = state
        .store
        .upsert_pending(&key, &initialized.reference, Utc::now())
        .await
    {
        if matches!(e, StoreError::Conflict { .. }) {
            state.metrics.record_pay_conflict();
            info!(
                subscriber = %key,
                reference = %initialized.reference,
                "Pending write refused: subscription activated concurrently"
            );
        }
        return Err(e.into());
    }

    state.metrics.record_payment_initiated();
    info!(
        subscriber = %key,
        reference = %initialized.reference,
        "Payment initialized"
    );

    Ok(Json(PayResponse {
        ok: true,
        authorization_url: initialized.authorization_url,
        reference: initialized.reference,
    }))
}
