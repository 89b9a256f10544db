//! Client verification poll.
//!
//! Also hosts the verify-then-reconcile step shared with the browser
//! callback, so both channels apply exactly the same policy.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ReconcileError};
use crate::handlers::AppState;
use crate::reconcile::{Activation, Channel, VerifiedPayment};
use crate::store::format_timestamp;

/// What the processor and the engine made of a reference
#[derive(Debug)]
pub enum PaymentCheck {
    /// Payment applied
    Activated(Activation),
    /// Processor does not report the transaction as paid
    NotSuccess {
        /// Status reported by the processor
        status: String,
    },
    /// Paid, but refused by the reconciliation engine
    Rejected(ReconcileError),
}

/// Verify `reference` with the processor and reconcile it if paid.
///
/// Gateway failures and store failures are `Err`; business outcomes are
/// variants of [`PaymentCheck`].
pub async fn verify_and_reconcile(
    state: &AppState,
    reference: &str,
    channel: Channel,
) -> Result<PaymentCheck, ApiError> {
    let transaction = state
        .gateway
        .verify_transaction(reference)
        .await
        .map_err(|e| {
            state.metrics.record_gateway_error();
            warn!(
                reference = %reference,
                channel = %channel,
                error = %e,
                "Paystack verification failed"
            );
            ApiError::from(e)
        })?;

    if !transaction.is_success() {
        info!(
            reference = %reference,
            channel = %channel,
            status = %transaction.status,
            "Transaction not successful"
        );
        return Ok(PaymentCheck::NotSuccess {
            status: transaction.status,
        });
    }

    let payment = VerifiedPayment::from(transaction);
    match state
        .reconciler
        .record_verified_payment(&payment, channel)
        .await
    {
        Ok(activation) => Ok(PaymentCheck::Activated(activation)),
        Err(ReconcileError::Store(e)) => Err(e.into()),
        Err(rejection) => Ok(PaymentCheck::Rejected(rejection)),
    }
}

/// Verify response: `{ok:true, expiresAt}` or `{ok:false, error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the subscription is now active
    pub ok: bool,
    /// New expiry on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Rejection code on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    fn activated(activation: &Activation) -> Self {
        Self {
            ok: true,
            expires_at: Some(format_timestamp(&activation.expires_at)),
            error: None,
        }
    }

    fn failed(code: &str) -> Self {
        Self {
            ok: false,
            expires_at: None,
            error: Some(code.to_string()),
        }
    }
}

impl From<&PaymentCheck> for VerifyResponse {
    fn from(check: &PaymentCheck) -> Self {
        match check {
            PaymentCheck::Activated(activation) => Self::activated(activation),
            PaymentCheck::NotSuccess { .. } => Self::failed("not_success"),
            PaymentCheck::Rejected(e) => Self::failed(e.code()),
        }
    }
}

/// Verify a payment on behalf of the client app.
///
/// # Route
/// `GET /verify/:reference`
///
/// # Response
/// - `200 OK` - `{ok:true, expiresAt}` or `{ok:false, error}` with `error` one
///   of `not_success`, `amount_mismatch`, `incomplete_metadata`,
///   `expired_reference`
/// - `500 Internal Server Error` - `gateway_error` with upstream details
#[instrument(skip_all)]
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ApiError::Validation("reference required".to_string()));
    }

    let check = verify_and_reconcile(&state, reference, Channel::Verify).await?;
    Ok(Json(VerifyResponse::from(&check)))
}
