//! Paystack webhook endpoint.
//!
//! # Key Features
//!
//! - **Raw Body Extraction**: the signature is checked against the exact
//!   bytes received, before any parsing
//! - **Quick Acknowledgment**: returns 200 as soon as the signature is valid
//!   and applies the event on a background task
//!
//! # Endpoint
//!
//! `POST /webhook/paystack` with header `x-paystack-signature`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, info, instrument, warn};

use crate::error::{ApiError, SignatureError};
use crate::handlers::AppState;
use crate::paystack::{PaystackEvent, SIGNATURE_HEADER};

/// Webhook handler
///
/// 1. Extracts the `x-paystack-signature` header
/// 2. Verifies HMAC-SHA512 over the raw body
/// 3. Returns 200 and queues the event for async processing
///
/// Anything that goes wrong after step 2 is logged; the response is still
/// 200 so Paystack's redelivery schedule is not disturbed.
#[instrument(skip_all)]
pub async fn paystack_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let verified = headers
        .get(SIGNATURE_HEADER)
        .ok_or(SignatureError::Missing)
        .and_then(|value| value.to_str().map_err(|_| SignatureError::InvalidEncoding))
        .and_then(|signature| state.verifier.verify(&body, signature));

    if let Err(e) = verified {
        state.metrics.record_webhook_auth_failure();
        warn!(error = %e, "Paystack webhook signature verification failed");
        return ApiError::Auth(e).into_response();
    }

    state.metrics.record_webhook_received();

    match PaystackEvent::from_bytes(&body) {
        Ok(event) => {
            info!(event = %event.event, "Received Paystack webhook");
            if let Err(e) = state.webhooks.enqueue(event) {
                state.metrics.record_webhook_dropped();
                error!(error = %e, "Failed to queue webhook for processing");
            }
        }
        Err(e) => {
            state.metrics.record_webhook_dropped();
            warn!(error = %e, "Authenticated webhook payload could not be parsed");
        }
    }

    StatusCode::OK.into_response()
}
