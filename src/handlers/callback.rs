//! Browser callback after hosted checkout.
//!
//! The caller is a browser, so every outcome is a redirect into the client
//! app, never a JSON error body:
//!
//! ```text
//! {scheme}://paystack-callback?status=success|failed|error&type=subscription&reference=...
//! ```

use std::fmt;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, instrument};
use url::Url;

use crate::handlers::verify::{verify_and_reconcile, PaymentCheck};
use crate::handlers::AppState;
use crate::reconcile::Channel;

/// Outcome carried in the deep link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    /// Subscription is active
    Success,
    /// Payment not completed or refused by reconciliation
    Failed,
    /// Verification could not be carried out
    Error,
}

impl CallbackStatus {
    /// Query-string value
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Success => "success",
            CallbackStatus::Failed => "failed",
            CallbackStatus::Error => "error",
        }
    }
}

impl fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&PaymentCheck> for CallbackStatus {
    fn from(check: &PaymentCheck) -> Self {
        match check {
            PaymentCheck::Activated(_) => CallbackStatus::Success,
            PaymentCheck::NotSuccess { .. } | PaymentCheck::Rejected(_) => CallbackStatus::Failed,
        }
    }
}

/// Paystack appends both `reference` and `trxref` to the callback URL
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    /// Transaction reference
    pub reference: Option<String>,
    /// Same reference under Paystack's legacy name
    pub trxref: Option<String>,
}

impl CallbackQuery {
    fn reference(&self) -> Option<&str> {
        [self.reference.as_deref(), self.trxref.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|r| !r.is_empty())
    }
}

/// Build the deep link handing control back to the client app
pub fn deep_link(
    scheme: &str,
    status: CallbackStatus,
    reference: &str,
) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        &format!("{scheme}://paystack-callback"),
        &[
            ("status", status.as_str()),
            ("type", "subscription"),
            ("reference", reference),
        ],
    )
}

fn redirect(scheme: &str, status: CallbackStatus, reference: &str) -> Response {
    match deep_link(scheme, status, reference) {
        Ok(url) => (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response(),
        Err(e) => {
            error!(scheme = %scheme, error = %e, "Cannot build deep link");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Paystack redirect target after in-browser checkout.
///
/// # Route
/// `GET /paystack/callback?reference=`
///
/// # Response
/// - `302 Found` to the app deep link, with `status` set to `success`,
///   `failed` or `error`
#[instrument(skip_all)]
pub async fn paystack_callback_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let scheme = &state.settings.app_scheme;

    let Some(reference) = query.reference() else {
        error!("Callback reached without a reference");
        return redirect(scheme, CallbackStatus::Error, "");
    };

    let status = match verify_and_reconcile(&state, reference, Channel::Callback).await {
        Ok(check) => CallbackStatus::from(&check),
        Err(e) => {
            error!(reference = %reference, error = %e, "Callback verification error");
            CallbackStatus::Error
        }
    };

    redirect(scheme, status, reference)
}
