//! Outbound Paystack API client.
//!
//! Two calls: initialize a transaction (returns the hosted checkout URL and
//! the processor reference) and verify a transaction by reference. Every
//! failure mode collapses into [`GatewayError`], carrying the upstream JSON
//! body when there is one. No retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ConfigError, GatewayError};
use crate::paystack::events::{Transaction, TransactionMetadata};

/// Production API root
pub const DEFAULT_API_BASE: &str = "https://api.paystack.co";

/// Body of `POST /transaction/initialize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializeRequest {
    /// Payer email
    pub email: String,
    /// Amount in minor units
    pub amount: u64,
    /// Identity metadata echoed back on verify and in webhooks
    pub metadata: TransactionMetadata,
    /// Where the browser lands after checkout
    pub callback_url: String,
}

/// Result of a successful initialize call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitializedTransaction {
    /// Hosted checkout page
    pub authorization_url: String,
    /// Processor reference for the new transaction
    pub reference: String,
}

/// Payment processor seam used by the handlers.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Start a transaction and obtain its checkout URL
    async fn initialize_transaction(
        &self,
        request: &InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError>;

    /// Fetch the processor's view of the transaction `reference`
    async fn verify_transaction(&self, reference: &str) -> Result<Transaction, GatewayError>;
}

/// Paystack REST client
#[derive(Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    api_base: Url,
    secret: String,
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl PaystackClient {
    /// Create a client against `api_base` with a per-request `timeout`
    pub fn new(secret: &str, api_base: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let api_base = Url::parse(api_base).map_err(|e| ConfigError::Invalid {
            field: "paystack_api_base",
            message: e.to_string(),
        })?;
        if api_base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "paystack_api_base",
                message: format!("{api_base} cannot be used as a base URL"),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "gateway_timeout_secs",
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base,
            secret: secret.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport(format!("invalid API base {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_data<T>(&self, response: reqwest::Response) -> Result<T, GatewayError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        if !status.is_success() {
            let details = body.or_else(|| {
                let text = String::from_utf8_lossy(&bytes);
                (!text.is_empty()).then(|| Value::String(text.into_owned()))
            });
            return Err(GatewayError::Status {
                status: status.as_u16(),
                details,
            });
        }

        let Some(body) = body else {
            return Err(GatewayError::Malformed {
                message: "response body is not JSON".to_string(),
                details: None,
            });
        };

        match body.get("data").filter(|data| !data.is_null()) {
            Some(data) => T::deserialize(data).map_err(|e| GatewayError::Malformed {
                message: e.to_string(),
                details: Some(body.clone()),
            }),
            None => Err(GatewayError::Malformed {
                message: "response has no data".to_string(),
                details: Some(body),
            }),
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_transaction(
        &self,
        request: &InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError> {
        let url = self.endpoint(&["transaction", "initialize"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.secret)
            .json(request)
            .send()
            .await?;

        let initialized: InitializedTransaction = self.read_data(response).await?;
        if initialized.authorization_url.is_empty() || initialized.reference.is_empty() {
            return Err(GatewayError::Malformed {
                message: "initialize returned an empty authorization_url or reference".to_string(),
                details: None,
            });
        }

        tracing::debug!(reference = %initialized.reference, "Paystack transaction initialized");
        Ok(initialized)
    }

    async fn verify_transaction(&self, reference: &str) -> Result<Transaction, GatewayError> {
        let url = self.endpoint(&["transaction", "verify", reference])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.secret)
            .send()
            .await?;

        let mut transaction: Transaction = self.read_data(response).await?;
        if transaction.reference.is_empty() {
            transaction.reference = reference.to_string();
        }

        tracing::debug!(
            reference = %transaction.reference,
            status = %transaction.status,
            amount = transaction.amount,
            "Paystack transaction verified"
        );
        Ok(transaction)
    }
}
