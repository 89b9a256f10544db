//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use subgate_web::config::AppConfig;
use subgate_web::error::GatewayError;
use subgate_web::handlers::{router, AppState};
use subgate_web::paystack::{
    InitializeRequest, InitializedTransaction, PaymentGateway, ProcessorHandle, SignatureVerifier,
    Transaction,
};
use subgate_web::store::{InMemoryStore, SubscriptionKey, SubscriptionStore};

/// Identity used across scenarios
pub const EMAIL: &str = "a@b.com";
pub const DEVICE: &str = "d1";
pub const APP: &str = "app1";

/// Scripted stand-in for Paystack
#[derive(Default)]
pub struct FakeGateway {
    next_reference: AtomicU64,
    transactions: Mutex<HashMap<String, Value>>,
    fail_with: Mutex<Option<GatewayError>>,
    initialized: Mutex<Vec<InitializeRequest>>,
    activation_in_flight: Mutex<Option<PendingActivation>>,
}

/// Activation written while an initialize call is outstanding
struct PendingActivation {
    store: Arc<dyn SubscriptionStore>,
    key: SubscriptionKey,
    expires_at: DateTime<Utc>,
    reference: String,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the verify response for `reference` as a raw transaction object
    pub fn set_transaction(&self, reference: &str, transaction: Value) {
        self.transactions
            .lock()
            .insert(reference.to_string(), transaction);
    }

    /// Script a successful charge carrying the identity metadata
    pub fn set_paid(&self, reference: &str, amount: u64) {
        self.set_transaction(reference, charge(reference, "success", amount));
    }

    /// Make every call fail with a 400 carrying `details`
    pub fn fail_with_status(&self, details: Value) {
        *self.fail_with.lock() = Some(GatewayError::Status {
            status: 400,
            details: Some(details),
        });
    }

    /// Activate `key` in `store` from inside the next initialize call, as a
    /// webhook for an earlier payment landing mid-request would
    pub fn activate_during_initialize(
        &self,
        store: Arc<dyn SubscriptionStore>,
        key: SubscriptionKey,
        expires_at: DateTime<Utc>,
        reference: &str,
    ) {
        *self.activation_in_flight.lock() = Some(PendingActivation {
            store,
            key,
            expires_at,
            reference: reference.to_string(),
        });
    }

    pub fn initialized(&self) -> Vec<InitializeRequest> {
        self.initialized.lock().clone()
    }

    fn scripted_failure(&self) -> Option<GatewayError> {
        self.fail_with.lock().as_ref().map(|e| match e {
            GatewayError::Status { status, details } => GatewayError::Status {
                status: *status,
                details: details.clone(),
            },
            other => GatewayError::Transport(other.to_string()),
        })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_transaction(
        &self,
        request: &InitializeRequest,
    ) -> Result<InitializedTransaction, GatewayError> {
        if let Some(e) = self.scripted_failure() {
            return Err(e);
        }
        let in_flight = self.activation_in_flight.lock().take();
        if let Some(pending) = in_flight {
            pending
                .store
                .activate(&pending.key, pending.expires_at, &pending.reference)
                .await
                .unwrap();
        }
        self.initialized.lock().push(request.clone());
        let n = self.next_reference.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("ref{n}");
        Ok(InitializedTransaction {
            authorization_url: format!("https://checkout.paystack.com/{reference}"),
            reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> Result<Transaction, GatewayError> {
        if let Some(e) = self.scripted_failure() {
            return Err(e);
        }
        let value = self
            .transactions
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                status: 404,
                details: Some(json!({ "status": false, "message": "Transaction reference not found" })),
            })?;
        serde_json::from_value(value).map_err(|e| GatewayError::Malformed {
            message: e.to_string(),
            details: None,
        })
    }
}

/// A transaction object as Paystack returns it
pub fn charge(reference: &str, status: &str, amount: u64) -> Value {
    json!({
        "id": 302961,
        "reference": reference,
        "status": status,
        "amount": amount,
        "currency": "NGN",
        "metadata": { "email": EMAIL, "deviceId": DEVICE, "appId": APP, "app": "joki" }
    })
}

/// Fully wired application over an in-memory store and a fake gateway
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub config: AppConfig,
    pub processor: Option<ProcessorHandle>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig::test_config();
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let (state, processor) = AppState::new(
            &config,
            store.clone() as Arc<dyn SubscriptionStore>,
            gateway.clone() as Arc<dyn PaymentGateway>,
        );
        Self {
            state: Arc::new(state),
            store,
            gateway,
            config,
            processor: Some(processor),
        }
    }

    /// Spawn the background webhook processor
    pub fn spawn_processor(&mut self) {
        if let Some(processor) = self.processor.take() {
            tokio::spawn(processor.run());
        }
    }

    pub fn price(&self) -> u64 {
        self.config.price_minor_units()
    }

    pub fn sign(&self, body: &[u8]) -> String {
        SignatureVerifier::new(&self.config.paystack_secret)
            .sign(body)
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        router(self.state.clone()).oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_webhook(&self, body: &[u8], signature: Option<&str>) -> Response<Body> {
        let mut request = Request::post("/webhook/paystack").header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header("x-paystack-signature", signature);
        }
        self.send(request.body(Body::from(body.to_vec())).unwrap())
            .await
    }

    pub async fn status(&self) -> Value {
        let response = self
            .get(&format!("/status?email={EMAIL}&deviceId={DEVICE}&appId={APP}"))
            .await;
        json_body(response).await
    }

    pub async fn pay(&self) -> Response<Body> {
        self.post_json(
            "/pay",
            json!({ "email": EMAIL, "deviceId": DEVICE, "appId": APP }),
        )
        .await
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}
