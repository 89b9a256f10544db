//! HTTP handlers for the subscription gate.
//!
//! ```text
//! GET  /status             ──▶ Store (read only)
//! POST /pay                ──▶ Gateway::initialize ──▶ Store::upsert_pending
//! GET  /paystack/callback  ──▶ Gateway::verify ──▶ Reconciler ──▶ 302 deep link
//! GET  /verify/:reference  ──▶ Gateway::verify ──▶ Reconciler ──▶ JSON
//! POST /webhook/paystack   ──▶ SignatureVerifier ──▶ 200 ──▶ WebhookProcessor ──▶ Reconciler
//! ```
//!
//! No handler writes an active state itself; activations only happen inside
//! the [`Reconciler`].

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use tracing::warn;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::paystack::{
    PaymentGateway, PaystackClient, ProcessorHandle, SignatureVerifier, WebhookProcessor,
};
use crate::reconcile::Reconciler;
use crate::store::{InMemoryStore, SqliteStore, SubscriptionStore};

pub mod callback;
pub mod pay;
pub mod status;
pub mod verify;
pub mod webhook;

pub use callback::{deep_link, paystack_callback_handler, CallbackStatus};
pub use pay::pay_handler;
pub use status::{health_handler, metrics_handler, status_handler};
pub use verify::verify_handler;
pub use webhook::paystack_webhook_handler;

/// Settings the handlers need from configuration
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Deep-link scheme of the client app
    pub app_scheme: String,
    /// Tag attached to transaction metadata
    pub app_tag: String,
    /// Paystack callback URL on this service
    pub callback_url: String,
    /// Subscription price in minor units
    pub price_minor_units: u64,
}

impl HandlerSettings {
    /// Derive handler settings from the service configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            app_scheme: config.app_scheme.clone(),
            app_tag: config.app_tag.clone(),
            callback_url: config.callback_url(),
            price_minor_units: config.price_minor_units(),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Subscription records
    pub store: Arc<dyn SubscriptionStore>,
    /// Payment processor
    pub gateway: Arc<dyn PaymentGateway>,
    /// Reconciliation engine
    pub reconciler: Arc<Reconciler>,
    /// Webhook signature verifier
    pub verifier: SignatureVerifier,
    /// Background webhook queue
    pub webhooks: WebhookProcessor,
    /// Counters
    pub metrics: Arc<Metrics>,
    /// Handler settings
    pub settings: HandlerSettings,
}

impl AppState {
    /// Wire the application from configuration and injected collaborators.
    ///
    /// The returned [`ProcessorHandle`] must be spawned for webhooks to be
    /// applied.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> (Self, ProcessorHandle) {
        let metrics = Arc::new(Metrics::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            metrics.clone(),
            config.price_minor_units(),
            config.subscription_days,
        ));
        let (webhooks, handle) = WebhookProcessor::new(
            reconciler.clone(),
            metrics.clone(),
            config.webhook_queue_capacity,
            config.webhook_timeout(),
        );

        let state = Self {
            store,
            gateway,
            reconciler,
            verifier: SignatureVerifier::new(&config.paystack_secret),
            webhooks,
            metrics,
            settings: HandlerSettings::from_config(config),
        };

        (state, handle)
    }

    /// Validate `config`, open the configured store and build the Paystack
    /// client, then wire them as [`AppState::new`] does.
    pub fn from_config(config: &AppConfig) -> crate::Result<(Self, ProcessorHandle)> {
        config.validate()?;

        let store: Arc<dyn SubscriptionStore> = if config.uses_memory_store() {
            warn!("Using in-memory store; subscriptions are lost on restart");
            Arc::new(InMemoryStore::new())
        } else {
            Arc::new(SqliteStore::open(&config.database_path)?)
        };

        let gateway = PaystackClient::new(
            &config.paystack_secret,
            &config.paystack_api_base,
            config.gateway_timeout(),
        )?;

        Ok(Self::new(config, store, Arc::new(gateway)))
    }
}

/// Create the application router
///
/// # Example
///
/// ```rust,ignore
/// let (state, processor_handle) = AppState::new(&config, store, gateway);
/// tokio::spawn(processor_handle.run());
/// let app = router(Arc::new(state));
/// ```
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/pay", post(pay_handler))
        .route("/paystack/callback", get(paystack_callback_handler))
        .route("/verify/:reference", get(verify_handler))
        .route("/webhook/paystack", post(paystack_webhook_handler))
        .with_state(state)
}
