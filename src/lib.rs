//! Subgate Web - Paystack-backed Subscription Gate
//!
//! This crate provides an HTTP service that sells time-limited subscriptions
//! through Paystack and answers whether a given (email, device, app) triple
//! currently holds an active one.
//!
//! # Features
//!
//! - **Payment Initiation**: Paystack transaction initialization with identity metadata
//! - **Three Confirmation Channels**: browser callback, client verify poll, signed webhook
//! - **Single Reconciliation Policy**: amount and identity checks, idempotent per reference
//! - **Persistent Store**: SQLite with atomic conditional writes, or in-memory
//!
//! # Architecture
//!
//! ```text
//! Client App ──▶ /pay ──▶ Paystack Gateway ──▶ hosted checkout
//!                                                   │
//!       ┌───────────────────────┬───────────────────┤
//!       ▼                       ▼                   ▼
//!  /paystack/callback     /verify/:ref      /webhook/paystack
//!       │                       │                   │ (HMAC-SHA512)
//!       └──────────┬────────────┘                   ▼
//!                  ▼                         WebhookProcessor
//!             Reconciler ◀──────────────────────────┘
//!                  │
//!                  ▼
//!          SubscriptionStore ◀── /status
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subgate_web::config::AppConfig;
//! use subgate_web::handlers::{router, AppState};
//! use subgate_web::paystack::PaystackClient;
//! use subgate_web::store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::test_config();
//!     let gateway = PaystackClient::new(
//!         &config.paystack_secret,
//!         &config.paystack_api_base,
//!         config.gateway_timeout(),
//!     )?;
//!
//!     let (state, processor) =
//!         AppState::new(&config, Arc::new(InMemoryStore::new()), Arc::new(gateway));
//!     tokio::spawn(processor.run());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//!     axum::serve(listener, router(Arc::new(state))).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod paystack;
pub mod reconcile;
pub mod store;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{ApiError, Error, Result};
pub use handlers::{router, AppState};
pub use metrics::Metrics;
pub use paystack::{PaymentGateway, PaystackClient, SignatureVerifier};
pub use reconcile::{Activation, ActivationKind, Channel, Reconciler, VerifiedPayment};
pub use store::{InMemoryStore, SqliteStore, SubscriptionKey, SubscriptionRecord, SubscriptionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
