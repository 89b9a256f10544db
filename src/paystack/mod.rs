//! Paystack Integration
//!
//! Everything that talks to, or authenticates traffic from, the payment
//! processor:
//!
//! - **Client**: initialize and verify transactions over the REST API
//! - **Signature Verification**: HMAC-SHA512 of the raw webhook body,
//!   compared in constant time against `x-paystack-signature`
//! - **Events**: typed views over webhook envelopes and transaction payloads
//! - **Async Processing**: acknowledged webhooks are applied on a background
//!   task
//!
//! # Architecture
//!
//! ```text
//! Request -> Signature Verify -> Ack (200) -> Queue -> Reconciler
//!                   |                                     |
//!                   v                                     v
//!                  403                           Store::activate
//! ```

pub mod client;
pub mod events;
pub mod processor;
pub mod signature;

// Re-export commonly used items
pub use client::{
    InitializeRequest, InitializedTransaction, PaymentGateway, PaystackClient, DEFAULT_API_BASE,
};
pub use events::{
    PaymentMetadata, PaystackEvent, PaystackEventType, Transaction, TransactionMetadata,
};
pub use processor::{ProcessorHandle, WebhookProcessor};
pub use signature::{verify_signature, SignatureVerifier, SIGNATURE_HEADER};
