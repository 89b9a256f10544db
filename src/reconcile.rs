//! Reconciliation Engine
//!
//! Converts a verified payment into subscription state. Three channels can
//! report the same payment (browser callback, client verify poll, webhook),
//! in any order and any number of times, so the engine is built to converge:
//!
//! ```text
//! VerifiedPayment ──▶ amount == price? ──no──▶ AmountMismatch
//!                            │
//!                           yes
//!                            ▼
//!                   identity in metadata? ──no──▶ IncompleteMetadata
//!                            │
//!                           yes
//!                            ▼
//!          ┌─ active & last_ref == reference ─┬─ live ──▶ keep expiry (AlreadyApplied)
//!          │                                  └─ lapsed ▶ ExpiredReference
//!  record ─┼─ live, other reference ─────────▶ expiry + days (Extended)
//!          └─ absent / pending / expired ────▶ now + days    (Fresh)
//!                            │
//!                            ▼
//!                  Store::activate (max-merge)
//! ```
//!
//! Deriving a live subscription's new expiry from its stored expiry rather
//! than from each caller's clock keeps near-simultaneous reports of the same
//! event from producing different results.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::metrics::Metrics;
use crate::paystack::events::{PaymentMetadata, Transaction};
use crate::store::{format_timestamp, SubscriptionKey, SubscriptionStore};

/// Which notification path reported the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Browser redirect after checkout
    Callback,
    /// Client-initiated verification poll
    Verify,
    /// Signed server-to-server notification
    Webhook,
}

impl Channel {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Callback => "callback",
            Channel::Verify => "verify",
            Channel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment the processor has confirmed as successful
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Processor reference
    pub reference: String,
    /// Amount the processor says was paid, in minor units
    pub amount_minor_units: u64,
    /// Identity metadata echoed back by the processor
    pub metadata: PaymentMetadata,
}

impl From<Transaction> for VerifiedPayment {
    fn from(transaction: Transaction) -> Self {
        Self {
            reference: transaction.reference,
            amount_minor_units: transaction.amount,
            metadata: transaction.metadata,
        }
    }
}

/// How an activation related to the existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// New, pending or lapsed subscription started from now
    Fresh,
    /// Live subscription extended from its current expiry
    Extended,
    /// This reference was already applied; expiry unchanged
    AlreadyApplied,
}

impl ActivationKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationKind::Fresh => "fresh",
            ActivationKind::Extended => "extended",
            ActivationKind::AlreadyApplied => "already_applied",
        }
    }
}

/// Result of applying a verified payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Subscriber identity
    pub key: SubscriptionKey,
    /// Expiry as stored after the write
    pub expires_at: DateTime<Utc>,
    /// Reference that was applied
    pub reference: String,
    /// Relation to the previous state
    pub kind: ActivationKind,
}

/// Applies verified payments to the subscription store.
pub struct Reconciler {
    store: Arc<dyn SubscriptionStore>,
    metrics: Arc<Metrics>,
    expected_amount: u64,
    subscription_days: u32,
}

impl Reconciler {
    /// Create an engine charging `expected_amount` minor units for
    /// `subscription_days` days of access.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        metrics: Arc<Metrics>,
        expected_amount: u64,
        subscription_days: u32,
    ) -> Self {
        Self {
            store,
            metrics,
            expected_amount,
            subscription_days,
        }
    }

    /// Configured price in minor units
    pub fn expected_amount(&self) -> u64 {
        self.expected_amount
    }

    /// Configured subscription length
    pub fn subscription_length(&self) -> Duration {
        Duration::days(i64::from(self.subscription_days))
    }

    /// Apply `payment` reported through `channel`, at the current time
    pub async fn record_verified_payment(
        &self,
        payment: &VerifiedPayment,
        channel: Channel,
    ) -> Result<Activation, ReconcileError> {
        self.record_verified_payment_at(payment, channel, Utc::now())
            .await
    }

    /// Apply `payment` reported through `channel`, as of `now`
    pub async fn record_verified_payment_at(
        &self,
        payment: &VerifiedPayment,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<Activation, ReconcileError> {
        let result = self.apply(payment, channel, now).await;

        match &result {
            Ok(activation) => {
                self.metrics.record_activation(channel, activation.kind);
                info!(
                    reference = %activation.reference,
                    subscriber = %activation.key,
                    channel = %channel,
                    kind = activation.kind.as_str(),
                    expires_at = %format_timestamp(&activation.expires_at),
                    "Subscription activated"
                );
            }
            Err(e) if e.is_rejection() => {
                self.metrics.record_rejection(channel, e.code());
                warn!(
                    reference = %payment.reference,
                    channel = %channel,
                    error = %e,
                    "Verified payment rejected"
                );
            }
            Err(e) => {
                self.metrics.record_rejection(channel, e.code());
                tracing::error!(
                    reference = %payment.reference,
                    channel = %channel,
                    error = %e,
                    "Failed to apply verified payment"
                );
            }
        }

        result
    }

    async fn apply(
        &self,
        payment: &VerifiedPayment,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<Activation, ReconcileError> {
        if payment.amount_minor_units != self.expected_amount {
            return Err(ReconcileError::AmountMismatch {
                expected: self.expected_amount,
                reported: payment.amount_minor_units,
            });
        }

        let key = payment
            .metadata
            .identity()
            .ok_or(ReconcileError::IncompleteMetadata)?;

        let now = now.trunc_subsecs(3);
        let existing = self.store.get(&key).await?;

        // A reference pays for exactly one window, live or not.
        if let Some(expires_at) = existing
            .as_ref()
            .and_then(|record| record.applied_expiry(&payment.reference))
        {
            if expires_at <= now {
                return Err(ReconcileError::ExpiredReference {
                    expired_at: expires_at,
                });
            }
            return Ok(Activation {
                key,
                expires_at,
                reference: payment.reference.clone(),
                kind: ActivationKind::AlreadyApplied,
            });
        }

        let (target, kind) = match existing.and_then(|record| record.live_expiry(now)) {
            Some(expires_at) => (
                expires_at + self.subscription_length(),
                ActivationKind::Extended,
            ),
            None => (now + self.subscription_length(), ActivationKind::Fresh),
        };

        debug!(
            reference = %payment.reference,
            subscriber = %key,
            channel = %channel,
            kind = kind.as_str(),
            "Applying verified payment"
        );

        let record = self.store.activate(&key, target, &payment.reference).await?;

        Ok(Activation {
            key,
            expires_at: record.expires_at.unwrap_or(target),
            reference: payment.reference.clone(),
            kind,
        })
    }
}
