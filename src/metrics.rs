//! Metrics Collection for Subgate Web
//!
//! Atomic counters for the payment flow plus labeled breakdowns of
//! activations and rejections, exported in Prometheus text format at
//! `GET /metrics`.
//!
//! # Example
//!
//! ```rust
//! use subgate_web::metrics::Metrics;
//! use subgate_web::reconcile::{ActivationKind, Channel};
//!
//! let metrics = Metrics::new();
//! metrics.record_activation(Channel::Webhook, ActivationKind::Fresh);
//!
//! let output = metrics.to_prometheus_format();
//! assert!(output.contains("subgate_activations_total{channel=\"webhook\",kind=\"fresh\"} 1"));
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use crate::reconcile::{ActivationKind, Channel};

/// Counters for the subscription payment flow
#[derive(Debug)]
pub struct Metrics {
    // === Counters ===
    /// Transactions successfully initialized with the processor
    pub payments_initiated: AtomicU64,
    /// Pay attempts refused because a subscription is live
    pub pay_conflicts: AtomicU64,
    /// Failed calls to the processor
    pub gateway_errors: AtomicU64,
    /// Webhooks rejected for a missing or bad signature
    pub webhook_auth_failures: AtomicU64,
    /// Authenticated webhooks received
    pub webhook_events_received: AtomicU64,
    /// Authenticated webhooks that could not be queued or decoded
    pub webhook_events_dropped: AtomicU64,

    // === Labeled counters ===
    /// Activations by (channel, kind)
    activations: RwLock<BTreeMap<(&'static str, &'static str), u64>>,
    /// Rejected or failed reconciliations by (channel, reason)
    rejections: RwLock<BTreeMap<(&'static str, &'static str), u64>>,

    // === Timing ===
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            payments_initiated: AtomicU64::new(0),
            pay_conflicts: AtomicU64::new(0),
            gateway_errors: AtomicU64::new(0),
            webhook_auth_failures: AtomicU64::new(0),
            webhook_events_received: AtomicU64::new(0),
            webhook_events_dropped: AtomicU64::new(0),
            activations: RwLock::new(BTreeMap::new()),
            rejections: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully initialized transaction
    pub fn record_payment_initiated(&self) {
        self.payments_initiated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pay attempt refused with `conflict`
    pub fn record_pay_conflict(&self) {
        self.pay_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed gateway call
    pub fn record_gateway_error(&self) {
        self.gateway_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a webhook rejected at signature verification
    pub fn record_webhook_auth_failure(&self) {
        self.webhook_auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an authenticated webhook
    pub fn record_webhook_received(&self) {
        self.webhook_events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an authenticated webhook that was not processed
    pub fn record_webhook_dropped(&self) {
        self.webhook_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied payment
    pub fn record_activation(&self, channel: Channel, kind: ActivationKind) {
        *self
            .activations
            .write()
            .entry((channel.as_str(), kind.as_str()))
            .or_insert(0) += 1;
    }

    /// Record a payment the engine refused or failed to apply
    pub fn record_rejection(&self, channel: Channel, reason: &'static str) {
        *self
            .rejections
            .write()
            .entry((channel.as_str(), reason))
            .or_insert(0) += 1;
    }

    /// Activations recorded for `channel`, across kinds
    pub fn activations_for(&self, channel: Channel) -> u64 {
        self.activations
            .read()
            .iter()
            .filter(|((c, _), _)| *c == channel.as_str())
            .map(|(_, count)| count)
            .sum()
    }

    /// Rejections recorded for `reason`, across channels
    pub fn rejections_for(&self, reason: &str) -> u64 {
        self.rejections
            .read()
            .iter()
            .filter(|((_, r), _)| *r == reason)
            .map(|(_, count)| count)
            .sum()
    }

    /// Seconds since this instance was created
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("subgate_payments_initiated_total", &self.payments_initiated),
            ("subgate_pay_conflicts_total", &self.pay_conflicts),
            ("subgate_gateway_errors_total", &self.gateway_errors),
            ("subgate_webhook_auth_failures_total", &self.webhook_auth_failures),
            ("subgate_webhook_events_received_total", &self.webhook_events_received),
            ("subgate_webhook_events_dropped_total", &self.webhook_events_dropped),
        ];
        for (name, counter) in counters {
            let _ = writeln!(output, "{name} {}", counter.load(Ordering::Relaxed));
        }

        for ((channel, kind), count) in self.activations.read().iter() {
            let _ = writeln!(
                output,
                "subgate_activations_total{{channel=\"{channel}\",kind=\"{kind}\"}} {count}"
            );
        }

        for ((channel, reason), count) in self.rejections.read().iter() {
            let _ = writeln!(
                output,
                "subgate_reconcile_rejections_total{{channel=\"{channel}\",reason=\"{reason}\"}} {count}"
            );
        }

        let _ = writeln!(output, "subgate_uptime_seconds {}", self.uptime_seconds());

        output
    }
}
