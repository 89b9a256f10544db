//! Async Webhook Processing
//!
//! Webhooks are acknowledged as soon as their signature checks out; the
//! state change happens afterwards on a background task, decoupled from the
//! HTTP response.
//!
//! # Architecture
//!
//! ```text
//! Webhook Received
//!       |
//!       v
//! [Verify Signature] --> bad --> 403
//!       |
//!       v
//! [Queue Event] --> Return 200 immediately
//!       |
//!       v
//! [ProcessorHandle::run] --> one task per event
//!       |
//!       v
//! [Reconciler] --> failures are logged, never retried here
//! ```
//!
//! Paystack redelivers unacknowledged webhooks on its own schedule, and the
//! reconciliation engine tolerates duplicates, so a failure after the ack is
//! only logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;

use crate::error::WebhookError;
use crate::metrics::Metrics;
use crate::paystack::events::{PaystackEvent, PaystackEventType};
use crate::reconcile::{Activation, Channel, Reconciler, VerifiedPayment};

/// Queues authenticated webhook events for background processing
pub struct WebhookProcessor {
    reconciler: Arc<Reconciler>,
    metrics: Arc<Metrics>,
    processing_timeout: Duration,
    task_sender: mpsc::Sender<PaystackEvent>,
}

/// Handle for running the background processor
pub struct ProcessorHandle {
    reconciler: Arc<Reconciler>,
    metrics: Arc<Metrics>,
    processing_timeout: Duration,
    task_receiver: mpsc::Receiver<PaystackEvent>,
}

impl WebhookProcessor {
    /// Create a processor with a queue of `capacity` events
    pub fn new(
        reconciler: Arc<Reconciler>,
        metrics: Arc<Metrics>,
        capacity: usize,
        processing_timeout: Duration,
    ) -> (Self, ProcessorHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let processor = Self {
            reconciler: reconciler.clone(),
            metrics: metrics.clone(),
            processing_timeout,
            task_sender: tx,
        };

        let handle = ProcessorHandle {
            reconciler,
            metrics,
            processing_timeout,
            task_receiver: rx,
        };

        (processor, handle)
    }

    /// Queue an event without waiting for capacity.
    ///
    /// Called while the webhook response is pending, so it never blocks.
    pub fn enqueue(&self, event: PaystackEvent) -> Result<(), WebhookError> {
        self.task_sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => WebhookError::QueueFull,
            TrySendError::Closed(_) => WebhookError::QueueClosed,
        })
    }

    /// Process an event inline (for testing or immediate processing)
    pub async fn process_event(
        &self,
        event: &PaystackEvent,
    ) -> Result<Option<Activation>, WebhookError> {
        process_single_event(
            &self.reconciler,
            &self.metrics,
            event,
            self.processing_timeout,
        )
        .await
    }
}

impl ProcessorHandle {
    /// Run the background processor until every [`WebhookProcessor`] is dropped
    ///
    /// This should be spawned as a tokio task:
    ///
    /// ```rust,ignore
    /// tokio::spawn(handle.run());
    /// ```
    pub async fn run(mut self) {
        tracing::info!("Starting Paystack webhook processor");

        while let Some(event) = self.task_receiver.recv().await {
            let reconciler = self.reconciler.clone();
            let metrics = self.metrics.clone();
            let processing_timeout = self.processing_timeout;

            tokio::spawn(async move {
                let event_name = event.event.clone();
                if let Err(e) =
                    process_single_event(&reconciler, &metrics, &event, processing_timeout).await
                {
                    tracing::error!(
                        event = %event_name,
                        error = %e,
                        "Webhook processing failed after acknowledgment"
                    );
                }
            });
        }

        tracing::info!("Paystack webhook processor shutting down");
    }
}

/// Apply one event. Returns the activation for charges that were applied.
async fn process_single_event(
    reconciler: &Reconciler,
    metrics: &Metrics,
    event: &PaystackEvent,
    processing_timeout: Duration,
) -> Result<Option<Activation>, WebhookError> {
    match event.typed_event_type() {
        PaystackEventType::ChargeSuccess => {
            let charge = event.as_charge().map_err(|e| {
                metrics.record_webhook_dropped();
                WebhookError::InvalidPayload(e.to_string())
            })?;

            if !charge.is_success() {
                tracing::warn!(
                    reference = %charge.reference,
                    status = %charge.status,
                    "charge.success event carries a non-success transaction; ignoring"
                );
                return Ok(None);
            }

            let payment = VerifiedPayment::from(charge);
            let activation = timeout(
                processing_timeout,
                reconciler.record_verified_payment(&payment, Channel::Webhook),
            )
            .await
            .map_err(|_| WebhookError::Timeout(processing_timeout))??;

            Ok(Some(activation))
        }
        PaystackEventType::ChargeFailed => {
            let reference = event
                .data
                .get("reference")
                .and_then(|r| r.as_str())
                .unwrap_or_default();
            tracing::info!(reference = %reference, "Paystack reported a failed charge");
            Ok(None)
        }
        PaystackEventType::Unknown => {
            tracing::debug!(event = %event.event, "Ignoring unhandled webhook event");
            Ok(None)
        }
    }
}
