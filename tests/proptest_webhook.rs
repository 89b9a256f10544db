//! Property-based testing for webhook authentication and reconciliation.
//!
//! Uses proptest to generate arbitrary bodies, identities and payment
//! sequences and checks the invariants the service relies on.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use subgate_web::metrics::Metrics;
use subgate_web::paystack::{verify_signature, PaymentMetadata, SignatureVerifier};
use subgate_web::reconcile::{Channel, Reconciler, VerifiedPayment};
use subgate_web::store::{InMemoryStore, SubscriptionKey, SubscriptionStore};

const SECRET: &str = "sk_test_subgate";
const PRICE: u64 = 500_000;

// ============================================================================
// STRATEGIES
// ============================================================================

/// Strategy for identity fields with surrounding whitespace
fn arb_padded(inner: &'static str) -> impl Strategy<Value = String> {
    (inner, " {0,2}", " {0,2}").prop_map(|(core, l, r)| format!("{l}{core}{r}"))
}

/// Strategy for a sequence of (reference index, minutes after start)
fn arb_payments() -> impl Strategy<Value = Vec<(u8, i64)>> {
    prop::collection::vec((0u8..4, 0i64..(90 * 24 * 60)), 1..12)
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn payment(reference: String) -> VerifiedPayment {
    VerifiedPayment {
        reference,
        amount_minor_units: PRICE,
        metadata: PaymentMetadata {
            email: Some("a@b.com".to_string()),
            device_id: Some("d1".to_string()),
            app_id: Some("app1".to_string()),
        },
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// SIGNATURE PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_own_signature_always_verifies(body in prop::collection::vec(any::<u8>(), 0..512)) {
        let verifier = SignatureVerifier::new(SECRET);
        let signature = verifier.sign(&body).unwrap();
        prop_assert!(verifier.verify(&body, &signature).is_ok());
    }

    #[test]
    fn prop_arbitrary_header_is_rejected(
        body in prop::collection::vec(any::<u8>(), 0..256),
        header in "[0-9a-fA-F]{0,160}|[^0-9a-fA-F]{1,40}",
    ) {
        let genuine = SignatureVerifier::new(SECRET).sign(&body).unwrap();
        prop_assume!(!genuine.eq_ignore_ascii_case(&header));
        prop_assert!(!verify_signature(&body, &header, SECRET));
    }

    #[test]
    fn prop_tampered_body_is_rejected(
        body in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let verifier = SignatureVerifier::new(SECRET);
        let signature = verifier.sign(&body).unwrap();

        let mut tampered = body.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;
        prop_assert!(verifier.verify(&tampered, &signature).is_err());
    }
}

// ============================================================================
// KEY NORMALIZATION
// ============================================================================

proptest! {
    #[test]
    fn prop_email_case_and_padding_do_not_matter(
        email in arb_padded("[a-zA-Z0-9]{1,12}@[a-zA-Z]{1,8}\\.com"),
        device in "[a-z0-9]{1,8}",
        app in "[a-z0-9]{1,8}",
    ) {
        let key = SubscriptionKey::new(&email, &device, &app).unwrap();
        let canonical = SubscriptionKey::new(&email.trim().to_lowercase(), &device, &app).unwrap();
        prop_assert_eq!(key.email(), email.trim().to_lowercase());
        prop_assert_eq!(key, canonical);
    }

    #[test]
    fn prop_blank_parts_yield_no_key(blank in " {0,4}", device in "[a-z]{1,6}") {
        prop_assert!(SubscriptionKey::new(&blank, &device, "app1").is_none());
        prop_assert!(SubscriptionKey::new("a@b.com", &blank, "app1").is_none());
        prop_assert!(SubscriptionKey::new("a@b.com", &device, &blank).is_none());
    }

    #[test]
    fn prop_metadata_object_and_string_agree(
        email in "[a-z]{1,8}@[a-z]{1,6}\\.io",
        device in "[a-z0-9]{1,8}",
    ) {
        let object = json!({ "email": email, "deviceId": device, "appId": "app1" });
        let encoded = json!(object.to_string());
        prop_assert_eq!(
            PaymentMetadata::from_value(&object),
            PaymentMetadata::from_value(&encoded)
        );
    }
}

// ============================================================================
// RECONCILIATION PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Applying any sequence of verified payments never moves expiry backwards,
    /// replaying the last reference changes nothing, and a lapsed reference
    /// never reopens its window.
    #[test]
    fn prop_activation_never_regresses(payments in arb_payments()) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let reconciler = Reconciler::new(store.clone(), Arc::new(Metrics::new()), PRICE, 30);
            let key = SubscriptionKey::new("a@b.com", "d1", "app1").unwrap();

            let mut sorted = payments.clone();
            sorted.sort_by_key(|(_, minutes)| *minutes);

            let mut previous: Option<DateTime<Utc>> = None;
            for (reference, minutes) in sorted {
                let now = base_time() + Duration::minutes(minutes);
                let reference = format!("ref{reference}");
                let activation = match reconciler
                    .record_verified_payment_at(&payment(reference.clone()), Channel::Verify, now)
                    .await
                {
                    Ok(activation) => activation,
                    Err(e) => {
                        // Only a lapsed, already-applied reference is refused
                        prop_assert_eq!(e.code(), "expired_reference");
                        let record = store.get(&key).await.unwrap().unwrap();
                        prop_assert_eq!(record.last_ref.as_deref(), Some(reference.as_str()));
                        prop_assert!(!record.is_active_at(now));
                        continue;
                    }
                };

                prop_assert!(activation.expires_at > now);
                if let Some(previous) = previous {
                    prop_assert!(activation.expires_at >= previous);
                }

                let replay = reconciler
                    .record_verified_payment_at(&payment(activation.reference.clone()), Channel::Webhook, now)
                    .await
                    .unwrap();
                prop_assert_eq!(replay.expires_at, activation.expires_at);

                let record = store.get(&key).await.unwrap().unwrap();
                prop_assert!(record.active);
                prop_assert_eq!(record.expires_at, Some(activation.expires_at));
                previous = Some(activation.expires_at);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Any amount other than the configured price is refused without writing.
    #[test]
    fn prop_wrong_amount_never_writes(amount in any::<u64>()) {
        prop_assume!(amount != PRICE);
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let reconciler = Reconciler::new(store.clone(), Arc::new(Metrics::new()), PRICE, 30);

            let mut wrong = payment("ref1".to_string());
            wrong.amount_minor_units = amount;
            let result = reconciler.record_verified_payment(&wrong, Channel::Callback).await;

            prop_assert_eq!(result.unwrap_err().code(), "amount_mismatch");
            prop_assert!(store.is_empty());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
