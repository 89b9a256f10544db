//! Paystack Event Types
//!
//! Strongly-typed views over Paystack webhook events and the transaction
//! payloads shared with the verify endpoint.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::store::SubscriptionKey;

/// Paystack event types we distinguish
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaystackEventType {
    /// A charge completed successfully
    ChargeSuccess,
    /// A charge failed
    ChargeFailed,
    /// Anything else; acknowledged and ignored
    Unknown,
}

impl FromStr for PaystackEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "charge.success" => Self::ChargeSuccess,
            "charge.failed" => Self::ChargeFailed,
            _ => Self::Unknown,
        })
    }
}

impl PaystackEventType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeSuccess => "charge.success",
            Self::ChargeFailed => "charge.failed",
            Self::Unknown => "unknown",
        }
    }
}

/// Webhook event envelope: `{"event": "...", "data": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackEvent {
    /// Event name, e.g. `charge.success`
    pub event: String,

    /// Event payload; a transaction object for charge events
    #[serde(default)]
    pub data: Value,
}

impl PaystackEvent {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Get the typed event type
    pub fn typed_event_type(&self) -> PaystackEventType {
        match self.event.parse() {
            Ok(event_type) => event_type,
            Err(never) => match never {},
        }
    }

    /// Extract the transaction carried by a charge event
    pub fn as_charge(&self) -> Result<Transaction, serde_json::Error> {
        Transaction::deserialize(&self.data)
    }
}

/// A Paystack transaction as returned by verify and carried by charge events
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transaction {
    /// Processor reference
    #[serde(default)]
    pub reference: String,

    /// Transaction status, `success` when paid
    pub status: String,

    /// Amount in minor units (kobo)
    pub amount: u64,

    /// ISO currency code
    #[serde(default)]
    pub currency: Option<String>,

    /// Metadata attached at initialization
    #[serde(default)]
    pub metadata: PaymentMetadata,
}

impl Transaction {
    /// Whether the processor reports the charge as paid
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Identity fields echoed back in transaction metadata.
///
/// Paystack returns metadata as an object, a JSON-encoded string, or an
/// empty string depending on how it was sent; anything that is not an object
/// yields empty metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentMetadata {
    /// Subscriber email
    pub email: Option<String>,
    /// Device identifier
    pub device_id: Option<String>,
    /// Application identifier
    pub app_id: Option<String>,
}

impl PaymentMetadata {
    /// Read identity fields from an arbitrary metadata value
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_string);
                Self {
                    email: field("email"),
                    device_id: field("deviceId"),
                    app_id: field("appId"),
                }
            }
            Value::String(encoded) => serde_json::from_str::<Value>(encoded)
                .ok()
                .filter(Value::is_object)
                .map(|decoded| Self::from_value(&decoded))
                .unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// The identity triple, when all three fields are present and non-blank
    pub fn identity(&self) -> Option<SubscriptionKey> {
        SubscriptionKey::from_parts(
            self.email.as_deref(),
            self.device_id.as_deref(),
            self.app_id.as_deref(),
        )
    }
}

impl<'de> Deserialize<'de> for PaymentMetadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Metadata attached when initializing a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    /// Subscriber email
    pub email: String,
    /// Device identifier
    pub device_id: String,
    /// Application identifier
    pub app_id: String,
    /// Tag naming the client application
    pub app: String,
}

impl TransactionMetadata {
    /// Metadata for `key`, tagged with `app`
    pub fn for_key(key: &SubscriptionKey, app: &str) -> Self {
        Self {
            email: key.email().to_string(),
            device_id: key.device_id().to_string(),
            app_id: key.app_id().to_string(),
            app: app.to_string(),
        }
    }
}
