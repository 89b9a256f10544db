//! Subscription Store
//!
//! One record per identity triple `(email, deviceId, appId)`. The store is a
//! pure data-access seam: it knows nothing about payments, only how to read a
//! record, write a pending record without clobbering an active one, and apply
//! an activation that never regresses.
//!
//! # Implementations
//!
//! - [`InMemoryStore`] - `HashMap` behind a lock, for tests and ephemeral runs
//! - [`SqliteStore`] - single SQLite table, one statement per write

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::StoreError;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Identity triple a subscription is granted to.
///
/// The email is trimmed and lowercased; device and app identifiers are
/// trimmed. A triple with any blank component cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    email: String,
    device_id: String,
    app_id: String,
}

impl SubscriptionKey {
    /// Build a normalized key, or `None` if any component is blank.
    pub fn new(email: &str, device_id: &str, app_id: &str) -> Option<Self> {
        let email = email.trim().to_lowercase();
        let device_id = device_id.trim();
        let app_id = app_id.trim();

        if email.is_empty() || device_id.is_empty() || app_id.is_empty() {
            return None;
        }

        Some(Self {
            email,
            device_id: device_id.to_string(),
            app_id: app_id.to_string(),
        })
    }

    /// Build a key from optional parts, as found in query strings and metadata.
    pub fn from_parts(
        email: Option<&str>,
        device_id: Option<&str>,
        app_id: Option<&str>,
    ) -> Option<Self> {
        Self::new(email?, device_id?, app_id?)
    }

    /// Normalized (lowercase) email
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Device identifier
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Application identifier
    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.email, self.device_id, self.app_id)
    }
}

/// The persisted subscription state for one identity triple.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionRecord {
    /// Whether the last applied payment activated the subscription
    pub active: bool,
    /// End of the paid window
    pub expires_at: Option<DateTime<Utc>>,
    /// Most recently applied processor reference
    pub last_ref: Option<String>,
}

impl SubscriptionRecord {
    /// A record awaiting payment for `reference`.
    pub fn pending(reference: &str) -> Self {
        Self {
            active: false,
            expires_at: None,
            last_ref: Some(reference.to_string()),
        }
    }

    /// Active and not yet expired at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_some_and(|expires_at| expires_at > now)
    }

    /// Expiry paid for by `reference`, when it is the reference already
    /// applied to an active record. Ignores whether that window is still open.
    pub fn applied_expiry(&self, reference: &str) -> Option<DateTime<Utc>> {
        if self.active && self.last_ref.as_deref() == Some(reference) {
            self.expires_at
        } else {
            None
        }
    }

    /// Expiry, only when the subscription is live at `now`.
    pub fn live_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_active_at(now) {
            self.expires_at
        } else {
            None
        }
    }
}

/// Storage seam shared by the handlers and the reconciliation engine.
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Fetch the record for `key`, if any.
    async fn get(&self, key: &SubscriptionKey) -> Result<Option<SubscriptionRecord>, StoreError>;

    /// Record a freshly initialized payment.
    ///
    /// Fails with [`StoreError::Conflict`] and leaves the record untouched when
    /// a subscription is active and unexpired at `now`.
    async fn upsert_pending(
        &self,
        key: &SubscriptionKey,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark the subscription active with at least `expires_at`.
    ///
    /// Keeps the later of the stored and given expiry, so repeating the call
    /// never shortens the window. Creates the record if it does not exist.
    async fn activate(
        &self,
        key: &SubscriptionKey,
        expires_at: DateTime<Utc>,
        reference: &str,
    ) -> Result<SubscriptionRecord, StoreError>;
}

/// Render a timestamp in the wire/storage format: RFC 3339, UTC, milliseconds.
///
/// Fixed width, so string order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_timestamp`] (or any RFC 3339 value).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {value:?}: {e}")))
}
