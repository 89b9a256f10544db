//! In-memory subscription store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::store::{SubscriptionKey, SubscriptionRecord, SubscriptionStore};

/// `HashMap`-backed store. Each write holds the lock for its whole
/// check-and-set, so it gives the same atomicity as a single SQL statement.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<SubscriptionKey, SubscriptionRecord>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn get(&self, key: &SubscriptionKey) -> Result<Option<SubscriptionRecord>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn upsert_pending(
        &self,
        key: &SubscriptionKey,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();

        if let Some(existing) = records.get(key) {
            if let Some(expires_at) = existing.live_expiry(now) {
                return Err(StoreError::Conflict { expires_at });
            }
        }

        records.insert(key.clone(), SubscriptionRecord::pending(reference));
        Ok(())
    }

    async fn activate(
        &self,
        key: &SubscriptionKey,
        expires_at: DateTime<Utc>,
        reference: &str,
    ) -> Result<SubscriptionRecord, StoreError> {
        let mut records = self.records.write();
        let record = records.entry(key.clone()).or_default();

        record.active = true;
        record.expires_at = Some(match record.expires_at {
            Some(current) if current > expires_at => current,
            _ => expires_at,
        });
        record.last_ref = Some(reference.to_string());

        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn key() -> SubscriptionKey {
        SubscriptionKey::new("a@b.com", "d1", "app1").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_get_absent_record() {
        let store = InMemoryStore::new();
        assert!(store.get(&key()).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_pending_then_activate() {
        let store = InMemoryStore::new();
        store.upsert_pending(&key(), "ref1", now()).await.unwrap();

        let pending = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(pending, SubscriptionRecord::pending("ref1"));

        let expires_at = now() + Duration::days(30);
        let record = store.activate(&key(), expires_at, "ref1").await.unwrap();
        assert!(record.active);
        assert_eq!(record.expires_at, Some(expires_at));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_activate_never_shortens() {
        let store = InMemoryStore::new();
        let later = now() + Duration::days(60);
        store.activate(&key(), later, "ref1").await.unwrap();

        let record = store
            .activate(&key(), now() + Duration::days(30), "ref2")
            .await
            .unwrap();
        assert_eq!(record.expires_at, Some(later));
        assert_eq!(record.last_ref.as_deref(), Some("ref2"));
    }

    #[tokio::test]
    async fn test_pending_refused_while_active() {
        let store = InMemoryStore::new();
        let expires_at = now() + Duration::days(30);
        store.activate(&key(), expires_at, "ref1").await.unwrap();

        let err = store
            .upsert_pending(&key(), "ref2", now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expires_at: e } if e == expires_at));

        let record = store.get(&key()).await.unwrap().unwrap();
        assert!(record.active);
        assert_eq!(record.last_ref.as_deref(), Some("ref1"));
    }

    #[tokio::test]
    async fn test_pending_replaces_expired_subscription() {
        let store = InMemoryStore::new();
        store
            .activate(&key(), now() - Duration::days(1), "old")
            .await
            .unwrap();

        store.upsert_pending(&key(), "new", now()).await.unwrap();
        let record = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(record, SubscriptionRecord::pending("new"));
    }
}
