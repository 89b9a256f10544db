//! SQLite-backed subscription store.
//!
//! A single connection behind a mutex; every call runs on the blocking pool.
//! Both writes are single `INSERT ... ON CONFLICT DO UPDATE` statements, so
//! the "refuse if active" check in [`SqliteStore::upsert_pending`] and the
//! max-merge in [`SqliteStore::activate`] are atomic without extra locking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::store::{
    format_timestamp, parse_timestamp, SubscriptionKey, SubscriptionRecord, SubscriptionStore,
};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS subscriptions (
    email       TEXT NOT NULL,
    device_id   TEXT NOT NULL,
    app_id      TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 0,
    expires_at  TEXT,
    last_ref    TEXT,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (email, device_id, app_id)
);
"#;

const SELECT_RECORD: &str = "SELECT active, expires_at, last_ref FROM subscriptions \
     WHERE email = ?1 AND device_id = ?2 AND app_id = ?3";

// ?5 doubles as updated_at and the "now" the active check is made against.
const UPSERT_PENDING: &str = r#"
INSERT INTO subscriptions (email, device_id, app_id, active, expires_at, last_ref, updated_at)
VALUES (?1, ?2, ?3, 0, NULL, ?4, ?5)
ON CONFLICT (email, device_id, app_id) DO UPDATE SET
    active = 0,
    expires_at = NULL,
    last_ref = excluded.last_ref,
    updated_at = excluded.updated_at
WHERE NOT (
    subscriptions.active = 1
    AND subscriptions.expires_at IS NOT NULL
    AND subscriptions.expires_at > ?5
)
"#;

const ACTIVATE: &str = r#"
INSERT INTO subscriptions (email, device_id, app_id, active, expires_at, last_ref, updated_at)
VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)
ON CONFLICT (email, device_id, app_id) DO UPDATE SET
    active = 1,
    expires_at = CASE
        WHEN subscriptions.expires_at IS NOT NULL
             AND subscriptions.expires_at > excluded.expires_at
        THEN subscriptions.expires_at
        ELSE excluded.expires_at
    END,
    last_ref = excluded.last_ref,
    updated_at = excluded.updated_at
"#;

type RawRecord = (i64, Option<String>, Option<String>);

/// Subscription store persisted in a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Backend(format!("open {path}: {e}")))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Backend(format!("schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("spawn_blocking: {e}")))?
    }
}

fn select_record(
    conn: &Connection,
    key: &SubscriptionKey,
) -> Result<Option<SubscriptionRecord>, StoreError> {
    let raw: Option<RawRecord> = conn
        .query_row(
            SELECT_RECORD,
            params![key.email(), key.device_id(), key.app_id()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    raw.map(|(active, expires_at, last_ref)| {
        Ok::<_, StoreError>(SubscriptionRecord {
            active: active != 0,
            expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
            last_ref,
        })
    })
    .transpose()
}

#[async_trait::async_trait]
impl SubscriptionStore for SqliteStore {
    async fn get(&self, key: &SubscriptionKey) -> Result<Option<SubscriptionRecord>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| select_record(conn, &key)).await
    }

    async fn upsert_pending(
        &self,
        key: &SubscriptionKey,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = key.clone();
        let reference = reference.to_string();

        self.with_conn(move |conn| {
            let changed = conn.execute(
                UPSERT_PENDING,
                params![
                    key.email(),
                    key.device_id(),
                    key.app_id(),
                    reference,
                    format_timestamp(&now)
                ],
            )?;

            if changed > 0 {
                return Ok(());
            }

            // The WHERE clause only skips rows that are active and unexpired.
            let expires_at = select_record(conn, &key)?
                .and_then(|record| record.expires_at)
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("pending write for {key} skipped without expiry"))
                })?;
            Err(StoreError::Conflict { expires_at })
        })
        .await
    }

    async fn activate(
        &self,
        key: &SubscriptionKey,
        expires_at: DateTime<Utc>,
        reference: &str,
    ) -> Result<SubscriptionRecord, StoreError> {
        let key = key.clone();
        let reference = reference.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                ACTIVATE,
                params![
                    key.email(),
                    key.device_id(),
                    key.app_id(),
                    format_timestamp(&expires_at),
                    reference,
                    format_timestamp(&Utc::now())
                ],
            )?;

            select_record(conn, &key)?
                .ok_or_else(|| StoreError::Backend(format!("activated row for {key} vanished")))
        })
        .await
    }
}
