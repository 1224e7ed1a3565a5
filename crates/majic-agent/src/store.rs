//! SQLite-backed response partitions.
//!
//! Each partition maps a request key to the last successful response stored
//! for it. Writes replace the entry for a key atomically, so a reader sees
//! either the old response or the new one.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use majic_core::{RusqliteErrorExt, StorageError};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::network::NetworkResponse;

/// Hex SHA-256 of a response body.
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// A response as stored in a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub request_key: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub content_hash: String,
    pub stored_at: DateTime<Utc>,
}

/// Named response partitions in one SQLite database.
pub struct PartitionStore {
    conn: Mutex<Connection>,
}

type StoreResult<T> = std::result::Result<T, StorageError>;

impl PartitionStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::OpenFailed(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path).map_err(|e| e.into_storage_error())?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| e.into_storage_error())?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS partitions (
                name TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                partition TEXT NOT NULL,
                request_key TEXT NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT,
                body BLOB NOT NULL,
                content_hash TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                PRIMARY KEY (partition, request_key)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_partition ON entries(partition);
            "#,
            )
            .map_err(|e| e.into_storage_error())
    }

    /// Create the partition if it does not exist yet.
    pub fn open_partition(&self, name: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        ensure_partition(&conn, name)
    }

    /// Names of all existing partitions, oldest first.
    pub fn partition_names(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM partitions ORDER BY created_at, name")
            .map_err(|e| e.into_storage_error())?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| e.into_storage_error())?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.into_storage_error())
    }

    /// Delete a partition and everything in it. Returns false if it did not exist.
    pub fn delete_partition(&self, name: &str) -> StoreResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| e.into_storage_error())?;
        tx.execute("DELETE FROM entries WHERE partition = ?1", params![name])
            .map_err(|e| e.into_storage_error())?;
        let removed = tx
            .execute("DELETE FROM partitions WHERE name = ?1", params![name])
            .map_err(|e| e.into_storage_error())?;
        tx.commit().map_err(|e| e.into_storage_error())?;
        Ok(removed > 0)
    }

    pub fn get(&self, partition: &str, request_key: &str) -> StoreResult<Option<CachedResponse>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
            SELECT request_key, status, content_type, body, content_hash, stored_at
            FROM entries WHERE partition = ?1 AND request_key = ?2
            "#,
            params![partition, request_key],
            |row| {
                let stored_ms: i64 = row.get(5)?;
                Ok(CachedResponse {
                    request_key: row.get(0)?,
                    status: row.get(1)?,
                    content_type: row.get(2)?,
                    body: row.get(3)?,
                    content_hash: row.get(4)?,
                    stored_at: Utc
                        .timestamp_millis_opt(stored_ms)
                        .single()
                        .unwrap_or_default(),
                })
            },
        )
        .optional()
        .map_err(|e| e.into_storage_error())
    }

    /// Store a response, replacing any previous entry for the key.
    pub fn put(
        &self,
        partition: &str,
        request_key: &str,
        response: &NetworkResponse,
    ) -> StoreResult<CachedResponse> {
        let conn = self.conn.lock();
        ensure_partition(&conn, partition)?;
        insert_entry(&conn, partition, request_key, response)
    }

    /// Store several responses in one transaction. Either all are written or none.
    pub fn put_all(
        &self,
        partition: &str,
        responses: &[(String, NetworkResponse)],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| e.into_storage_error())?;
        ensure_partition(&tx, partition)?;
        for (key, response) in responses {
            insert_entry(&tx, partition, key, response)?;
        }
        tx.commit().map_err(|e| e.into_storage_error())
    }

    pub fn entry_count(&self, partition: &str) -> StoreResult<usize> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE partition = ?1",
            params![partition],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(|e| e.into_storage_error())
    }
}

fn ensure_partition(conn: &Connection, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, Utc::now().timestamp_millis()],
    )
    .map_err(|e| e.into_storage_error())?;
    Ok(())
}

fn insert_entry(
    conn: &Connection,
    partition: &str,
    request_key: &str,
    response: &NetworkResponse,
) -> StoreResult<CachedResponse> {
    let stored_at = Utc::now();
    let hash = content_hash(&response.body);
    conn.execute(
        r#"
        INSERT OR REPLACE INTO entries
        (partition, request_key, status, content_type, body, content_hash, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            partition,
            request_key,
            response.status,
            response.content_type,
            response.body,
            hash,
            stored_at.timestamp_millis(),
        ],
    )
    .map_err(|e| e.into_storage_error())?;

    Ok(CachedResponse {
        request_key: request_key.to_string(),
        status: response.status,
        content_type: response.content_type.clone(),
        body: response.body.clone(),
        content_hash: hash,
        stored_at,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn response(body: &str) -> NetworkResponse {
        NetworkResponse::new(200, Some("application/json"), body.as_bytes().to_vec())
    }

    #[test]
    fn test_put_and_get() {
        let store = PartitionStore::in_memory().unwrap();
        store
            .put("majic-dynamic-v3", "/api/calendar", &response("[]"))
            .unwrap();

        let entry = store
            .get("majic-dynamic-v3", "/api/calendar")
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, b"[]");
        assert_eq!(entry.content_type.as_deref(), Some("application/json"));
        assert_eq!(entry.content_hash, content_hash(b"[]"));
    }

    #[test]
    fn test_get_missing() {
        let store = PartitionStore::in_memory().unwrap();
        assert!(store.get("nope", "/api/calendar").unwrap().is_none());
    }

    #[test]
    fn test_partitions_are_isolated() {
        let store = PartitionStore::in_memory().unwrap();
        store.put("a", "/x", &response("1")).unwrap();
        assert!(store.get("b", "/x").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces() {
        let store = PartitionStore::in_memory().unwrap();
        store.put("a", "/x", &response("old")).unwrap();
        store.put("a", "/x", &response("new")).unwrap();

        assert_eq!(store.get("a", "/x").unwrap().unwrap().body, b"new");
        assert_eq!(store.entry_count("a").unwrap(), 1);
    }

    #[test]
    fn test_delete_partition() {
        let store = PartitionStore::in_memory().unwrap();
        store.put("a", "/x", &response("1")).unwrap();
        store.put("b", "/x", &response("2")).unwrap();

        assert!(store.delete_partition("a").unwrap());
        assert!(!store.delete_partition("a").unwrap());
        assert_eq!(store.partition_names().unwrap(), vec!["b".to_string()]);
        assert!(store.get("a", "/x").unwrap().is_none());
        assert!(store.get("b", "/x").unwrap().is_some());
    }

    #[test]
    fn test_open_partition_is_idempotent() {
        let store = PartitionStore::in_memory().unwrap();
        store.open_partition("a").unwrap();
        store.open_partition("a").unwrap();
        assert_eq!(store.partition_names().unwrap().len(), 1);
        assert_eq!(store.entry_count("a").unwrap(), 0);
    }

    #[test]
    fn test_put_all() {
        let store = PartitionStore::in_memory().unwrap();
        let batch = vec![
            ("/".to_string(), response("<html>")),
            ("/style.css".to_string(), response("body{}")),
        ];
        store.put_all("majic-static-v3", &batch).unwrap();
        assert_eq!(store.entry_count("majic-static-v3").unwrap(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent").join("cache.db");

        {
            let store = PartitionStore::new(&path).unwrap();
            store.put("majic-offline", "/api/calendar", &response("[1]")).unwrap();
        }

        let store = PartitionStore::new(&path).unwrap();
        let entry = store.get("majic-offline", "/api/calendar").unwrap().unwrap();
        assert_eq!(entry.body, b"[1]");
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"").len(), 64);
    }
}
