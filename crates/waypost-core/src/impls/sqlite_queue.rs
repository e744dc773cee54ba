//! SQLite-backed durable queue.
//!
//! One table per queue. `INTEGER PRIMARY KEY AUTOINCREMENT` gives keys that
//! are strictly increasing and never reused, even after the newest row is
//! deleted. Every statement runs on tokio-rusqlite's dedicated connection
//! thread, so each append/remove is atomic with respect to the others.
//!
//! Several queues can share one connection (same file, different tables):
//! open it once with [`open_connection`] and [`SqliteQueue::attach`] each queue.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::domain::{Key, QueuePayload, StorageError};
use crate::ports::DurableQueue;

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn validate_table_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidQueueName(name.to_string()))
    }
}

/// Open (or create) the database file and apply connection pragmas.
pub async fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
    }

    info!(path = %path.display(), "Opening queue database");
    let conn = Connection::open(path).await.map_err(from_tokio_rusqlite)?;
    configure(&conn).await?;
    Ok(conn)
}

/// Private in-memory database (tests).
pub async fn open_in_memory_connection() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(from_tokio_rusqlite)?;
    configure(&conn).await?;
    Ok(conn)
}

async fn configure(conn: &Connection) -> Result<(), StorageError> {
    conn.call(|conn| {
        // journal_mode は結果行を返すので _and_check で読み捨てる
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    })
    .await
    .map_err(from_tokio_rusqlite)
}

pub struct SqliteQueue<P: QueuePayload> {
    conn: Connection,
    table: String,
    capacity: Option<usize>,
    _marker: PhantomData<fn() -> P>,
}

impl<P: QueuePayload> SqliteQueue<P> {
    /// Open `path` with a queue stored in `table`.
    pub async fn open(path: &Path, table: &str) -> Result<Self, StorageError> {
        let conn = open_connection(path).await?;
        Self::attach(conn, table).await
    }

    /// Use an already opened connection, creating `table` if needed.
    pub async fn attach(conn: Connection, table: &str) -> Result<Self, StorageError> {
        validate_table_name(table)?;

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"
        );
        conn.call(move |conn| {
            conn.execute_batch(&ddl)?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        debug!(table = %table, "Queue table ready");
        Ok(Self {
            conn,
            table: table.to_string(),
            capacity: None,
            _marker: PhantomData,
        })
    }

    /// Refuse appends once `capacity` entries are pending.
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn to_key<P>(id: i64) -> Result<Key<P>, StorageError> {
    u64::try_from(id)
        .map(Key::new)
        .map_err(|_| StorageError::Backend(format!("negative row id {id}")))
}

fn to_row_id<P>(key: Key<P>) -> Result<i64, StorageError> {
    i64::try_from(key.get()).map_err(|_| StorageError::Backend(format!("key {} out of range", key.get())))
}

#[async_trait]
impl<P: QueuePayload> DurableQueue<P> for SqliteQueue<P> {
    async fn append(&self, payload: P) -> Result<Key<P>, StorageError> {
        let json = serde_json::to_string(&payload)?;
        let created_at = chrono::Utc::now().to_rfc3339();
        let capacity = self.capacity;
        let count_sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        let insert_sql = format!(
            "INSERT INTO \"{}\" (payload, created_at) VALUES (?1, ?2)",
            self.table
        );

        let id = self
            .conn
            .call(move |conn| {
                if let Some(capacity) = capacity {
                    let pending: i64 = conn.query_row(&count_sql, [], |row| row.get(0))?;
                    if usize::try_from(pending).unwrap_or(usize::MAX) >= capacity {
                        return Ok(Err(StorageError::CapacityExceeded { capacity }));
                    }
                }
                conn.execute(&insert_sql, params![json, created_at])?;
                Ok(Ok(conn.last_insert_rowid()))
            })
            .await
            .map_err(from_tokio_rusqlite)??;

        let key = to_key(id)?;
        debug!(table = %self.table, key = key.get(), "Appended queue entry");
        Ok(key)
    }

    async fn next_after(&self, after: Option<Key<P>>) -> Result<Option<(Key<P>, P)>, StorageError> {
        let after = match after {
            Some(key) => to_row_id(key)?,
            None => 0,
        };
        let sql = format!(
            "SELECT id, payload FROM \"{}\" WHERE id > ?1 ORDER BY id LIMIT 1",
            self.table
        );

        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(&sql, params![after], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        match row {
            Some((id, json)) => {
                let payload: P = serde_json::from_str(&json)?;
                Ok(Some((to_key(id)?, payload)))
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, key: Key<P>) -> Result<(), StorageError> {
        let id = to_row_id(key)?;
        let sql = format!("DELETE FROM \"{}\" WHERE id = ?1", self.table);

        let deleted = self
            .conn
            .call(move |conn| Ok(conn.execute(&sql, params![id])?))
            .await
            .map_err(from_tokio_rusqlite)?;

        debug!(table = %self.table, key = key.get(), deleted, "Removed queue entry");
        Ok(())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        let count: i64 = self
            .conn
            .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
            .await
            .map_err(from_tokio_rusqlite)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coordinates, Metadata, Submission};
    use crate::ports::iterate;
    use chrono::Utc;
    use ulid::Ulid;

    fn submission(lat: f64, lng: f64) -> Submission {
        Submission {
            location: Coordinates::new(lat, lng).unwrap(),
            metadata: Metadata {
                submission_id: Ulid::new(),
                timestamp: Utc::now(),
                device: "test".into(),
                os: "test".into(),
            },
        }
    }

    async fn memory_queue() -> SqliteQueue<Submission> {
        let conn = open_in_memory_connection().await.unwrap();
        SqliteQueue::attach(conn, "unsaved").await.unwrap()
    }

    #[tokio::test]
    async fn append_then_iterate_in_key_order() {
        let q = memory_queue().await;
        let k1 = q.append(submission(1.0, 1.0)).await.unwrap();
        let k2 = q.append(submission(2.0, 2.0)).await.unwrap();
        let k3 = q.append(submission(3.0, 3.0)).await.unwrap();
        assert!(k1 < k2 && k2 < k3);

        let entries = iterate(&q).collect().await.unwrap();
        let lats: Vec<f64> = entries.iter().map(|(_, s)| s.location.lat).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
        assert_eq!(q.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn cursor_skips_rows_deleted_mid_iteration() {
        let q = memory_queue().await;
        let k1 = q.append(submission(1.0, 1.0)).await.unwrap();
        let k2 = q.append(submission(2.0, 2.0)).await.unwrap();
        let k3 = q.append(submission(3.0, 3.0)).await.unwrap();

        let mut cursor = iterate(&q);
        assert_eq!(cursor.next().await.unwrap().unwrap().0, k1);

        q.remove(k2).await.unwrap();
        let (key, next) = cursor.next().await.unwrap().unwrap();
        assert_eq!(key, k3);
        assert_eq!(next.location.lat, 3.0);
        assert!(cursor.next().await.unwrap().is_none());

        cursor.restart();
        assert_eq!(cursor.next().await.unwrap().unwrap().0, k1);
    }

    #[tokio::test]
    async fn out_of_range_stored_row_is_a_serialization_error() {
        let q = memory_queue().await;
        q.append(submission(1.0, 1.0)).await.unwrap();
        q.conn
            .call(|conn| {
                conn.execute(
                    "UPDATE \"unsaved\" SET payload = json_set(payload, '$.location.lat', 200.0)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let err = q.next_after(None).await.err().unwrap();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn open_connection_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("queue.db");

        let conn = open_connection(&path).await.unwrap();
        let q = SqliteQueue::<Submission>::attach(conn, "unsaved").await.unwrap();
        q.append(submission(1.0, 1.0)).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn autoincrement_never_reuses_the_newest_key() {
        let q = memory_queue().await;
        let k1 = q.append(submission(1.0, 1.0)).await.unwrap();
        q.remove(k1).await.unwrap();
        let k2 = q.append(submission(2.0, 2.0)).await.unwrap();
        assert!(k2 > k1);
    }

    #[tokio::test]
    async fn remove_missing_key_is_a_noop() {
        let q = memory_queue().await;
        let k1 = q.append(submission(1.0, 1.0)).await.unwrap();
        q.remove(k1).await.unwrap();
        q.remove(k1).await.unwrap();
        q.remove(Key::new(999)).await.unwrap();
        assert!(q.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let key = {
            let q: SqliteQueue<Submission> = SqliteQueue::open(&path, "unsaved").await.unwrap();
            q.append(submission(-6.2, 106.8)).await.unwrap()
        };

        let q: SqliteQueue<Submission> = SqliteQueue::open(&path, "unsaved").await.unwrap();
        let (front_key, front) = q.front().await.unwrap().unwrap();
        assert_eq!(front_key, key);
        assert_eq!(front.location, Coordinates::new(-6.2, 106.8).unwrap());
    }

    #[tokio::test]
    async fn queues_on_one_connection_are_disjoint() {
        let conn = open_in_memory_connection().await.unwrap();
        let a: SqliteQueue<Submission> = SqliteQueue::attach(conn.clone(), "a").await.unwrap();
        let b: SqliteQueue<Submission> = SqliteQueue::attach(conn, "b").await.unwrap();

        a.append(submission(1.0, 1.0)).await.unwrap();
        assert_eq!(a.len().await.unwrap(), 1);
        assert_eq!(b.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn capacity_limit_is_enforced() {
        let q = memory_queue().await.with_capacity_limit(2);
        q.append(submission(1.0, 1.0)).await.unwrap();
        q.append(submission(2.0, 2.0)).await.unwrap();
        let err = q.append(submission(3.0, 3.0)).await.unwrap_err();
        assert_eq!(err, StorageError::CapacityExceeded { capacity: 2 });
    }

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        let conn = open_in_memory_connection().await.unwrap();
        for name in ["", "x; DROP TABLE y", "1abc", "with space"] {
            let err = SqliteQueue::<Submission>::attach(conn.clone(), name)
                .await
                .err()
                .unwrap();
            assert_eq!(err, StorageError::InvalidQueueName(name.to_string()));
        }
    }
}
