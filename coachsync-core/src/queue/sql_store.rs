//! SQL-based storage implementation for the action queue

use super::errors::{StorageError, StorageResult};
use super::traits::{ActionQueueStore, QuarantinedAction};
use crate::model::{ActionId, ActionKind, ActionPayload, OfflineAction, UserId};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use serde::Serialize;
use tracing::{debug, warn};

/// Raw columns of a stored action, decoded outside the rusqlite row closure
struct StoredRow {
    id: String,
    kind: String,
    user_id: String,
    created_at: String,
    retry_count: Option<i64>,
    payload: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            user_id: row.get(2)?,
            created_at: row.get(3)?,
            retry_count: row.get(4)?,
            payload: row.get(5)?,
        })
    }

    fn into_action(self) -> StorageResult<OfflineAction> {
        let corrupted = |reason: String| StorageError::Corrupted {
            id: self.id.clone(),
            reason,
        };

        let kind = ActionKind::from_str(&self.kind)
            .ok_or_else(|| corrupted(format!("unknown kind '{}'", self.kind)))?;
        let payload: ActionPayload = serde_json::from_str(&self.payload)
            .map_err(|e| corrupted(format!("payload: {}", e)))?;
        if payload.kind() != kind {
            return Err(corrupted(format!(
                "kind column '{}' does not match payload '{}'",
                kind,
                payload.kind()
            )));
        }
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupted(format!("created_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(OfflineAction {
            id: ActionId::new(self.id.clone()),
            user_id: UserId::new(self.user_id.clone()),
            created_at,
            retry_count: self.retry_count.map(|n| n.max(0) as u32),
            payload,
        })
    }
}

/// A pending row set aside because it no longer decodes into an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptedRecord {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub reason: String,
    pub set_aside_at: String,
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// SQLite-backed action queue
///
/// Every operation is a single statement or a single transaction, so
/// producers and the drain never overwrite each other's records.
#[derive(Clone)]
pub struct SqlActionStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlActionStore {
    /// Create a new SQL store with the given connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StorageResult<Self> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(4).build(manager)?;
        Self::new(pool)
    }

    /// Create a new in-memory store
    ///
    /// The pool holds a single connection because every in-memory SQLite
    /// connection is its own database.
    pub fn memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    /// Rows set aside by a snapshot read, oldest first
    pub async fn corrupted_records(&self) -> StorageResult<Vec<CorruptedRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, payload, reason, set_aside_at
                 FROM corrupted_actions ORDER BY set_aside_at ASC, id ASC",
            )?;
            let records = stmt
                .query_map([], |row| {
                    Ok(CorruptedRecord {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        payload: row.get(2)?,
                        reason: row.get(3)?,
                        set_aside_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

fn insert_pending(conn: &Connection, action: &OfflineAction) -> StorageResult<usize> {
    let payload = serde_json::to_string(&action.payload)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO pending_actions (id, kind, user_id, created_at, retry_count, payload)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6
         WHERE NOT EXISTS (SELECT 1 FROM quarantined_actions WHERE id = ?1)",
        params![
            action.id.as_str(),
            action.kind().as_str(),
            action.user_id.as_str(),
            format_ts(&action.created_at),
            action.retry_count.map(|n| n as i64),
            payload,
        ],
    )?;
    Ok(inserted)
}

/// Decode the pending rows in queue order
///
/// A row that no longer decodes (bad JSON, a kind this build does not know)
/// is moved to `corrupted_actions` so the rows behind it still drain.
fn load_pending(conn: &mut Connection) -> StorageResult<Vec<OfflineAction>> {
    let rows = {
        let mut stmt = conn.prepare(
            "SELECT id, kind, user_id, created_at, retry_count, payload
             FROM pending_actions ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut actions = Vec::with_capacity(rows.len());
    let mut undecodable = Vec::new();
    for stored in rows {
        let id = stored.id.clone();
        match stored.into_action() {
            Ok(action) => actions.push(action),
            Err(e) => {
                warn!(action_id = %id, error = %e, "Pending row does not decode, setting it aside");
                undecodable.push((id, e.to_string()));
            }
        }
    }

    if !undecodable.is_empty() {
        set_aside(conn, &undecodable)?;
    }
    Ok(actions)
}

fn set_aside(conn: &mut Connection, rows: &[(String, String)]) -> StorageResult<()> {
    let now = format_ts(&Utc::now());
    let tx = conn.transaction()?;
    for (id, reason) in rows {
        tx.execute(
            "INSERT OR REPLACE INTO corrupted_actions
                (id, kind, user_id, created_at, retry_count, payload, reason, set_aside_at)
             SELECT id, kind, user_id, created_at, retry_count, payload, ?2, ?3
             FROM pending_actions WHERE id = ?1",
            params![id, reason, now],
        )?;
        tx.execute("DELETE FROM pending_actions WHERE id = ?", params![id])?;
    }
    tx.commit()?;
    Ok(())
}

fn load_quarantined(conn: &Connection) -> StorageResult<Vec<QuarantinedAction>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, user_id, created_at, retry_count, payload, reason, quarantined_at
         FROM quarantined_actions ORDER BY quarantined_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                StoredRow::from_row(row)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(stored, reason, quarantined_at)| {
            let id = stored.id.clone();
            let action = stored.into_action()?;
            let quarantined_at = DateTime::parse_from_rfc3339(&quarantined_at)
                .map_err(|e| StorageError::Corrupted {
                    id,
                    reason: format!("quarantined_at: {}", e),
                })?
                .with_timezone(&Utc);
            Ok(QuarantinedAction {
                action,
                reason,
                quarantined_at,
            })
        })
        .collect()
}

#[async_trait]
impl ActionQueueStore for SqlActionStore {
    async fn enqueue(&self, action: &OfflineAction) -> StorageResult<()> {
        let action = action.clone();
        self.with_conn(move |conn| {
            let inserted = insert_pending(conn, &action)?;
            if inserted == 0 {
                debug!(action_id = %action.id, "Action already stored, enqueue ignored");
            } else {
                debug!(action_id = %action.id, kind = %action.kind(), "Action enqueued");
                crate::metrics::record_enqueued();
            }
            Ok(())
        })
        .await
    }

    async fn get_pending_actions(&self) -> StorageResult<Vec<OfflineAction>> {
        self.with_conn(load_pending).await
    }

    async fn remove_action(&self, id: &ActionId) -> StorageResult<()> {
        let id = id.clone();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM pending_actions WHERE id = ?", params![id.as_str()])?;
            Ok(())
        })
        .await
    }

    async fn pending_count(&self) -> StorageResult<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))?;
            Ok(count.max(0) as usize)
        })
        .await
    }

    async fn quarantine_action(&self, id: &ActionId, reason: &str) -> StorageResult<()> {
        let id = id.clone();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO quarantined_actions
                    (id, kind, user_id, created_at, retry_count, payload, reason, quarantined_at)
                 SELECT id, kind, user_id, created_at, retry_count, payload, ?2, ?3
                 FROM pending_actions WHERE id = ?1",
                params![id.as_str(), reason, format_ts(&Utc::now())],
            )?;
            tx.execute("DELETE FROM pending_actions WHERE id = ?", params![id.as_str()])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_quarantined_actions(&self) -> StorageResult<Vec<QuarantinedAction>> {
        self.with_conn(|conn| load_quarantined(conn)).await
    }

    async fn requeue_quarantined(&self, id: &ActionId) -> StorageResult<bool> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO pending_actions (id, kind, user_id, created_at, retry_count, payload)
                 SELECT id, kind, user_id, created_at, retry_count, payload
                 FROM quarantined_actions WHERE id = ?",
                params![id.as_str()],
            )?;
            let moved = tx.execute(
                "DELETE FROM quarantined_actions WHERE id = ?",
                params![id.as_str()],
            )?;
            tx.commit()?;
            Ok(moved > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{custom_meal_action, meal_log_action, weight_action};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_preserves_created_at() {
        let store = SqlActionStore::memory().unwrap();
        let action = meal_log_action("u1", "item-1", true);

        store.enqueue(&action).await.unwrap();
        let pending = store.get_pending_actions().await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], action);
    }

    #[tokio::test]
    async fn test_fifo_order_and_removal() {
        let store = SqlActionStore::memory().unwrap();
        let a = weight_action("u1", 80.0);
        let b = custom_meal_action("u1", "plan-1", "Oats");
        let c = meal_log_action("u1", "item-2", false);

        for action in [&a, &b, &c] {
            store.enqueue(action).await.unwrap();
        }
        store.remove_action(&b.id).await.unwrap();
        store.remove_action(&b.id).await.unwrap();

        let ids: Vec<_> = store
            .get_pending_actions()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_ignored() {
        let store = SqlActionStore::memory().unwrap();
        let a = weight_action("u1", 80.0);

        store.enqueue(&a).await.unwrap();
        store.enqueue(&a).await.unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_quarantine_moves_record() {
        let store = SqlActionStore::memory().unwrap();
        let a = weight_action("u1", 80.0);
        store.enqueue(&a).await.unwrap();

        store.quarantine_action(&a.id, "permission denied").await.unwrap();
        // Second call finds nothing pending and changes nothing
        store.quarantine_action(&a.id, "again").await.unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 0);
        let quarantined = store.get_quarantined_actions().await.unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].action, a);
        assert_eq!(quarantined[0].reason, "permission denied");

        // Quarantined ids cannot sneak back in through enqueue
        store.enqueue(&a).await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 0);

        assert!(store.requeue_quarantined(&a.id).await.unwrap());
        assert_eq!(store.pending_count().await.unwrap(), 1);
        assert!(store.get_quarantined_actions().await.unwrap().is_empty());
    }

    fn insert_raw(store: &SqlActionStore, id: &'static str, kind: &'static str, payload: &'static str) {
        let conn = store.pool.get().unwrap();
        conn.execute(
            "INSERT INTO pending_actions (id, kind, user_id, created_at, payload)
             VALUES (?1, ?2, 'u1', '2024-01-01T00:00:00Z', ?3)",
            params![id, kind, payload],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_rows_are_set_aside() {
        let store = SqlActionStore::memory().unwrap();
        let first = weight_action("u1", 80.0);
        let last = weight_action("u1", 81.0);

        store.enqueue(&first).await.unwrap();
        insert_raw(&store, "bad-json", "log_weight", "not json");
        insert_raw(&store, "newer-kind", "log_sleep", "{}");
        store.enqueue(&last).await.unwrap();

        let pending = store.get_pending_actions().await.unwrap();
        assert_eq!(pending, vec![first, last]);
        assert_eq!(store.pending_count().await.unwrap(), 2);

        let records = store.corrupted_records().await.unwrap();
        let mut ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["bad-json", "newer-kind"]);
        let newer = records.iter().find(|r| r.id == "newer-kind").unwrap();
        assert_eq!(newer.kind, "log_sleep");
        assert!(newer.reason.contains("unknown kind 'log_sleep'"));

        // Already moved; a second snapshot sees only the good rows
        assert_eq!(store.get_pending_actions().await.unwrap().len(), 2);
        assert_eq!(store.corrupted_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        let a = weight_action("u1", 80.0);

        {
            let store = SqlActionStore::open(&path).unwrap();
            store.enqueue(&a).await.unwrap();
        }

        let reopened = SqlActionStore::open(&path).unwrap();
        let pending = reopened.get_pending_actions().await.unwrap();
        assert_eq!(pending, vec![a]);
    }

    #[tokio::test]
    async fn test_interleaved_enqueue_and_remove() {
        let store = std::sync::Arc::new(SqlActionStore::memory().unwrap());
        let initial: Vec<_> = (0..20).map(|i| weight_action("u1", 60.0 + i as f64)).collect();
        for action in &initial {
            store.enqueue(action).await.unwrap();
        }

        let producer = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut added = Vec::new();
                for i in 0..20 {
                    let action = weight_action("u2", 90.0 + i as f64);
                    store.enqueue(&action).await.unwrap();
                    added.push(action.id);
                }
                added
            })
        };
        let consumer = {
            let store = store.clone();
            let ids: Vec<_> = initial.iter().map(|a| a.id.clone()).collect();
            tokio::spawn(async move {
                for id in ids {
                    store.remove_action(&id).await.unwrap();
                }
            })
        };

        let added = producer.await.unwrap();
        consumer.await.unwrap();

        let remaining: Vec<_> = store
            .get_pending_actions()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(remaining, added);
    }
}
