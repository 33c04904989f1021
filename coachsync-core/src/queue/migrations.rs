//! Database migrations for the action queue
//!
//! Each migration is applied atomically and tracked in the
//! queue_schema_version table.

use super::errors::{StorageError, StorageResult};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Current schema version for the action queue
pub const CURRENT_QUEUE_SCHEMA_VERSION: i32 = 3;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Pending actions queue",
            up_sql: r#"
                -- seq gives FIFO order independent of client clocks
                CREATE TABLE IF NOT EXISTS pending_actions (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,                -- ActionId
                    kind TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL,               -- RFC 3339, nanosecond precision
                    retry_count INTEGER,
                    payload TEXT NOT NULL                   -- ActionPayload as JSON
                );

                CREATE INDEX IF NOT EXISTS idx_pending_actions_user ON pending_actions(user_id);
            "#,
        },
        Migration {
            version: 2,
            description: "Quarantine for terminally failed actions",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS quarantined_actions (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    retry_count INTEGER,
                    payload TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    quarantined_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_quarantined_at ON quarantined_actions(quarantined_at);
            "#,
        },
        Migration {
            version: 3,
            description: "Rows that no longer decode into an action",
            up_sql: r#"
                -- Raw columns are kept as stored so a later build can recover them
                CREATE TABLE IF NOT EXISTS corrupted_actions (
                    id TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    retry_count INTEGER,
                    payload TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    set_aside_at TEXT NOT NULL
                );
            "#,
        },
    ]
}

fn get_current_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS queue_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM queue_schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> StorageResult<()> {
    let conn = pool.get()?;
    let current_version = get_current_version(&conn)?;

    let pending_migrations: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    for migration in pending_migrations {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.up_sql).map_err(|e| {
            StorageError::Migration(format!("v{} failed: {}", migration.version, e))
        })?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        tx.execute(
            "INSERT INTO queue_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now],
        )?;

        tx.commit()?;

        info!(
            version = migration.version,
            "Applied queue migration: {}", migration.description
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        let manager = SqliteConnectionManager::memory();
        Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create pool")
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"pending_actions".to_string()));
        assert!(tables.contains(&"quarantined_actions".to_string()));
        assert!(tables.contains(&"corrupted_actions".to_string()));
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = setup_test_pool();

        migrate(&pool).expect("First migration failed");
        migrate(&pool).expect("Second migration failed");

        let conn = pool.get().unwrap();
        let version = get_current_version(&conn).expect("Failed to get version");
        assert_eq!(version, CURRENT_QUEUE_SCHEMA_VERSION);
    }

    #[test]
    fn test_action_id_is_unique() {
        let pool = setup_test_pool();
        migrate(&pool).unwrap();
        let conn = pool.get().unwrap();

        let insert = "INSERT INTO pending_actions (id, kind, user_id, created_at, payload)
                      VALUES ('a1', 'log_weight', 'u1', '2024-01-01T00:00:00Z', '{}')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
