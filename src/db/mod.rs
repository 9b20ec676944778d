mod audit;
mod revoked;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use audit::{AuditLogStore, AuditRecord, StoredAuditRecord};
pub use revoked::RevokedTokenStore;

/// Current Unix time in milliseconds.
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Revoked token ids; rows become dead once expires_at_ms passes
                // and are physically removed by the cleanup scheduler.
                "CREATE TABLE revoked_tokens (
                    jti TEXT PRIMARY KEY,
                    expires_at_ms INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_revoked_tokens_expires ON revoked_tokens(expires_at_ms)",
                // One row per completed or failed request.
                "CREATE TABLE audit_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT,
                    username TEXT,
                    api_type TEXT NOT NULL,
                    ip TEXT,
                    method TEXT NOT NULL,
                    path TEXT NOT NULL,
                    params TEXT NOT NULL DEFAULT 'null',
                    status_code INTEGER NOT NULL,
                    action_type TEXT,
                    is_success INTEGER NOT NULL DEFAULT 0,
                    user_agent TEXT,
                    device TEXT NOT NULL DEFAULT 'null',
                    content TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_audit_logs_created_at ON audit_logs(created_at)",
                "CREATE INDEX idx_audit_logs_user_id ON audit_logs(user_id)",
                "CREATE INDEX idx_audit_logs_path ON audit_logs(path)",
            ],
        )
        .await
    }

    /// Get the audit log store.
    pub fn audit_logs(&self) -> AuditLogStore {
        AuditLogStore::new(self.pool.clone())
    }

    /// Get the revoked token store.
    pub fn revoked_tokens(&self) -> RevokedTokenStore {
        RevokedTokenStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
