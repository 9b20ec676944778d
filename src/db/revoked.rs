//! SQLite-backed revoked token storage.
//!
//! Rows are written with an absolute expiry; lookups filter on it, so a
//! row whose expiry has passed reads as "not revoked" even before the
//! cleanup scheduler physically deletes it.

use sqlx::sqlite::SqlitePool;

use super::now_ms;

/// Store for revoked token ids (`jti`).
#[derive(Clone)]
pub struct RevokedTokenStore {
    pool: SqlitePool,
}

impl RevokedTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a revoked `jti` that stays effective for `ttl_ms`.
    /// A non-positive TTL is a no-op: the token is already expired and
    /// can never verify again, so there is nothing to revoke.
    pub async fn add(&self, jti: &str, ttl_ms: i64) -> Result<(), sqlx::Error> {
        if ttl_ms <= 0 {
            return Ok(());
        }
        let expires_at_ms = now_ms() + ttl_ms;

        sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at_ms) VALUES (?, ?)
             ON CONFLICT(jti) DO UPDATE SET expires_at_ms = excluded.expires_at_ms",
        )
        .bind(jti)
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Check whether a `jti` is currently revoked.
    pub async fn is_revoked(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM revoked_tokens WHERE jti = ? AND expires_at_ms > ?")
                .bind(jti)
                .bind(now_ms())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Delete all rows whose expiry has passed. Returns the number removed.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at_ms <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
