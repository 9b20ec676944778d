//! Audit log persistence.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// A record ready to be persisted, built by the audit writer.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub user_id: Option<String>,
    pub username: Option<String>,
    /// Logical API surface the request hit ("admin", "client" or "default")
    pub api_type: String,
    pub ip: Option<String>,
    pub method: String,
    pub path: String,
    /// Sanitized request parameters (query/body), secrets already redacted
    pub params: serde_json::Value,
    pub status_code: u16,
    /// Optional handler-declared action label (e.g. "logout")
    pub action_type: Option<String>,
    pub is_success: bool,
    pub user_agent: Option<String>,
    /// Parsed device info
    pub device: serde_json::Value,
    /// Human-readable summary line
    pub content: String,
}

/// A persisted audit record as read back from the database.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAuditRecord {
    pub id: i64,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub api_type: String,
    pub ip: Option<String>,
    pub method: String,
    pub path: String,
    pub params: serde_json::Value,
    pub status_code: u16,
    pub action_type: Option<String>,
    pub is_success: bool,
    pub user_agent: Option<String>,
    pub device: serde_json::Value,
    pub content: String,
    pub created_at: String,
}

/// Store for audit log records.
#[derive(Clone)]
pub struct AuditLogStore {
    pool: SqlitePool,
}

type AuditRow = (
    i64,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    String,
    String,
    String,
    i64,
    Option<String>,
    i64,
    Option<String>,
    String,
    String,
    String,
);

fn row_to_record(row: AuditRow) -> StoredAuditRecord {
    let (
        id,
        user_id,
        username,
        api_type,
        ip,
        method,
        path,
        params,
        status_code,
        action_type,
        is_success,
        user_agent,
        device,
        content,
        created_at,
    ) = row;
    StoredAuditRecord {
        id,
        user_id,
        username,
        api_type,
        ip,
        method,
        path,
        params: serde_json::from_str(&params).unwrap_or(serde_json::Value::Null),
        status_code: status_code as u16,
        action_type,
        is_success: is_success != 0,
        user_agent,
        device: serde_json::from_str(&device).unwrap_or(serde_json::Value::Null),
        content,
        created_at,
    }
}

const SELECT_COLUMNS: &str = "id, user_id, username, api_type, ip, method, path, params, \
     status_code, action_type, is_success, user_agent, device, content, created_at";

impl AuditLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record. Returns the new row id.
    pub async fn insert(&self, record: &AuditRecord) -> Result<i64, sqlx::Error> {
        let params = record.params.to_string();
        let device = record.device.to_string();

        let result = sqlx::query(
            "INSERT INTO audit_logs
                (user_id, username, api_type, ip, method, path, params,
                 status_code, action_type, is_success, user_agent, device, content)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.user_id)
        .bind(&record.username)
        .bind(&record.api_type)
        .bind(&record.ip)
        .bind(&record.method)
        .bind(&record.path)
        .bind(&params)
        .bind(record.status_code as i64)
        .bind(&record.action_type)
        .bind(record.is_success as i64)
        .bind(&record.user_agent)
        .bind(&device)
        .bind(&record.content)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// List the most recent records, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<StoredAuditRecord>, sqlx::Error> {
        let rows: Vec<AuditRow> = sqlx::query_as(sqlx::AssertSqlSafe(format!(
            "SELECT {} FROM audit_logs ORDER BY id DESC LIMIT ?",
            SELECT_COLUMNS
        )))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// List all records for a given path, newest first.
    pub async fn list_by_path(&self, path: &str) -> Result<Vec<StoredAuditRecord>, sqlx::Error> {
        let rows: Vec<AuditRow> = sqlx::query_as(sqlx::AssertSqlSafe(format!(
            "SELECT {} FROM audit_logs WHERE path = ? ORDER BY id DESC",
            SELECT_COLUMNS
        )))
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// Total number of records.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Delete records older than the given number of days.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64, sqlx::Error> {
        let modifier = format!("-{} days", days);
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < datetime('now', ?)")
            .bind(&modifier)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
