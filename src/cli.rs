//! CLI argument parsing, validation, and startup helpers.

use crate::{ServerConfig, audit::AuditConfig, db::Database};
use clap::Parser;
use std::time::Duration;
use tracing::error;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Gatelog",
    about = "Session token lifecycle and request audit logging service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7320")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "gatelog.db")]
    pub database: String,

    /// Audience stamped into and required of every token (e.g. "admin" or "client")
    #[arg(long, default_value = "client")]
    pub audience: String,

    /// Issuer label stamped into tokens
    #[arg(long)]
    pub issuer: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "900")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value = "1209600")]
    pub refresh_ttl_secs: u64,

    /// Path to file containing the access token secret.
    /// Prefer using the JWT_ACCESS_SECRET env var instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret.
    /// Prefer using the JWT_REFRESH_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Keep the revocation blacklist in process memory instead of the
    /// database (single-instance deployments only)
    #[arg(long)]
    pub in_memory_blacklist: bool,

    /// Days to keep audit records before cleanup deletes them
    #[arg(long, default_value = "90")]
    pub audit_retention_days: u32,

    /// Maximum serialized size of captured request params, in bytes
    #[arg(long, default_value = "8192")]
    pub max_payload_bytes: usize,

    /// Maximum request body size buffered for capture, in bytes; larger
    /// or unsized bodies pass through unrecorded
    #[arg(long, default_value = "65536")]
    pub max_capture_bytes: usize,

    /// Request paths excluded from audit capture (repeatable)
    #[arg(long = "skip-audit-path", default_value = "/api/health")]
    pub skip_audit_paths: Vec<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "Secret is required. Set the {} environment variable (recommended) or use the matching --*-secret-file flag",
            env_var
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "Secret from {} must be at least {} characters",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the access/refresh signing secrets from environment variables or
/// files. The two secrets must differ; sharing one would collapse the
/// access/refresh distinction.
pub fn load_jwt_secrets(args: &Args) -> Option<(Vec<u8>, Vec<u8>)> {
    let access = load_secret("JWT_ACCESS_SECRET", args.access_secret_file.as_deref())?;
    let refresh = load_secret("JWT_REFRESH_SECRET", args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("Access and refresh token secrets must be different");
        return None;
    }

    Some((access.into_bytes(), refresh.into_bytes()))
}

/// Open the database, logging on failure.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => Some(db),
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Build the server configuration from parsed arguments and secrets.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
) -> ServerConfig {
    let audit = AuditConfig {
        max_payload_bytes: args.max_payload_bytes,
        max_capture_bytes: args.max_capture_bytes,
        skip_paths: args.skip_audit_paths.clone(),
        error_log_interval: Duration::from_secs(2),
        retention_days: args.audit_retention_days,
        ..AuditConfig::default()
    };

    ServerConfig {
        db,
        access_secret,
        refresh_secret,
        audience: args.audience.clone(),
        issuer: args.issuer.clone(),
        access_ttl_secs: args.access_ttl_secs,
        refresh_ttl_secs: args.refresh_ttl_secs,
        in_memory_blacklist: args.in_memory_blacklist,
        audit,
    }
}
