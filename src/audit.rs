//! Request audit capture and persistence.
//!
//! One tower middleware wraps the whole API surface: it installs the
//! request context, captures sanitized parameters, runs the handler,
//! stamps the outcome, and schedules exactly one audit record per
//! request. The write itself is detached from the response path; a
//! failing insert can slow nothing down and fail nothing, it only emits
//! a rate-limited diagnostic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::{Value, json};
use tracing::error;

use crate::context::{ContextData, RequestContext, TRACE_HEADER, extract_client_ip, parse_device};
use crate::db::{AuditLogStore, AuditRecord};

/// Replacement string for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Placeholder recorded instead of binary request bodies.
pub const BINARY_BODY_PLACEHOLDER: &str = "[binary body omitted]";

/// Placeholder recorded instead of bodies too large (or of unknown
/// length) to buffer for capture.
pub const OVERSIZED_BODY_PLACEHOLDER: &str = "[oversized body omitted]";

/// Audit capture configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Field names whose values are redacted (matched case-insensitively)
    pub mask_keys: Vec<String>,
    /// Serialized payloads above this size are replaced by a preview marker
    pub max_payload_bytes: usize,
    /// Bodies larger than this (or of undeclared length) are never
    /// buffered; they pass through with a placeholder recorded
    pub max_capture_bytes: usize,
    /// Redaction recursion depth bound
    pub max_depth: usize,
    /// Redaction processes at most this many array elements per array
    pub max_array_len: usize,
    /// Exact request paths that produce no audit record
    pub skip_paths: Vec<String>,
    /// Minimum interval between audit-write failure diagnostics
    pub error_log_interval: Duration,
    /// Audit records older than this many days are deleted by cleanup
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            // Includes this service's own token field names so its
            // endpoints never record live credentials.
            mask_keys: [
                "authorization",
                "cookie",
                "password",
                "token",
                "secret",
                "key",
                "access_token",
                "refresh_token",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_payload_bytes: 8 * 1024,
            max_capture_bytes: 64 * 1024,
            max_depth: 4,
            max_array_len: 100,
            skip_paths: vec!["/api/health".to_string()],
            error_log_interval: Duration::from_secs(2),
            retention_days: 90,
        }
    }
}

/// Classify a request path into a logging sink / api type.
pub fn api_type_for_path(path: &str) -> &'static str {
    if path.starts_with("/api/admin") {
        "admin"
    } else if path.starts_with("/api") {
        "client"
    } else {
        "default"
    }
}

/// Content types whose bodies are never parsed or stored.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    ct.starts_with("multipart/")
        || ct.starts_with("image/")
        || ct.starts_with("video/")
        || ct.starts_with("audio/")
        || ct == "application/octet-stream"
        || ct == "application/zip"
        || ct == "application/pdf"
}

/// Replace values of masked keys recursively, bounded in depth and array
/// length so a pathological payload cannot make capture expensive.
pub fn redact(value: &mut Value, mask_keys: &[String], max_depth: usize, max_array_len: usize) {
    if max_depth == 0 {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if mask_keys.iter().any(|m| m.eq_ignore_ascii_case(key)) {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    redact(child, mask_keys, max_depth - 1, max_array_len);
                }
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut().take(max_array_len) {
                redact(child, mask_keys, max_depth - 1, max_array_len);
            }
        }
        _ => {}
    }
}

/// Cap the serialized size of a captured payload. Oversized payloads are
/// replaced by a marker carrying a short preview; the original is never
/// stored in full.
pub fn truncate_payload(value: Value, max_bytes: usize) -> Value {
    let serialized = value.to_string();
    if serialized.len() <= max_bytes {
        return value;
    }
    let preview: String = serialized.chars().take(256).collect();
    json!({
        "_truncated": true,
        "preview": format!("{}…[truncated]", preview),
    })
}

/// Parse a raw query string into a JSON object (values kept as strings).
/// Keys and values are percent-decoded first, so an encoded spelling of
/// a masked key still matches during redaction.
fn query_to_json(query: &str) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        map.insert(key.into_owned(), Value::String(value.into_owned()));
    }
    Value::Object(map)
}

/// Handler-supplied override for the audit record's summary line,
/// attached as a response extension.
#[derive(Debug, Clone)]
pub struct AuditContent(pub String);

/// Handler-declared action label for the audit record (e.g. "logout"),
/// attached as a response extension.
#[derive(Debug, Clone)]
pub struct AuditAction(pub String);

/// Builds and persists audit records without ever blocking or failing
/// the request that produced them.
#[derive(Clone)]
pub struct AuditLogWriter {
    store: AuditLogStore,
    config: Arc<AuditConfig>,
    error_limiter: Arc<DefaultDirectRateLimiter>,
}

impl AuditLogWriter {
    pub fn new(store: AuditLogStore, config: Arc<AuditConfig>) -> Self {
        let period = config.error_log_interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(period).expect("non-zero error log interval");
        Self {
            store,
            config,
            error_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Assemble a record from a finished request's context.
    pub fn build_record(
        &self,
        data: &ContextData,
        content: Option<String>,
        action_type: Option<String>,
    ) -> AuditRecord {
        let status_code = data.status_code.unwrap_or(0);
        let response_time_ms = data.response_time_ms.unwrap_or(0);
        let content = content.unwrap_or_else(|| {
            format!(
                "{} {} - {} ({}ms)",
                data.method, data.path, status_code, response_time_ms
            )
        });

        AuditRecord {
            user_id: data.user_id.clone(),
            username: data.username.clone(),
            api_type: api_type_for_path(&data.path).to_string(),
            ip: data.ip.clone(),
            method: data.method.clone(),
            path: data.path.clone(),
            params: data.params.clone(),
            status_code,
            action_type,
            is_success: status_code < 400,
            user_agent: data.user_agent.clone(),
            device: serde_json::to_value(&data.device).unwrap_or(Value::Null),
            content,
        }
    }

    /// Persist a record on a detached task. The returned handle is for
    /// tests; the middleware drops it. Insert failures are logged at most
    /// once per configured interval and never propagate.
    pub fn write(&self, record: AuditRecord) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let limiter = self.error_limiter.clone();
        tokio::spawn(async move {
            if let Err(e) = store.insert(&record).await {
                if limiter.check().is_ok() {
                    error!(
                        error = %e,
                        method = %record.method,
                        path = %record.path,
                        "Failed to persist audit record"
                    );
                }
            }
        })
    }
}

/// State for the observation middleware.
#[derive(Clone)]
pub struct ObserveState {
    pub writer: AuditLogWriter,
}

/// Error outcome attached to responses by the exception translator so
/// this middleware can log it without re-deriving.
#[derive(Debug, Clone)]
pub struct ErrorOutcome {
    pub code: u16,
    pub message: String,
}

/// The audit capture middleware. Wraps every observed route.
pub async fn observe(
    State(state): State<ObserveState>,
    request: Request,
    next: Next,
) -> Response {
    let config = state.writer.config().clone();
    let (parts, body) = request.into_parts();

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("").to_string();
    let skip_audit = config.skip_paths.iter().any(|p| p == &path);

    let trace_id = parts
        .headers
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ip = extract_client_ip(&parts.headers, &parts);
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // Capture the body. Binary payloads pass through untouched. Textual
    // bodies are buffered, parsed and replayed only when their declared
    // size fits the capture cap; oversized or unsized (streaming) bodies
    // also pass through untouched, so capture never holds more than
    // `max_capture_bytes` in memory per request.
    let (body_value, body) = if is_binary_content_type(&content_type) {
        (Value::String(BINARY_BODY_PLACEHOLDER.to_string()), body)
    } else if body
        .size_hint()
        .exact()
        .is_none_or(|len| len > config.max_capture_bytes as u64)
    {
        (Value::String(OVERSIZED_BODY_PLACEHOLDER.to_string()), body)
    } else {
        let bytes = axum::body::to_bytes(body, config.max_capture_bytes)
            .await
            .unwrap_or_default();
        let value = if bytes.is_empty() {
            Value::Null
        } else if let Ok(parsed) = serde_json::from_slice::<Value>(&bytes) {
            parsed
        } else {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        };
        (value, Body::from(bytes))
    };

    let mut params = json!({
        "query": query_to_json(&query),
        "body": body_value,
    });
    redact(
        &mut params,
        &config.mask_keys,
        config.max_depth + 1, // the synthetic query/body wrapper costs one level
        config.max_array_len,
    );
    let params = truncate_payload(params, config.max_payload_bytes);

    let mut data = ContextData::new(trace_id.clone(), method, path.clone());
    data.ip = ip;
    data.device = user_agent.as_deref().map(parse_device).unwrap_or_default();
    data.user_agent = user_agent;
    data.params = params;

    let ctx = RequestContext::new(data);
    let handle = ctx.clone();

    let start = Instant::now();
    let request = Request::from_parts(parts, body);
    let mut response = ctx.scope(next.run(request)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let status = response.status().as_u16();
    handle.with(|data| {
        data.status_code = Some(status);
        data.response_time_ms = Some(elapsed_ms);
    });

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }

    if status >= 400 {
        log_failure(&handle, &response, status, elapsed_ms);
    }

    if !skip_audit {
        let content = response
            .extensions()
            .get::<AuditContent>()
            .map(|c| c.0.clone());
        let action_type = response
            .extensions()
            .get::<AuditAction>()
            .map(|a| a.0.clone());
        let record = state.writer.build_record(&handle.snapshot(), content, action_type);
        // Fire and forget: the response does not wait for the insert.
        let _ = state.writer.write(record);
    }

    response
}

/// Emit a structured error event on the sink selected by path prefix.
fn log_failure(ctx: &RequestContext, response: &Response, status: u16, elapsed_ms: u64) {
    let data = ctx.snapshot();
    let message = response
        .extensions()
        .get::<ErrorOutcome>()
        .map(|o| o.message.clone())
        .unwrap_or_default();
    let ip = data.ip.as_deref().unwrap_or("-");
    let user_agent = data.user_agent.as_deref().unwrap_or("-");

    match api_type_for_path(&data.path) {
        "admin" => error!(
            target: "gatelog::audit::admin",
            trace_id = %data.trace_id,
            method = %data.method,
            path = %data.path,
            status,
            response_time_ms = elapsed_ms,
            ip = %ip,
            user_agent = %user_agent,
            message = %message,
            "Request failed"
        ),
        "client" => error!(
            target: "gatelog::audit::client",
            trace_id = %data.trace_id,
            method = %data.method,
            path = %data.path,
            status,
            response_time_ms = elapsed_ms,
            ip = %ip,
            user_agent = %user_agent,
            message = %message,
            "Request failed"
        ),
        _ => error!(
            target: "gatelog::audit",
            trace_id = %data.trace_id,
            method = %data.method,
            path = %data.path,
            status,
            response_time_ms = elapsed_ms,
            ip = %ip,
            user_agent = %user_agent,
            message = %message,
            "Request failed"
        ),
    }
}
