//! Per-request ambient context.
//!
//! A `RequestContext` is installed with `tokio::task_local!` around the
//! whole handler future, so any code running during the request (across
//! every await point) can reach it without parameter threading. Each
//! request gets its own scope; interleaved requests on the same worker
//! never see each other's values.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, request::Parts};
use serde::Serialize;

/// Header used for inbound trace propagation and echoed on the response.
pub const TRACE_HEADER: &str = "x-request-id";

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Coarse device classification parsed from the User-Agent string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub mobile: bool,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            browser: "other".to_string(),
            os: "other".to_string(),
            mobile: false,
        }
    }
}

/// Best-effort User-Agent parse. Only coarse buckets; audit records do
/// not need more.
pub fn parse_device(user_agent: &str) -> DeviceInfo {
    let ua = user_agent;

    let browser = if ua.contains("Edg/") {
        "edge"
    } else if ua.contains("OPR/") {
        "opera"
    } else if ua.contains("Chrome/") {
        "chrome"
    } else if ua.contains("Firefox/") {
        "firefox"
    } else if ua.contains("Safari/") {
        "safari"
    } else if ua.starts_with("curl/") {
        "curl"
    } else {
        "other"
    };

    let os = if ua.contains("Windows") {
        "windows"
    } else if ua.contains("Android") {
        "android"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "ios"
    } else if ua.contains("Mac OS X") {
        "macos"
    } else if ua.contains("Linux") {
        "linux"
    } else {
        "other"
    };

    let mobile = ua.contains("Mobile") || ua.contains("Android") || ua.contains("iPhone");

    DeviceInfo {
        browser: browser.to_string(),
        os: os.to_string(),
        mobile,
    }
}

/// Mutable state accumulated over one request's lifetime.
#[derive(Debug, Clone)]
pub struct ContextData {
    pub trace_id: String,
    pub start: Instant,
    pub method: String,
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device: DeviceInfo,
    /// Sanitized query/body capture, filled by the audit middleware
    pub params: serde_json::Value,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub user_type: Option<String>,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u64>,
}

impl ContextData {
    pub fn new(trace_id: String, method: String, path: String) -> Self {
        Self {
            trace_id,
            start: Instant::now(),
            method,
            path,
            ip: None,
            user_agent: None,
            device: DeviceInfo::default(),
            params: serde_json::Value::Null,
            user_id: None,
            username: None,
            user_type: None,
            status_code: None,
            response_time_ms: None,
        }
    }
}

/// Handle to the active request's context. Cheap to clone; all clones
/// share the same underlying data.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Mutex<ContextData>>,
}

impl RequestContext {
    pub fn new(data: ContextData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    /// Run `fut` with this context active for its entire asynchronous
    /// extent, including awaited sub-futures.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// The context of the request currently being handled, or `None`
    /// outside any request scope.
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Read or mutate the context data.
    pub fn with<R>(&self, f: impl FnOnce(&mut ContextData) -> R) -> R {
        let mut data = self.inner.lock().expect("request context mutex poisoned");
        f(&mut data)
    }

    /// Snapshot the current data (used when the audit write detaches
    /// from the request scope).
    pub fn snapshot(&self) -> ContextData {
        self.with(|data| data.clone())
    }

    pub fn trace_id(&self) -> String {
        self.with(|data| data.trace_id.clone())
    }

    /// Record the resolved identity on the active scope. No-op outside
    /// a request scope (e.g. direct service calls in tests).
    pub fn set_user(user_id: &str, username: &str, user_type: &str) {
        if let Some(ctx) = Self::current() {
            ctx.with(|data| {
                data.user_id = Some(user_id.to_string());
                data.username = Some(username.to_string());
                data.user_type = Some(user_type.to_string());
            });
        }
    }

    /// Record the response outcome on the active scope.
    pub fn set_response(status_code: u16, response_time_ms: u64) {
        if let Some(ctx) = Self::current() {
            ctx.with(|data| {
                data.status_code = Some(status_code);
                data.response_time_ms = Some(response_time_ms);
            });
        }
    }
}

/// Extract the client IP: X-Forwarded-For first (reverse proxy, first
/// entry is the original client), then the socket address.
pub fn extract_client_ip(headers: &HeaderMap, parts: &Parts) -> Option<String> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_current_is_none_outside_scope() {
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn test_context_survives_await_points() {
        let ctx = RequestContext::new(ContextData::new(
            "trace-1".into(),
            "GET".into(),
            "/a".into(),
        ));

        ctx.scope(async {
            assert_eq!(RequestContext::current().unwrap().trace_id(), "trace-1");
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(RequestContext::current().unwrap().trace_id(), "trace-1");
        })
        .await;

        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn test_interleaved_scopes_are_isolated() {
        async fn worker(trace_id: &str, user: &str) {
            let ctx = RequestContext::new(ContextData::new(
                trace_id.to_string(),
                "GET".into(),
                "/x".into(),
            ));
            ctx.scope(async {
                assert_eq!(
                    RequestContext::current().unwrap().trace_id(),
                    trace_id,
                    "before suspension"
                );
                tokio::time::sleep(Duration::from_millis(10)).await;

                RequestContext::set_user(user, user, "client");
                tokio::time::sleep(Duration::from_millis(10)).await;

                let current = RequestContext::current().unwrap();
                assert_eq!(current.trace_id(), trace_id, "after suspensions");
                assert_eq!(
                    current.with(|d| d.user_id.clone()),
                    Some(user.to_string()),
                    "user set in one scope must not leak into another"
                );
            })
            .await;
        }

        // Interleave on the same runtime; both tasks suspend mid-scope.
        let a = tokio::spawn(worker("trace-a", "user-a"));
        let b = tokio::spawn(worker("trace-b", "user-b"));
        a.await.unwrap();
        b.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_response() {
        let ctx = RequestContext::new(ContextData::new(
            "trace-1".into(),
            "GET".into(),
            "/a".into(),
        ));
        let handle = ctx.clone();

        ctx.scope(async {
            RequestContext::set_response(404, 12);
        })
        .await;

        let data = handle.snapshot();
        assert_eq!(data.status_code, Some(404));
        assert_eq!(data.response_time_ms, Some(12));
    }

    #[test]
    fn test_parse_device_desktop_chrome() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        let device = parse_device(ua);
        assert_eq!(device.browser, "chrome");
        assert_eq!(device.os, "windows");
        assert!(!device.mobile);
    }

    #[test]
    fn test_parse_device_iphone_safari() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
                  (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
        let device = parse_device(ua);
        assert_eq!(device.browser, "safari");
        assert_eq!(device.os, "ios");
        assert!(device.mobile);
    }

    #[test]
    fn test_parse_device_curl() {
        let device = parse_device("curl/8.4.0");
        assert_eq!(device.browser, "curl");
        assert!(!device.mobile);
    }

    #[test]
    fn test_parse_device_unknown() {
        assert_eq!(parse_device(""), DeviceInfo::default());
    }

    #[test]
    fn test_extract_ip_from_forwarded_for() {
        use axum::http::{HeaderValue, Request};

        let request = Request::builder()
            .header("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 10.0.0.1"))
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        assert_eq!(
            extract_client_ip(&parts.headers, &parts),
            Some("1.2.3.4".to_string())
        );
    }

    #[test]
    fn test_extract_ip_missing() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(extract_client_ip(&parts.headers, &parts), None);
    }
}
