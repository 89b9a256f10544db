//! CORS (Cross-Origin Resource Sharing) Configuration for Subgate Web
//!
//! The client app calls `/status`, `/pay` and `/verify` from wherever it is
//! hosted, so by default any origin is allowed. Deployments that know their
//! origins pass them in `CORS_ORIGINS` and get an exact-match allow list.
//!
//! # Policy
//!
//! - **Allowed Origins**: any, or exactly the configured list
//! - **Allowed Methods**: GET, POST, OPTIONS (preflight)
//! - **Allowed Headers**: Content-Type, Authorization
//! - **Max Age**: 3600 seconds (1 hour) for preflight caching
//!
//! The webhook endpoint is server-to-server and unaffected by CORS.

use std::time::Duration;

use http::{header::HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Standard allowed headers
pub const ALLOWED_HEADERS: [http::header::HeaderName; 2] =
    [http::header::CONTENT_TYPE, http::header::AUTHORIZATION];

/// Standard allowed methods
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Build the CORS layer for `origins`.
///
/// An empty list (or one containing `*`) allows any origin. Entries that are
/// not valid header values are skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS));

    let origins: Vec<&str> = origins
        .iter()
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .collect();

    if origins.is_empty() || origins.contains(&"*") {
        return base.allow_origin(Any);
    }

    base.allow_origin(AllowOrigin::list(parse_origins(&origins)))
}

fn parse_origins(origins: &[&str]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(origins: &[String]) -> Router {
        Router::new()
            .route("/status", get(|| async { "ok" }))
            .layer(cors_layer(origins))
    }

    async fn allow_origin_header(origins: &[String], origin: &str) -> Option<String> {
        let request = Request::builder()
            .uri("/status")
            .header("origin", origin)
            .body(Body::empty())
            .unwrap();
        let response = app(origins).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn test_parse_origins_skips_invalid() {
        let parsed = parse_origins(&["https://app.example.com", "bad\norigin"]);
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_list_allows_any_origin() {
        let header = allow_origin_header(&[], "https://anywhere.example").await;
        assert_eq!(header.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn test_configured_origin_allowed() {
        let origins = vec!["https://app.example.com/".to_string()];
        let header = allow_origin_header(&origins, "https://app.example.com").await;
        assert_eq!(header.as_deref(), Some("https://app.example.com"));
    }

    #[tokio::test]
    async fn test_unlisted_origin_gets_no_header() {
        let origins = vec!["https://app.example.com".to_string()];
        let header = allow_origin_header(&origins, "https://evil.example").await;
        assert!(header.is_none());
    }
}
