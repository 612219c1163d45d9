//! CORS middleware for the HTTP transport.
//!
//! Browser front ends call the REST routes from another origin. Origins in
//! the allow-list get `Access-Control-Allow-Origin` echoed back with
//! credentials allowed; preflight requests are answered directly with 204.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const ALLOWED_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";
const PREFLIGHT_MAX_AGE: &str = "600";

/// Allowed origins for cross-origin requests.
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    origins: HashSet<String>,
}

impl CorsConfig {
    /// Build from configured origins. Blank entries are skipped and a
    /// trailing `/` is ignored.
    pub fn from_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = origins
            .into_iter()
            .map(|o| o.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        Self { origins }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.contains(origin.trim_end_matches('/'))
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }
}

fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}

/// CORS middleware for HTTP requests.
pub async fn cors_middleware(
    State(config): State<Arc<CorsConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let allowed_origin = request
        .headers()
        .get(header::ORIGIN)
        .filter(|value| value.to_str().is_ok_and(|o| config.is_allowed(o)))
        .cloned();

    if is_preflight(&request) {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let Some(origin) = allowed_origin else {
            debug!("Rejected CORS preflight from unlisted origin");
            return response;
        };

        // Allow any header: echo what the browser asks for
        let requested_headers = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned();
        let headers = response.headers_mut();
        apply_cors_headers(headers, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        if let Some(requested) = requested_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
        }
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        return response;
    }

    let mut response = next.run(request).await;
    if let Some(origin) = allowed_origin {
        apply_cors_headers(response.headers_mut(), origin);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_origins_normalizes() {
        let config = CorsConfig::from_origins(["http://localhost:5173/", "  ", "http://a.test"]);
        assert_eq!(config.origin_count(), 2);
        assert!(config.is_allowed("http://localhost:5173"));
        assert!(config.is_allowed("http://a.test/"));
        assert!(!config.is_allowed("http://evil.test"));
    }

    #[test]
    fn test_preflight_detection() {
        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        assert!(is_preflight(&preflight));

        let plain_options = Request::builder()
            .method(Method::OPTIONS)
            .body(Body::empty())
            .unwrap();
        assert!(!is_preflight(&plain_options));
    }

    #[test]
    fn test_apply_headers() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers, HeaderValue::from_static("http://localhost:3000"));
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }
}
