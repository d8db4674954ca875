//! Request-scoped middleware.

use axum::{extract::Request, middleware::Next, response::Response};

/// Request ID wrapper for type safety
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Propagate an incoming `X-Request-ID` or mint one, and echo it on the
/// response for log correlation.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", value);
    }

    response
}
