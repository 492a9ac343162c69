//! Security headers middleware
//!
//! Adds standard security headers to all responses to protect against
//! common web vulnerabilities like XSS, clickjacking, and content sniffing.

use axum::{body::Body, http::header, http::Request, middleware::Next, response::Response};

pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // Prevent MIME type sniffing
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, "nosniff".parse().unwrap());

    // Prevent clickjacking
    headers.insert(header::X_FRAME_OPTIONS, "DENY".parse().unwrap());

    // Control referrer information
    headers.insert(
        header::REFERRER_POLICY,
        "strict-origin-when-cross-origin".parse().unwrap(),
    );

    // Prevent caching of sensitive API responses
    headers.insert(
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, private".parse().unwrap(),
    );

    response
}
