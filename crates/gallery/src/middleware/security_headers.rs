use axum::{
    body::Body,
    http::{
        Request,
        header::{self, HeaderName, HeaderValue},
    },
    middleware::Next,
    response::Response,
};

const STATIC_HEADERS: &[(HeaderName, &str)] = &[
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
    (header::REFERRER_POLICY, "no-referrer"),
];

pub async fn add_security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in STATIC_HEADERS {
        headers.insert(name.clone(), HeaderValue::from_static(*value));
    }
    // Images are embedded by a frontend served from another origin.
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("cross-origin"),
    );
    headers.insert(
        "x-server-version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );

    response
}
