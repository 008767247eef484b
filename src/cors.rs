use axum::http::{
    HeaderMap, HeaderValue,
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
    },
};

const DEFAULT_ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Authorization, Content-Type, X-Client-Info";
const MAX_AGE_SECS: &str = "86400";

// Reflects the caller's Origin, or allows any origin when none was sent
pub fn apply(request_headers: &HeaderMap, response_headers: &mut HeaderMap) {
    match request_headers.get(ORIGIN) {
        Some(origin) => {
            response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            response_headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        None => {
            response_headers.insert(
                ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static(DEFAULT_ALLOW_ORIGIN),
            );
        }
    }
    response_headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    response_headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    response_headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
}
