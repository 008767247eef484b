// Error types for the curator service

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::validate::{MAX_IMAGES, MIN_IMAGES};

/// Identity collaborator failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingToken,

    /// Token was presented but the identity service refused it
    #[error("Unauthorized: {0}")]
    Rejected(String),
}

/// Request body validation failures, first failure wins
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Body over the size cap, or the connection failed mid-read
    #[error("Request body rejected: {0}")]
    Body(String),

    #[error("Invalid JSON body")]
    MalformedJson,

    #[error("Body must be {{ images: [ {{ base64, mimeType }} ] }}")]
    Shape,

    #[error(
        "images must contain between {min} and {max} items (got {0})",
        min = MIN_IMAGES,
        max = MAX_IMAGES
    )]
    Count(usize),

    #[error("images[{0}] must have base64 and mimeType strings")]
    ItemShape(usize),

    #[error("images[{0}] exceeds max size (5MB)")]
    Size(usize),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Body(_) => "body",
            ValidationError::MalformedJson => "malformed_json",
            ValidationError::Shape => "shape",
            ValidationError::Count(_) => "count",
            ValidationError::ItemShape(_) => "item_shape",
            ValidationError::Size(_) => "size",
        }
    }
}

/// Generation gateway failures, never retried
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("GEMINI_API_KEY is not set")]
    Config,

    /// Non-success status, or no status at all for transport failures and timeouts
    #[error("{}", upstream_message(.status, .body))]
    Upstream { status: Option<u16>, body: String },

    #[error("Gemini response malformed: {0}")]
    ResponseShape(String),

    #[error("recommendedIndex {index} out of range for {len} images")]
    IndexOutOfRange { index: String, len: usize },
}

fn upstream_message(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("Gemini API error {code}: {body}"),
        None => format!("Gemini request failed: {body}"),
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let body = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.without_url().to_string()
        };
        GatewayError::Upstream { status: None, body }
    }
}

/// Everything that can end a request early
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Too many requests")]
    RateLimited { retry_after: u64 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            AppError::RateLimited { retry_after } => {
                let body = Json(json!({
                    "error": "Too many requests",
                    "retryAfter": retry_after,
                }));
                let mut response = (status, body).into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            AppError::Auth(AuthError::Rejected(detail)) => {
                (status, Json(json!({ "error": "Unauthorized", "detail": detail }))).into_response()
            }
            AppError::Validation(err) => {
                (status, Json(json!({ "error": err.to_string(), "detail": err.code() })))
                    .into_response()
            }
            AppError::Gateway(err) => {
                (status, Json(json!({ "error": "Curator failed", "detail": err.to_string() })))
                    .into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
