use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::bearer_token;
use crate::cors;
use crate::error::{AppError, ValidationError};
use crate::metrics::{RATE_LIMITED, RATE_LIMIT_KEYS, REQUEST_TOTAL, VALIDATION_FAILURES};
use crate::models::{Batch, CurationResult};
use crate::rate_limit::RateDecision;
use crate::state::AppState;
use crate::validate;

// Any method lands here so 405 and the preflight carry CORS headers too
pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let mut response = match method {
        Method::OPTIONS => StatusCode::NO_CONTENT.into_response(),
        Method::POST => match recommend(&state, &headers, body).await {
            Ok(result) => (StatusCode::OK, Json(result)).into_response(),
            Err(e) => e.into_response(),
        },
        _ => AppError::MethodNotAllowed.into_response(),
    };

    cors::apply(&headers, response.headers_mut());
    response
}

// authenticate -> rate limit -> validate -> call Gemini, stopping at the first failure.
// The body is only buffered, up to the cap, once the caller is known and under quota.
async fn recommend(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
) -> Result<CurationResult, AppError> {
    REQUEST_TOTAL.inc();

    let token = bearer_token(headers)?;
    let user_id = state.identity.user_id(token).await.inspect_err(|e| {
        warn!(error = %e, "Authentication failed");
    })?;

    let decision = state.rate_limiter.check(&user_id);
    RATE_LIMIT_KEYS.set(state.rate_limiter.tracked_keys() as f64);
    if let RateDecision::Denied { retry_after_secs } = decision {
        RATE_LIMITED.inc();
        info!(user_id = %user_id, retry_after = retry_after_secs, "Rate limit exceeded");
        return Err(AppError::RateLimited {
            retry_after: retry_after_secs,
        });
    }

    let batch = read_batch(state, body).await.inspect_err(|e| {
        VALIDATION_FAILURES.inc();
        info!(user_id = %user_id, reason = e.code(), "Rejected request body");
    })?;

    info!(user_id = %user_id, images = batch.len(), "Requesting recommendation");
    let result = state.gateway.recommend(&batch).await?;
    info!(
        user_id = %user_id,
        recommended_index = result.recommended_index,
        "Recommendation ready"
    );
    Ok(result)
}

async fn read_batch(state: &AppState, body: Body) -> Result<Batch, ValidationError> {
    let raw = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| ValidationError::Body(e.to_string()))?;
    validate::parse(&raw)
}
