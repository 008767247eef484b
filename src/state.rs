use std::sync::Arc;
use crate::auth::IdentityProvider;
use crate::gateway::GeminiGateway;
use crate::rate_limit::RateLimiter;
// app's shared state

pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub rate_limiter: RateLimiter, // per-user sliding window
    pub gateway: GeminiGateway,
    pub max_body_bytes: usize,
}
