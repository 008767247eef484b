// Identity collaborator, token validation itself is delegated

use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;

use crate::error::AuthError;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a stable user id
    async fn user_id(&self, token: &str) -> Result<String, AuthError>;
}

// Pulls the token out of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Supabase auth: `GET {url}/auth/v1/user` answers with the token's user
pub struct SupabaseIdentity {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct SupabaseUser {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
struct SupabaseAuthError {
    #[serde(alias = "msg", alias = "error_description")]
    message: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn user_id(&self, token: &str) -> Result<String, AuthError> {
        let res = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Rejected(format!("identity service unreachable: {}", e.without_url())))?;

        if !res.status().is_success() {
            let status = res.status();
            let message = res
                .json::<SupabaseAuthError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("identity service returned {}", status.as_u16()));
            return Err(AuthError::Rejected(message));
        }

        let user = res
            .json::<SupabaseUser>()
            .await
            .map_err(|e| AuthError::Rejected(format!("invalid identity response: {}", e.without_url())))?;

        if user.id.is_empty() {
            return Err(AuthError::Rejected("identity response has no user id".into()));
        }
        Ok(user.id)
    }
}
