mod http;

pub use self::http::HttpIdentityProvider;

use crate::history::is_valid_key_segment;
use async_trait::async_trait;
use axum::http::{ header::AUTHORIZATION, HeaderMap };
use log::{ debug, warn };
use std::sync::Arc;
use thiserror::Error;

/// The caller a request acts on behalf of. Lives only as long as the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("invalid or expired credential")]
    InvalidCredential,
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validates `token` with the provider. One outbound call, no caching.
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Clone)]
pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthGate {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = extract_bearer(headers).ok_or(AuthError::MissingCredential)?;
        let identity = self.provider.resolve(&token).await?;

        // Owner ids become store key prefixes.
        if !is_valid_key_segment(&identity.id) {
            warn!("Identity provider returned an unusable user id: {:?}", identity.id);
            return Err(AuthError::ProviderUnavailable("provider returned an invalid user id".into()));
        }

        debug!("Authenticated user {}", identity.id);
        Ok(identity)
    }
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string()).filter(|token| !token.is_empty())
}
