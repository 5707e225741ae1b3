use async_trait::async_trait;
use log::{ debug, error };
use reqwest::{ Client as HttpClient, StatusCode, header::AUTHORIZATION };
use serde::Deserialize;
use std::error::Error as StdError;
use std::time::Duration;

use super::{ AuthError, Identity, IdentityProvider };
use crate::cli::Args;

/// Validates bearer tokens against the identity provider's "current user" endpoint.
pub struct HttpIdentityProvider {
    http: HttpClient,
    user_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct ProviderUser {
    id: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(
        base_url: &str,
        user_path: &str,
        anon_key: String,
        connect_timeout: Duration,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let user_url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            user_path.trim_start_matches('/')
        );
        let http = HttpClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self { http, user_url, anon_key })
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(
            &args.auth_base_url,
            &args.auth_user_path,
            args.auth_anon_key.clone(),
            Duration::from_secs(args.upstream_connect_timeout_secs),
        )
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let resp = self.http
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| {
                error!("Identity provider request failed: {}", e);
                AuthError::ProviderUnavailable(e.to_string())
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Identity provider rejected credential ({})", status);
            return Err(AuthError::InvalidCredential);
        }
        if !status.is_success() {
            error!("Identity provider returned {}", status);
            return Err(AuthError::ProviderUnavailable(format!("provider returned {}", status)));
        }

        let user = resp
            .json::<ProviderUser>().await
            .map_err(|e| AuthError::ProviderUnavailable(format!("unreadable user record: {}", e)))?;

        user.id
            .filter(|id| !id.is_empty())
            .map(|id| Identity { id })
            .ok_or_else(|| AuthError::ProviderUnavailable("user record has no id".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{ http::HeaderMap, routing::get, Json, Router };
    use serde_json::json;

    async fn spawn_identity_provider() -> String {
        let app = Router::new()
            .route(
                "/auth/v1/user",
                get(|headers: HeaderMap| async move {
                    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
                    let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
                    match (auth, apikey) {
                        (Some("Bearer good"), Some("anon")) =>
                            (StatusCode::OK, Json(json!({ "id": "user-1", "email": "a@b.c" }))),
                        (Some("Bearer no-id"), Some("anon")) =>
                            (StatusCode::OK, Json(json!({ "email": "a@b.c" }))),
                        (Some("Bearer flaky"), _) =>
                            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "msg": "down" }))),
                        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "invalid JWT" }))),
                    }
                })
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: &str) -> HttpIdentityProvider {
        HttpIdentityProvider::new(
            base_url,
            "/auth/v1/user",
            "anon".into(),
            Duration::from_secs(2)
        ).unwrap()
    }

    #[tokio::test]
    async fn resolves_user_id_for_valid_token() {
        let base = spawn_identity_provider().await;
        let identity = provider(&base).resolve("good").await.unwrap();
        assert_eq!(identity.id, "user-1");
    }

    #[tokio::test]
    async fn rejected_token_is_invalid_credential() {
        let base = spawn_identity_provider().await;
        let err = provider(&base).resolve("expired").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));
    }

    #[tokio::test]
    async fn provider_errors_are_unavailable() {
        let base = spawn_identity_provider().await;
        let err = provider(&base).resolve("flaky").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));

        let err = provider(&base).resolve("no-id").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{}", addr)).resolve("good").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    }
}
