//! GoTrue-compatible identity backend
//!
//! Talks to the `/auth/v1` REST surface that Supabase Auth exposes:
//! - `GET  /auth/v1/user` with a bearer token
//! - `POST /auth/v1/token?grant_type=pkce` to exchange an authorization code
//! - `GET  /auth/v1/authorize` (browser redirect) to start a provider flow
//! - `POST /auth/v1/logout` to revoke the session

use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{IdentityBackend, IdentityError, Principal, Provider, SessionTokens};
use crate::config::IdentityConfig;
use crate::metrics::{IDENTITY_ERRORS_TOTAL, IDENTITY_REQUEST_DURATION_SECONDS};

/// HTTP client for a GoTrue auth server
pub struct GoTrueBackend {
    base_url: Url,
    anon_key: String,
    timeout: Duration,
    http_client: Arc<reqwest::Client>,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

impl From<GoTrueUser> for Principal {
    fn from(user: GoTrueUser) -> Self {
        Principal {
            id: user.id,
            email: user.email.filter(|email| !email.is_empty()),
            provider: user.app_metadata.provider,
            name: user.user_metadata.full_name.or(user.user_metadata.name),
            avatar_url: user.user_metadata.avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    /// Unix seconds; preferred over `expires_in` when present
    expires_at: Option<i64>,
    user: Option<GoTrueUser>,
}

/// Error body shapes GoTrue has used across versions
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl GoTrueBackend {
    /// Create a backend for the configured auth server
    ///
    /// # Errors
    /// Returns error if `config.url` is not an absolute URL
    pub fn new(
        config: &IdentityConfig,
        http_client: Arc<reqwest::Client>,
    ) -> Result<Self, IdentityError> {
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| IdentityError::Misconfigured(format!("invalid identity url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            anon_key: config.anon_key.clone(),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::Misconfigured(format!("invalid endpoint {path}: {e}")))
    }

    async fn rejection(operation: &'static str, response: reqwest::Response) -> IdentityError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body
            .into_message()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        if status.is_server_error() {
            IDENTITY_ERRORS_TOTAL.with_label_values(&[operation]).inc();
            IdentityError::Unavailable(format!("{status}: {message}"))
        } else {
            IdentityError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }

    fn transport_error(operation: &'static str, error: reqwest::Error) -> IdentityError {
        IDENTITY_ERRORS_TOTAL.with_label_values(&[operation]).inc();
        if error.is_timeout() || error.is_connect() {
            IdentityError::Unavailable(error.to_string())
        } else {
            IdentityError::Http(error)
        }
    }
}

#[async_trait]
impl IdentityBackend for GoTrueBackend {
    async fn get_user(&self, access_token: &str) -> Result<Option<Principal>, IdentityError> {
        const OPERATION: &str = "get_user";
        let _timer = IDENTITY_REQUEST_DURATION_SECONDS
            .with_label_values(&[OPERATION])
            .start_timer();

        let response = self
            .http_client
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(OPERATION, e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!(status = %response.status(), "Identity backend rejected access token");
                Ok(None)
            }
            status if status.is_success() => {
                let user: GoTrueUser = response.json().await.map_err(|e| {
                    IDENTITY_ERRORS_TOTAL.with_label_values(&[OPERATION]).inc();
                    IdentityError::InvalidResponse(e.to_string())
                })?;
                Ok(Some(user.into()))
            }
            _ => Err(Self::rejection(OPERATION, response).await),
        }
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<SessionTokens, IdentityError> {
        const OPERATION: &str = "exchange_code";
        let code_verifier = code_verifier.ok_or(IdentityError::MissingCodeVerifier)?;
        let _timer = IDENTITY_REQUEST_DURATION_SECONDS
            .with_label_values(&[OPERATION])
            .start_timer();

        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "pkce");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "auth_code": code,
                "code_verifier": code_verifier,
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(OPERATION, e))?;

        if !response.status().is_success() {
            return Err(Self::rejection(OPERATION, response).await);
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            IDENTITY_ERRORS_TOTAL.with_label_values(&[OPERATION]).inc();
            IdentityError::InvalidResponse(e.to_string())
        })?;

        let expires_at = token
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                TimeDelta::try_seconds(token.expires_in.unwrap_or(3600))
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            })
            .ok_or_else(|| {
                IDENTITY_ERRORS_TOTAL.with_label_values(&[OPERATION]).inc();
                IdentityError::InvalidResponse("token expiry out of range".to_string())
            })?;

        Ok(SessionTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user.map(Principal::from),
        })
    }

    fn authorize_url(
        &self,
        provider: Provider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<String, IdentityError> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        Ok(url.into())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        const OPERATION: &str = "sign_out";
        let mut url = self.endpoint("auth/v1/logout")?;
        url.query_pairs_mut().append_pair("scope", "local");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(OPERATION, e))?;

        // An already-revoked token is as signed out as it gets.
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::rejection(OPERATION, response).await),
        }
    }
}
