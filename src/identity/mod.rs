//! Identity backend boundary
//!
//! authgate never issues or validates sessions itself. Everything that
//! touches tokens goes through an [`IdentityBackend`]; handlers talk to it
//! through an [`IdentityClient`] built from the current request's
//! credentials and dropped with the request.

mod gotrue;
pub mod pkce;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gotrue::GoTrueBackend;

/// OAuth providers the login page offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Github => "GitHub",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(IdentityError::UnknownProvider(other.to_string())),
        }
    }
}

/// Authenticated user as reported by the identity backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
    /// Provider the account signed in with, if the backend reports it
    pub provider: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Principal {
    /// Best human-readable label for the user
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Tokens issued by a successful code exchange
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: Option<Principal>,
}

/// Where to send the browser to start an OAuth flow
#[derive(Debug, Clone)]
pub struct OAuthRedirect {
    pub url: String,
    /// PKCE verifier the callback must present with the code
    pub code_verifier: String,
}

/// Identity backend failures
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Backend could not be reached or answered with a server error
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the request (bad code, consumed code, bad token)
    #[error("identity backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Backend answered with something we could not decode
    #[error("invalid identity backend response: {0}")]
    InvalidResponse(String),

    /// Callback arrived without the PKCE verifier from the login step
    #[error("missing PKCE code verifier")]
    MissingCodeVerifier,

    #[error("invalid identity configuration: {0}")]
    Misconfigured(String),

    #[error("unknown OAuth provider: {0}")]
    UnknownProvider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Operations authgate needs from an identity backend
///
/// `get_user` returns `Ok(None)` when the backend says the token is not
/// valid; `Err` is reserved for failures to get an answer at all.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn get_user(&self, access_token: &str) -> Result<Option<Principal>, IdentityError>;

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<SessionTokens, IdentityError>;

    /// Build the backend URL that starts the provider's consent flow
    fn authorize_url(
        &self,
        provider: Provider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<String, IdentityError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;
}

/// Credentials carried by a single request
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    pub access_token: Option<String>,
    pub code_verifier: Option<String>,
}

/// Identity client scoped to one request
///
/// Holds the shared backend handle plus this request's credentials.
/// Never store one beyond the request that built it.
pub struct IdentityClient {
    backend: Arc<dyn IdentityBackend>,
    credentials: RequestCredentials,
}

impl IdentityClient {
    pub fn new(backend: Arc<dyn IdentityBackend>, credentials: RequestCredentials) -> Self {
        Self {
            backend,
            credentials,
        }
    }

    pub fn has_session(&self) -> bool {
        self.credentials.access_token.is_some()
    }

    /// Principal for this request, `None` when there is no usable session
    pub async fn get_user(&self) -> Result<Option<Principal>, IdentityError> {
        match &self.credentials.access_token {
            Some(token) => self.backend.get_user(token).await,
            None => Ok(None),
        }
    }

    pub async fn exchange_code_for_session(
        &self,
        code: &str,
    ) -> Result<SessionTokens, IdentityError> {
        self.backend
            .exchange_code_for_session(code, self.credentials.code_verifier.as_deref())
            .await
    }

    /// Start a provider-delegated flow that returns to `redirect_to`
    pub fn sign_in_with_oauth(
        &self,
        provider: Provider,
        redirect_to: &str,
    ) -> Result<OAuthRedirect, IdentityError> {
        let code_verifier = pkce::generate_verifier();
        let challenge = pkce::code_challenge(&code_verifier);
        let url = self
            .backend
            .authorize_url(provider, redirect_to, &challenge)?;
        Ok(OAuthRedirect { url, code_verifier })
    }

    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        match &self.credentials.access_token {
            Some(token) => self.backend.sign_out(token).await,
            None => Ok(()),
        }
    }
}
