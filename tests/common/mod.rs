//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use authgate::config::{self, GateFailurePolicy};
use authgate::identity::{IdentityBackend, IdentityError, Principal, Provider, SessionTokens};
use authgate::{AppState, auth};
use axum::async_trait;
use chrono::{Duration, Utc};
use tokio::net::TcpListener;

pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// In-memory identity backend
///
/// Codes are one-time use: a successful exchange consumes the code.
#[derive(Default)]
pub struct ScriptedIdentity {
    users: Mutex<HashMap<String, Principal>>,
    codes: Mutex<HashMap<String, SessionTokens>>,
    pub fail_lookups: AtomicBool,
    pub lookups: AtomicUsize,
    pub seen_verifiers: Mutex<Vec<Option<String>>>,
    pub signed_out: Mutex<Vec<String>>,
}

impl ScriptedIdentity {
    /// Make `access_token` valid for `principal`
    pub fn add_user(&self, access_token: &str, principal: Principal) {
        self.users
            .lock()
            .unwrap()
            .insert(access_token.to_string(), principal);
    }

    /// Register an unused authorization code; returns the access token it yields
    pub fn issue_code(&self, code: &str, principal: Principal) -> String {
        let access_token = format!("access-for-{code}");
        self.add_user(&access_token, principal.clone());
        self.codes.lock().unwrap().insert(
            code.to_string(),
            SessionTokens {
                access_token: access_token.clone(),
                refresh_token: Some(format!("refresh-for-{code}")),
                expires_at: Utc::now() + Duration::hours(1),
                user: Some(principal),
            },
        );
        access_token
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityBackend for ScriptedIdentity {
    async fn get_user(&self, access_token: &str) -> Result<Option<Principal>, IdentityError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable(
                "scripted backend outage".to_string(),
            ));
        }
        Ok(self.users.lock().unwrap().get(access_token).cloned())
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<SessionTokens, IdentityError> {
        self.seen_verifiers
            .lock()
            .unwrap()
            .push(code_verifier.map(ToOwned::to_owned));
        self.codes
            .lock()
            .unwrap()
            .remove(code)
            .ok_or_else(|| IdentityError::Rejected {
                status: 400,
                message: "invalid or consumed auth code".to_string(),
            })
    }

    fn authorize_url(
        &self,
        provider: Provider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Result<String, IdentityError> {
        let url = url::Url::parse_with_params(
            "https://idp.test/auth/v1/authorize",
            &[
                ("provider", provider.as_str()),
                ("redirect_to", redirect_to),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "s256"),
            ],
        )
        .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        Ok(url.into())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        self.signed_out
            .lock()
            .unwrap()
            .push(access_token.to_string());
        Ok(())
    }
}

pub fn test_principal() -> Principal {
    Principal {
        id: "6d1f0b52-user".to_string(),
        email: Some("ada@example.com".to_string()),
        provider: Some("google".to_string()),
        name: Some("Ada Lovelace".to_string()),
        avatar_url: None,
    }
}

pub fn test_config(policy: GateFailurePolicy) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_url: "http://localhost:3000".to_string(),
        },
        identity: config::IdentityConfig {
            url: "https://idp.test".to_string(),
            anon_key: "test-anon-key".to_string(),
            timeout_seconds: 5,
        },
        auth: config::AuthConfig {
            session_secret: SESSION_SECRET.to_string(),
            session_max_age: 604800,
            protected_paths: vec!["/".to_string(), "/dashboard".to_string()],
            gate_failure_policy: policy,
            session_cookie: "authgate_session".to_string(),
            verifier_cookie: "authgate_code_verifier".to_string(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub identity: Arc<ScriptedIdentity>,
    /// Client that does not follow redirects, so tests can inspect them
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance with the default (fail-open) policy
    pub async fn new() -> Self {
        Self::with_policy(GateFailurePolicy::Open).await
    }

    pub async fn with_policy(policy: GateFailurePolicy) -> Self {
        authgate::metrics::init_metrics();

        let identity = Arc::new(ScriptedIdentity::default());
        let state = AppState::with_identity_backend(test_config(policy), identity.clone());

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = authgate::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            identity,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Signed session cookie header value carrying `access_token`
    pub fn session_cookie(&self, access_token: &str) -> String {
        let now = Utc::now();
        let session = auth::Session {
            access_token: access_token.to_string(),
            refresh_token: None,
            user_id: None,
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        let token = auth::create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test session token");
        format!("{}={}", self.state.config.auth.session_cookie, token)
    }

    /// Register a signed-in user and return a matching cookie header value
    pub fn signed_in_cookie(&self) -> String {
        self.identity.add_user("valid-access-token", test_principal());
        self.session_cookie("valid-access-token")
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.expect("request succeeds")
    }
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(ToString::to_string))
        .collect()
}

/// `name=value` pair of the first Set-Cookie for `name`
pub fn cookie_pair(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|raw| {
        let pair = raw.split(';').next()?.trim().to_string();
        pair.starts_with(&format!("{name}=")).then_some(pair)
    })
}
