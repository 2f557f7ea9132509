//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;
use url::Url;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Origin the browser sees, e.g. "https://app.example.com".
    /// The OAuth callback URL is derived from it.
    pub public_url: String,
}

impl ServerConfig {
    /// Public origin without a trailing slash
    pub fn base_url(&self) -> String {
        self.public_url.trim_end_matches('/').to_string()
    }

    /// Absolute URL for a same-origin path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

/// Identity backend (GoTrue-compatible auth server)
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Project URL, e.g. "https://abc.supabase.co"
    pub url: String,
    /// Public API key sent as the `apikey` header
    pub anon_key: String,
    /// Request timeout for backend calls
    pub timeout_seconds: u64,
}

/// What the session gate does when the identity backend fails
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GateFailurePolicy {
    /// Let the request through unauthenticated
    #[default]
    Open,
    /// Treat the request as unauthenticated and redirect
    Closed,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Key for signing the session cookie (32+ bytes)
    pub session_secret: String,
    /// Session cookie max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// Paths that require a principal (exact match)
    pub protected_paths: Vec<String>,
    #[serde(default)]
    pub gate_failure_policy: GateFailurePolicy,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_verifier_cookie")]
    pub verifier_cookie: String,
}

fn default_session_cookie() -> String {
    "authgate_session".to_string()
}

fn default_verifier_cookie() -> String {
    "authgate_code_verifier".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AUTHGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> crate::error::Result<Self> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.public_url", "http://localhost:3000")?
            .set_default("identity.timeout_seconds", 10)?
            .set_default("auth.session_max_age", 604800)?
            .set_default("auth.protected_paths", vec!["/", "/dashboard"])?
            .set_default("auth.gate_failure_policy", "open")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AUTHGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.protected_paths")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        Url::parse(&self.server.public_url)
            .map(|url| url.scheme() == "https")
            .unwrap_or(true)
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.auth.protected_paths.iter().any(|p| p == path)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AppError;
        const MIN_SESSION_SECRET_BYTES: usize = 32;
        const MAX_SESSION_MAX_AGE: i64 = 366 * 24 * 60 * 60;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 || self.auth.session_max_age > MAX_SESSION_MAX_AGE {
            return Err(AppError::Config(format!(
                "auth.session_max_age must be between 1 and {MAX_SESSION_MAX_AGE} seconds"
            )));
        }

        if let Some(bad) = self
            .auth
            .protected_paths
            .iter()
            .find(|path| !path.starts_with('/'))
        {
            return Err(AppError::Config(format!(
                "auth.protected_paths entry {bad:?} must start with '/'"
            )));
        }

        if self.identity.anon_key.trim().is_empty() {
            return Err(AppError::Config(
                "identity.anon_key must not be empty".to_string(),
            ));
        }

        Url::parse(&self.identity.url)
            .map_err(|e| AppError::Config(format!("identity.url is invalid: {e}")))?;

        let public_url = Url::parse(&self.server.public_url)
            .map_err(|e| AppError::Config(format!("server.public_url is invalid: {e}")))?;
        let host = public_url.host_str().unwrap_or_default();

        if public_url.scheme() != "https" {
            if is_local_host(host) {
                tracing::warn!(
                    host = %host,
                    "Using insecure session cookies for local development"
                );
            } else {
                return Err(AppError::Config(
                    "server.public_url must be https for non-local hosts".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                public_url: "http://localhost:3000".to_string(),
            },
            identity: IdentityConfig {
                url: "https://project.supabase.co".to_string(),
                anon_key: "anon-key".to_string(),
                timeout_seconds: 10,
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
                protected_paths: vec!["/".to_string(), "/dashboard".to_string()],
                gate_failure_policy: GateFailurePolicy::Open,
                session_cookie: default_session_cookie(),
                verifier_cookie: default_verifier_cookie(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_host() {
        let mut config = valid_config();
        config.server.public_url = "http://app.example.com".to_string();

        let error = config
            .validate()
            .expect_err("public hosts must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("must be https")
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_session_max_age() {
        let mut config = valid_config();
        config.auth.session_max_age = i64::MAX;
        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::Config(message)) if message.contains("auth.session_max_age")
        ));

        config.auth.session_max_age = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_protected_path() {
        let mut config = valid_config();
        config.auth.protected_paths.push("dashboard".to_string());

        assert!(config.validate().is_err());
    }

    #[test]
    fn protected_paths_match_exactly() {
        let config = valid_config();
        assert!(config.is_protected("/"));
        assert!(config.is_protected("/dashboard"));
        assert!(!config.is_protected("/dashboard/settings"));
        assert!(!config.is_protected("/login"));
    }

    #[test]
    fn url_for_strips_trailing_slash() {
        let mut config = valid_config();
        config.server.public_url = "https://app.example.com/".to_string();
        assert_eq!(
            config.server.url_for("/auth/callback"),
            "https://app.example.com/auth/callback"
        );
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn failure_policy_defaults_to_open() {
        assert_eq!(GateFailurePolicy::default(), GateFailurePolicy::Open);
    }
}
