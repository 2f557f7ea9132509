//! OAuth authentication
//!
//! Handles:
//! - Login page and provider redirect
//! - OAuth callback and session cookie
//! - Session gate middleware

mod middleware;
mod oauth;
pub mod session;

pub use middleware::{GateDecision, MaybeUser, classify, session_gate};
pub use oauth::auth_router;
pub use session::{Session, create_session_token, verify_session_token};

/// Unauthenticated entry point
pub const LOGIN_PATH: &str = "/login";
/// OAuth redirect target
pub const CALLBACK_PATH: &str = "/auth/callback";
/// Where a successful sign-in lands
pub const LANDING_PATH: &str = "/dashboard";
/// Terminal page for failed sign-ins
pub const ERROR_PATH: &str = "/auth/auth-code-error";
