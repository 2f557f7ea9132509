//! OAuth sign-in flow
//!
//! The identity backend runs the actual authorization code flow with the
//! provider. This module starts it, receives the code and hands it back.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;

use super::middleware::{MaybeUser, request_identity_client};
use super::session::{Session, create_session_token};
use super::{CALLBACK_PATH, ERROR_PATH, LANDING_PATH, LOGIN_PATH};
use crate::AppState;
use crate::error::AppError;
use crate::identity::{IdentityError, Provider};
use crate::metrics::{CALLBACK_OUTCOMES_TOTAL, LOGIN_REDIRECTS_TOTAL};
use crate::views;

/// Path scope of the PKCE verifier cookie; covers the callback only
const VERIFIER_COOKIE_PATH: &str = "/auth";

/// Create authentication router
///
/// Routes:
/// - GET /login - Login page
/// - GET /auth/login/:provider - Start the OAuth flow
/// - GET /auth/callback - OAuth callback
/// - GET /auth/auth-code-error - Sign-in failure page
/// - POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, get(login_page))
        .route("/auth/login/:provider", get(login_trigger))
        .route(CALLBACK_PATH, get(callback))
        .route(ERROR_PATH, get(auth_code_error_page))
        .route("/logout", post(logout))
}

// =============================================================================
// Login Page
// =============================================================================

/// GET /login
///
/// Signed-in users go straight to the dashboard.
async fn login_page(MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::temporary(LANDING_PATH).into_response();
    }

    let buttons: String = Provider::ALL
        .iter()
        .map(|provider| {
            format!(
                "        <p><a href=\"/auth/login/{}\">Login with {}</a></p>\n",
                provider.as_str(),
                provider.display_name()
            )
        })
        .collect();

    views::page("Login", &format!("        <h1>Sign in</h1>\n{buttons}")).into_response()
}

// =============================================================================
// Login Trigger
// =============================================================================

/// GET /auth/login/:provider
///
/// # Steps
/// 1. Ask the identity client for the provider's authorize URL
/// 2. Store the PKCE verifier in a cookie scoped to the callback
/// 3. Redirect the browser to the identity backend
async fn login_trigger(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> crate::error::Result<impl IntoResponse> {
    let provider: Provider = provider.parse().map_err(|e: IdentityError| {
        AppError::Validation(e.to_string())
    })?;

    let client = request_identity_client(&state, &jar);
    let redirect_to = state.config.server.url_for(CALLBACK_PATH);
    let flow = client.sign_in_with_oauth(provider, &redirect_to)?;

    LOGIN_REDIRECTS_TOTAL
        .with_label_values(&[provider.as_str()])
        .inc();
    tracing::info!(provider = %provider, redirect_to = %redirect_to, "Starting OAuth flow");

    let verifier = Cookie::build((state.config.auth.verifier_cookie.clone(), flow.code_verifier))
        .path(VERIFIER_COOKIE_PATH)
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .build();

    Ok((jar.add(verifier), Redirect::temporary(&flow.url)))
}

// =============================================================================
// Callback Exchanger
// =============================================================================

/// Query parameters on the OAuth redirect
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// Provider or backend error code
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/callback
///
/// Exchanges the code for a session. Every failure ends on the error page;
/// the cause is only logged.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    // Built before the verifier cookie is dropped from the jar.
    let client = request_identity_client(&state, &jar);
    let jar = jar.remove(clear_cookie(
        &state.config.auth.verifier_cookie,
        VERIFIER_COOKIE_PATH,
    ));

    if let Some(error) = &query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "OAuth provider returned an error"
        );
    }

    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        CALLBACK_OUTCOMES_TOTAL
            .with_label_values(&["missing_code"])
            .inc();
        return (jar, Redirect::temporary(ERROR_PATH));
    };

    let tokens = match client.exchange_code_for_session(&code).await {
        Ok(tokens) => tokens,
        Err(error) => {
            tracing::warn!(%error, "Authorization code exchange failed");
            CALLBACK_OUTCOMES_TOTAL
                .with_label_values(&["exchange_failed"])
                .inc();
            return (jar, Redirect::temporary(ERROR_PATH));
        }
    };

    let session = Session::from_tokens(&tokens, state.config.auth.session_max_age);
    let token = match create_session_token(&session, &state.config.auth.session_secret) {
        Ok(token) => token,
        Err(error) => {
            tracing::error!(%error, "Failed to sign session cookie");
            CALLBACK_OUTCOMES_TOTAL.with_label_values(&["error"]).inc();
            return (jar, Redirect::temporary(ERROR_PATH));
        }
    };

    tracing::info!(user_id = ?session.user_id, "Session created");
    CALLBACK_OUTCOMES_TOTAL
        .with_label_values(&["success"])
        .inc();

    let cookie = Cookie::build((state.config.auth.session_cookie.clone(), token))
        .path("/")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .build();

    (jar.add(cookie), Redirect::temporary(LANDING_PATH))
}

/// GET /auth/auth-code-error
async fn auth_code_error_page() -> impl IntoResponse {
    views::page(
        "Sign-in failed",
        &format!(
            "        <h1>Sign-in failed</h1>\n        <p>We could not complete your sign-in. The link may have expired or already been used.</p>\n        <p><a href=\"{LOGIN_PATH}\">Try again</a></p>\n"
        ),
    )
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Revokes the backend session when possible and always clears the cookie.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let client = request_identity_client(&state, &jar);
    if let Err(error) = client.sign_out().await {
        tracing::warn!(%error, "Identity backend sign-out failed; clearing cookie anyway");
    }

    let jar = jar.remove(clear_cookie(&state.config.auth.session_cookie, "/"));
    (jar, Redirect::to(LOGIN_PATH))
}

// =============================================================================
// Helpers
// =============================================================================

fn clear_cookie(name: &str, path: &'static str) -> Cookie<'static> {
    Cookie::build((name.to_owned(), String::new()))
        .path(path)
        .http_only(true)
        .build()
}
