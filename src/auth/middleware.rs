//! Session gate
//!
//! Runs once per request. Protected paths need a principal; everything else
//! passes through untouched.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use super::LOGIN_PATH;
use super::session::{Session, verify_session_token};
use crate::AppState;
use crate::config::GateFailurePolicy;
use crate::identity::{IdentityClient, IdentityError, Principal, RequestCredentials};
use crate::metrics::GATE_DECISIONS_TOTAL;

/// Outcome of the gate for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    RedirectToLogin,
}

impl GateDecision {
    fn as_label(&self) -> &'static str {
        match self {
            GateDecision::Continue => "continue",
            GateDecision::RedirectToLogin => "redirect",
        }
    }
}

/// Decide what to do with a request
///
/// `lookup` is the identity client's answer for the request, `None` when
/// the path was not protected and no lookup happened.
pub fn classify(
    protected: bool,
    lookup: Option<&Result<Option<Principal>, IdentityError>>,
    policy: GateFailurePolicy,
) -> GateDecision {
    if !protected {
        return GateDecision::Continue;
    }

    match lookup {
        Some(Ok(Some(_))) => GateDecision::Continue,
        Some(Err(_)) if policy == GateFailurePolicy::Open => GateDecision::Continue,
        _ => GateDecision::RedirectToLogin,
    }
}

/// Decode the session cookie, treating anything unusable as no session
pub(crate) fn session_from_jar(state: &AppState, jar: &CookieJar) -> Option<Session> {
    let cookie = jar.get(&state.config.auth.session_cookie)?;
    match verify_session_token(cookie.value(), &state.config.auth.session_secret) {
        Ok(session) => Some(session),
        Err(error) => {
            tracing::debug!(%error, "Ignoring unusable session cookie");
            None
        }
    }
}

/// Build the identity client for the current request
pub(crate) fn request_identity_client(state: &AppState, jar: &CookieJar) -> IdentityClient {
    let credentials = RequestCredentials {
        access_token: session_from_jar(state, jar).map(|session| session.access_token),
        code_verifier: jar
            .get(&state.config.auth.verifier_cookie)
            .map(|cookie| cookie.value().to_owned()),
    };
    IdentityClient::new(state.identity.clone(), credentials)
}

/// Result of the one identity lookup made for a request
///
/// `None` covers both "no session" and "backend failed"; either way the
/// backend is not asked again for the same request.
#[derive(Debug, Clone)]
struct ResolvedPrincipal(Option<Principal>);

/// Middleware that redirects unauthenticated requests for protected paths
///
/// Identity backend failures do not fail the request: with the default
/// `open` policy the request continues unauthenticated and the failure is
/// logged. The lookup result is added to the request extensions.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/dashboard", get(dashboard))
///     .layer(middleware::from_fn_with_state(state, session_gate));
/// ```
pub async fn session_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let protected = state.config.is_protected(&path);
    let policy = state.config.auth.gate_failure_policy;

    let lookup = if protected {
        let client = request_identity_client(&state, &jar);
        Some(client.get_user().await)
    } else {
        None
    };

    if let Some(Err(error)) = &lookup {
        tracing::error!(
            %error,
            path = %path,
            policy = ?policy,
            "Session lookup failed in gate"
        );
    }

    let decision = classify(protected, lookup.as_ref(), policy);
    GATE_DECISIONS_TOTAL
        .with_label_values(&[decision.as_label()])
        .inc();

    match decision {
        GateDecision::Continue => {
            if let Some(result) = lookup {
                request
                    .extensions_mut()
                    .insert(ResolvedPrincipal(result.ok().flatten()));
            }
            next.run(request).await
        }
        GateDecision::RedirectToLogin => {
            tracing::debug!(path = %path, "No principal for protected path");
            Redirect::temporary(LOGIN_PATH).into_response()
        }
    }
}

/// Optional principal extractor
///
/// Reuses the gate's lookup when it made one, otherwise asks the identity
/// client. Backend failures yield `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ResolvedPrincipal(principal)) = parts.extensions.get::<ResolvedPrincipal>() {
            return Ok(MaybeUser(principal.clone()));
        }

        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let client = request_identity_client(&app_state, &jar);
        if !client.has_session() {
            return Ok(MaybeUser(None));
        }

        let principal = match client.get_user().await {
            Ok(principal) => principal,
            Err(error) => {
                tracing::warn!(%error, "Session lookup failed");
                None
            }
        };

        parts
            .extensions
            .insert(ResolvedPrincipal(principal.clone()));

        Ok(MaybeUser(principal))
    }
}
