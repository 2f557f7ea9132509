//! Protected pages
//!
//! Both routes sit behind the session gate, so a request that reaches them
//! either carries a principal or got through because the identity backend
//! could not be asked.

use axum::{Router, response::Html, routing::get};

use crate::AppState;
use crate::auth::MaybeUser;
use url::Url;

use crate::identity::Principal;
use crate::views;

/// Create pages router
///
/// Routes:
/// - GET / - Home
/// - GET /dashboard - Dashboard
pub fn pages_router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/dashboard", get(dashboard))
}

async fn home(MaybeUser(user): MaybeUser) -> Html<String> {
    let greeting = match &user {
        Some(principal) => format!("Welcome back, {}.", views::text(principal.label())),
        None => "Welcome.".to_string(),
    };

    views::page(
        "Home",
        &format!(
            "        <h1>authgate</h1>\n        <p>{greeting}</p>\n        <p><a href=\"/dashboard\">Go to dashboard</a></p>\n"
        ),
    )
}

async fn dashboard(MaybeUser(user): MaybeUser) -> Html<String> {
    let body = match &user {
        Some(principal) => render_principal(principal),
        // Gate let us through after a backend failure.
        None => "        <p>Your session could not be confirmed right now. Some details are unavailable.</p>\n"
            .to_string(),
    };

    views::page(
        "Dashboard",
        &format!(
            "        <h1>Dashboard</h1>\n{body}        <form method=\"post\" action=\"/logout\"><button type=\"submit\">Log out</button></form>\n"
        ),
    )
}

fn render_principal(principal: &Principal) -> String {
    let mut rows = vec![format!(
        "        <p>Signed in as <strong>{}</strong></p>\n",
        views::text(principal.label())
    )];

    if let Some(email) = &principal.email {
        rows.push(format!("        <p>Email: {}</p>\n", views::text(email)));
    }
    if let Some(provider) = &principal.provider {
        rows.push(format!("        <p>Provider: {}</p>\n", views::text(provider)));
    }
    if let Some(avatar) = principal.avatar_url.as_deref().and_then(web_url) {
        rows.push(format!(
            "        <p><img src=\"{}\" alt=\"\" width=\"64\" height=\"64\"></p>\n",
            views::attr(avatar.as_str())
        ));
    }

    rows.concat()
}

/// Avatar URLs come from the provider; only plain web links are rendered
fn web_url(value: &str) -> Option<Url> {
    Url::parse(value)
        .ok()
        .filter(|url| matches!(url.scheme(), "https" | "http"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_fields_are_escaped() {
        let html = render_principal(&Principal {
            id: "1".to_string(),
            email: Some("<b>@example.com".to_string()),
            provider: Some("github".to_string()),
            name: Some("Ada & Co".to_string()),
            avatar_url: None,
        });
        assert!(html.contains("Ada &amp; Co"));
        assert!(html.contains("&lt;b&gt;@example.com"));
        assert!(html.contains("Provider: github"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn avatar_is_rendered_only_for_web_urls() {
        let mut principal = Principal {
            id: "1".to_string(),
            email: None,
            provider: None,
            name: Some("Ada".to_string()),
            avatar_url: Some("https://avatars.example.com/u/1?s=64&v=4".to_string()),
        };
        let html = render_principal(&principal);
        assert!(html.contains("<img src=\"https://avatars.example.com/u/1?s=64&amp;v=4\""));

        principal.avatar_url = Some("javascript:alert(1)".to_string());
        assert!(!render_principal(&principal).contains("<img"));
    }
}
