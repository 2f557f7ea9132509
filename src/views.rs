//! Minimal HTML rendering shared by the pages

use axum::response::Html;
use html_escape::{encode_double_quoted_attribute, encode_text};

/// Wrap page content in the common document shell
pub fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - authgate</title>
</head>
<body>
    <main>
{body}
    </main>
</body>
</html>
"#,
        title = encode_text(title),
        body = body,
    ))
}

/// Escape user-controlled text for element content
pub fn text(value: &str) -> String {
    encode_text(value).into_owned()
}

/// Escape user-controlled text for a double-quoted attribute value
pub fn attr(value: &str) -> String {
    encode_double_quoted_attribute(value).into_owned()
}
