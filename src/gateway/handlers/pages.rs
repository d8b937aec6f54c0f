use axum::{
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};

use super::error_response;

/// Placeholder shell for page routes that made it past the guard.
pub async fn page_shell(uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    }

    let path = escape_html(uri.path());
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{name}</title></head>\n<body data-path=\"{path}\"><div id=\"app\"></div></body>\n</html>\n",
        name = env!("CARGO_PKG_NAME"),
    ))
    .into_response()
}

fn escape_html(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            other => other.to_string(),
        })
        .collect()
}
