//! Embedded prompt page: serves the UI assets compiled into the binary

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "ui/"]
struct PageAssets;

/// Serve index.html
pub async fn index_handler() -> impl IntoResponse {
    match PageAssets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "Prompt page missing from build").into_response(),
    }
}

/// Serve static assets (JS, CSS)
pub async fn static_handler(axum::extract::Path(path): axum::extract::Path<String>) -> impl IntoResponse {
    match PageAssets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
