//! HTML pages, downloads and the history listing.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use std::path::Path as FsPath;
use tracing::warn;

use super::super::history::ConversionRecord;
use super::super::templates;
use super::super::AppState;

/// `GET /`: upload form and recent conversions.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let records = state.history.recent().await;
    Html(templates::index_page(&records, &state.base_config))
}

/// `GET /preview/:id`: inline escaped document plus output paths.
pub async fn preview(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.history.get(&id).await else {
        return not_found().await.into_response();
    };

    let content = if record.has_preview {
        match tokio::fs::read_to_string(&record.document_path).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Cannot read {}: {}", record.document_path.display(), e);
                return Redirect::to(&format!(
                    "/?error={}",
                    urlencoding::encode("Error: Output file not found")
                ))
                .into_response();
            }
        }
    } else {
        None
    };

    Html(templates::preview_page(&record, content.as_deref())).into_response()
}

/// `GET /download/:id/:kind` where kind is `md` (the document) or `meta`.
pub async fn download(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> Response {
    let Some(record) = state.history.get(&id).await else {
        return (StatusCode::NOT_FOUND, "Conversion not found").into_response();
    };

    let path = match kind.as_str() {
        "md" => record.document_path.clone(),
        "meta" => record.metadata_path(),
        _ => return (StatusCode::BAD_REQUEST, "Invalid file type").into_response(),
    };

    let content = match tokio::fs::read(&path).await {
        Ok(c) => c,
        Err(_) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };

    (
        [
            (header::CONTENT_TYPE, content_type(&path).to_string()),
            (header::CONTENT_DISPOSITION, attachment(&record, &path)),
        ],
        content,
    )
        .into_response()
}

/// `GET /api/conversions`: the history, newest first.
pub async fn api_conversions(State(state): State<AppState>) -> Json<Vec<ConversionRecord>> {
    Json(state.history.recent().await)
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(templates::not_found_page()))
}

fn content_type(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") => "text/markdown; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn attachment(record: &ConversionRecord, path: &FsPath) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "_"))
        .unwrap_or_else(|| record.id.clone());
    format!("attachment; filename=\"{}\"", name)
}
