use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use serde_json::json;

use crate::interface_adapters::handlers::error_response;
use crate::interface_adapters::protocol::ErrorResponse;
use crate::interface_adapters::state::AppState;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// Reports which optional integrations are wired up, without leaking any
// secret material.
pub async fn env_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ai_provider": state.config.ai_provider,
        "stability_key_present": state.config.stability_api_key.is_some(),
        "google_oauth_configured": state.oauth.is_configured(),
        "email_configured": state.config.email_api_key.is_some(),
        "public_base_url": state.config.public_base_url,
    }))
}

fn guess_content_type(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

async fn read_upload_file(
    state: &AppState,
    name: &str,
) -> Result<Vec<u8>, (StatusCode, Json<ErrorResponse>)> {
    // Uploads are stored flat; any path structure in the name is hostile.
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(error_response(StatusCode::NOT_FOUND, "no such file"));
    }
    let path = state.config.upload_dir.join(name);
    tokio::fs::read(&path)
        .await
        .map_err(|_| error_response(StatusCode::NOT_FOUND, "no such file"))
}

pub async fn serve_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(HeaderMap, Vec<u8>), (StatusCode, Json<ErrorResponse>)> {
    let bytes = read_upload_file(&state, &name).await?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(guess_content_type(&name)),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok((headers, bytes))
}

// Same file, forced as an attachment so the browser saves instead of
// rendering.
pub async fn download_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(HeaderMap, Vec<u8>), (StatusCode, Json<ErrorResponse>)> {
    let bytes = read_upload_file(&state, &name).await?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok((headers, bytes))
}
