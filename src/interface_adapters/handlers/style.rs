use axum::extract::{Multipart, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entities::{Denial, Identity};
use crate::domain::prompt::build_plan;
use crate::interface_adapters::handlers::error_response;
use crate::interface_adapters::identity::resolve_identity;
use crate::interface_adapters::protocol::StyleResponse;
use crate::interface_adapters::state::AppState;
use crate::use_cases::style_image::{GenerationResult, StyleError, StyleImageUseCase};

pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

struct Upload {
    bytes: Vec<u8>,
    filename: String,
    style: String,
    instructions: String,
}

// Pulls the multipart fields out; `image` is required, `style` and
// `instructions` are optional strings.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, (StatusCode, String)> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut filename = String::from("upload.png");
    let mut style = String::new();
    let mut instructions = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "image" => {
                if let Some(name) = field.file_name() {
                    filename = name.to_string();
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.starts_with("image/") {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "the uploaded file must be an image".to_string(),
                    ));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("upload failed: {e}")))?;
                if data.len() > MAX_UPLOAD_BYTES {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "image exceeds the 8 MB limit".to_string(),
                    ));
                }
                bytes = Some(data.to_vec());
            }
            "style" => {
                style = field.text().await.unwrap_or_default();
            }
            "instructions" => {
                instructions = field.text().await.unwrap_or_default();
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or((
        StatusCode::BAD_REQUEST,
        "missing file field".to_string(),
    ))?;
    if bytes.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "uploaded image is empty".to_string()));
    }

    Ok(Upload {
        bytes,
        filename,
        style,
        instructions,
    })
}

// Client-supplied names never reach the filesystem as-is.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['_', '.']).is_empty() {
        "upload.png".to_string()
    } else {
        cleaned
    }
}

fn denial_response(denial: Denial) -> Response {
    match denial {
        Denial::DailyLimitReached {
            used,
            limit,
            retry_after_seconds,
            next_available,
        } => {
            let hours = (retry_after_seconds + 3599) / 3600;
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "daily_limit_reached",
                    "used_last_24h": used,
                    "daily_limit": limit,
                    "retry_after_seconds": retry_after_seconds,
                    "next_available_ts": next_available.timestamp(),
                    "message": format!("Daily limit reached. Try again in about {hours}h."),
                })),
            )
                .into_response()
        }
        Denial::GuestCreditsExhausted => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "guest_credits_exhausted",
                "cta": "register",
                "message": "Free guest credits used up. Create an account to continue.",
            })),
        )
            .into_response(),
    }
}

fn identity_label(identity: &Identity) -> String {
    match identity {
        Identity::User(user) => format!("user:{}", user.id),
        Identity::Guest(guest) => format!("guest:{}", guest.id),
    }
}

type StyledOk = (
    AppendHeaders<Vec<(axum::http::HeaderName, String)>>,
    Json<StyleResponse>,
);

// The restyle endpoint: multipart upload in, styled image URL out. The
// entitlement gate runs inside the use case before the provider is called;
// a provider failure falls back to serving the original upload.
#[tracing::instrument(name = "style_image", skip_all)]
pub async fn style_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<StyledOk, Response> {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err((status, message)) => return Err(error_response(status, message).into_response()),
    };

    let resolved = resolve_identity(&state, &headers).await.map_err(|err| {
        error!(error = %err, "identity resolution failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response()
    })?;

    let ts = state.clock.now().timestamp();
    let original_name = format!("{ts}_{}", sanitize_filename(&upload.filename));
    let original_path = state.config.upload_dir.join(&original_name);
    if let Err(err) = tokio::fs::create_dir_all(&state.config.upload_dir).await {
        error!(error = %err, "upload directory unavailable");
        return Err(
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
                .into_response(),
        );
    }
    if let Err(err) = tokio::fs::write(&original_path, &upload.bytes).await {
        error!(error = %err, "upload write failed");
        return Err(
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
                .into_response(),
        );
    }

    let plan = build_plan(&upload.style, &upload.instructions);
    let use_case = StyleImageUseCase {
        ledger: state.ledger(),
        generator: state.generator.clone(),
    };
    let success = use_case
        .execute(&resolved.identity, &plan, upload.bytes, &original_name)
        .await
        .map_err(|err| match err {
            StyleError::Denied(denial) => denial_response(denial),
            StyleError::Storage(err) => {
                error!(error = %err, "entitlement accounting failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
                    .into_response()
            }
        })?;

    let (served_name, note) = match success.result {
        GenerationResult::Styled(styled) => {
            let styled_name = format!("{ts}_styled.png");
            let styled_path = state.config.upload_dir.join(&styled_name);
            match tokio::fs::write(&styled_path, &styled).await {
                Ok(()) => (styled_name, None),
                Err(err) => {
                    // Usage is already accounted; serve the original rather
                    // than failing the whole request.
                    warn!(error = %err, "styled image write failed, serving original");
                    (
                        original_name.clone(),
                        Some("Generation error: styled image could not be stored".to_string()),
                    )
                }
            }
        }
        GenerationResult::Fallback { note } => (original_name.clone(), Some(note)),
    };

    let label = if upload.instructions.trim().is_empty() {
        if upload.style.trim().is_empty() {
            "minimal".to_string()
        } else {
            upload.style.trim().to_lowercase()
        }
    } else {
        "custom".to_string()
    };

    let row = vec![
        state.clock.now().to_rfc3339(),
        identity_label(&resolved.identity),
        label.clone(),
        success.bucket.as_str().to_string(),
        if note.is_some() { "fallback" } else { "styled" }.to_string(),
    ];
    if let Err(err) = state
        .analytics
        .append(
            "generations.csv",
            &["ts", "identity", "style", "bucket", "outcome"],
            row,
        )
        .await
    {
        warn!(error = %err, "generation analytics write failed");
    }

    info!(
        identity = %identity_label(&resolved.identity),
        bucket = success.bucket.as_str(),
        "restyle served"
    );

    let cookies = resolved
        .set_cookie
        .into_iter()
        .map(|value| (SET_COOKIE, value))
        .collect();
    // Fallbacks carry a sentinel id the frontend recognizes.
    let prediction_id = if note.is_some() {
        "error_fallback".to_string()
    } else {
        Uuid::new_v4().to_string()
    };

    Ok((
        AppendHeaders(cookies),
        Json(StyleResponse {
            styled_urls: vec![format!(
                "{}/uploads/{served_name}",
                state.config.public_base_url
            )],
            filename: original_name,
            prediction_id,
            style: label,
            note,
        }),
    ))
}
