use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::AppendHeaders;
use axum::Json;
use tracing::error;

use crate::domain::entities::EntitlementSummary;
use crate::interface_adapters::handlers::error_response;
use crate::interface_adapters::identity::resolve_identity;
use crate::interface_adapters::protocol::ErrorResponse;
use crate::interface_adapters::state::AppState;

type CreditsResponse = (
    AppendHeaders<Vec<(axum::http::HeaderName, String)>>,
    Json<EntitlementSummary>,
);

// Read-only balance endpoint. First contact from a cookieless browser also
// mints the guest cookie here, so the landing page can show credits at once.
pub async fn get_credits(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<CreditsResponse, (StatusCode, Json<ErrorResponse>)> {
    let resolved = resolve_identity(&state, &headers).await.map_err(|err| {
        error!(error = %err, "identity resolution failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
    })?;

    let summary = state
        .ledger()
        .describe(&resolved.identity)
        .await
        .map_err(|err| {
            error!(error = %err, "credits lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
        })?;

    let cookies = resolved
        .set_cookie
        .into_iter()
        .map(|value| (SET_COOKIE, value))
        .collect();
    Ok((AppendHeaders(cookies), Json(summary)))
}
