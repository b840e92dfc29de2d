use axum::extract::State;
use axum::Json;
use tracing::{info, warn};

use crate::interface_adapters::protocol::OkResponse;
use crate::interface_adapters::state::AppState;

// Payment-provider webhook. Records the purchase and pings the owner; credit
// fulfilment is driven by a later reconciliation, not by this endpoint.
// TODO verify the provider signature header once the provider account moves
// off test mode and a signing secret exists.
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<OkResponse> {
    let event = payload
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let reference = payload
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("-")
        .to_string();

    info!(event = %event, reference = %reference, "payment webhook received");

    let row = vec![state.clock.now().to_rfc3339(), event.clone(), reference];
    if let Err(err) = state
        .analytics
        .append("purchases.csv", &["ts", "event", "reference"], row)
        .await
    {
        warn!(error = %err, "purchase analytics write failed");
    }

    if let Some(owner) = &state.config.owner_email {
        let html = format!("<p>Payment event received: <b>{event}</b></p>");
        if let Err(err) = state.mailer.send(owner, "New payment event", &html).await {
            warn!(error = %err, "owner notification failed");
        }
    }

    Json(OkResponse::new())
}
