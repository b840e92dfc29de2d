use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::interface_adapters::handlers::auth::{
    login, logout, register, request_otp, resend_verification, verify_email_link, verify_otp,
};
use crate::interface_adapters::handlers::credits::get_credits;
use crate::interface_adapters::handlers::files::{
    download_upload, env_check, healthz, serve_upload,
};
use crate::interface_adapters::handlers::google::{google_callback, google_start};
use crate::interface_adapters::handlers::style::style_image;
use crate::interface_adapters::handlers::webhook::payment_webhook;
use crate::interface_adapters::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/env-check", get(env_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/verify", get(verify_email_link))
        .route("/auth/request-otp", post(request_otp))
        .route("/auth/resend-otp", post(request_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend", post(resend_verification))
        .route("/auth/google/start", get(google_start))
        .route("/auth/google/callback", get(google_callback))
        .route("/credits", get(get_credits))
        .route("/style-image", post(style_image))
        .route("/uploads/{name}", get(serve_upload))
        .route("/download/{name}", get(download_upload))
        .route("/webhooks/payment", post(payment_webhook))
        // Uploads may legitimately approach the 8 MB cap plus multipart
        // framing; axum's default 2 MB limit would reject them first.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
