use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{AppendHeaders, Redirect};
use axum::Json;
use tracing::{info, warn};

use crate::domain::entities::UserAccount;
use crate::domain::errors::AuthError;
use crate::interface_adapters::handlers::error_response;
use crate::interface_adapters::identity::{clear_cookie, session_cookie, sign_session, AUTH_COOKIE};
use crate::interface_adapters::protocol::{
    ErrorResponse, LoginRequest, OkResponse, OtpRequest, OtpVerifyRequest, RegisterRequest,
    VerifyLinkQuery,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::login::LoginUseCase;
use crate::use_cases::otp::{OtpOutcome, RequestOtpUseCase, VerifyOtpUseCase};
use crate::use_cases::register::RegisterUseCase;
use crate::use_cases::verify_email::VerifyEmailUseCase;

type SetCookie = AppendHeaders<[(axum::http::HeaderName, String); 1]>;

fn issue_session(state: &AppState, user: &UserAccount) -> SetCookie {
    let token = sign_session(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expire_minutes,
        state.clock.now().timestamp(),
    );
    AppendHeaders([(SET_COOKIE, session_cookie(&token))])
}

// One email carries both the link and the code, matching what the frontend
// asks the user for.
async fn deliver_verification_email(state: &AppState, user: &UserAccount, token: &str, code: &str) {
    let link = format!("{}/auth/verify?token={token}", state.config.public_base_url);
    let html = format!(
        "<p>Your verification code is <b>{code}</b>.</p>\
         <p>Or verify directly: <a href=\"{link}\">{link}</a></p>"
    );
    if let Err(err) = state
        .mailer
        .send(&user.email, "Verify your RestyleRoom account", &html)
        .await
    {
        warn!(email = %user.email, error = %err, "verification email failed");
    }
}

async fn notify_owner(state: &AppState, subject: &str, html: &str) {
    if let Some(owner) = &state.config.owner_email {
        if let Err(err) = state.mailer.send(owner, subject, html).await {
            warn!(error = %err, "owner notification failed");
        }
    }
}

async fn record_registration(state: &AppState, email: &str, method: &str) {
    let row = vec![
        state.clock.now().to_rfc3339(),
        email.to_string(),
        method.to_string(),
    ];
    if let Err(err) = state
        .analytics
        .append("registrations.csv", &["ts", "email", "method"], row)
        .await
    {
        warn!(error = %err, "registration analytics write failed");
    }
}

fn map_register_error(err: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        AuthError::InvalidEmail | AuthError::InvalidPassword => StatusCode::BAD_REQUEST,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

#[tracing::instrument(name = "register", skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(SetCookie, Json<OkResponse>), (StatusCode, Json<ErrorResponse>)> {
    let use_case = RegisterUseCase {
        clock: state.clock.clone(),
        users: state.users.clone(),
        tokens: state.tokens.clone(),
    };
    let result = use_case
        .execute(&payload.email, &payload.password)
        .await
        .map_err(map_register_error)?;

    info!(user_id = result.user.id, "account registered");
    deliver_verification_email(&state, &result.user, &result.verify_token, &result.otp_code).await;
    notify_owner(
        &state,
        "New registration",
        &format!("<p>New account: {}</p>", result.user.email),
    )
    .await;
    record_registration(&state, &result.user.email, "password").await;

    Ok((
        issue_session(&state, &result.user),
        Json(OkResponse::with_message("Check your email for a verification code")),
    ))
}

// Landing point of the emailed link; the browser ends up on the frontend
// either way, with the outcome in the query string.
pub async fn verify_email_link(
    State(state): State<AppState>,
    Query(query): Query<VerifyLinkQuery>,
) -> Redirect {
    let use_case = VerifyEmailUseCase {
        clock: state.clock.clone(),
        users: state.users.clone(),
        tokens: state.tokens.clone(),
        ledger: state.ledger(),
    };
    let target = match use_case.execute(&query.token).await {
        Ok(user) => {
            info!(user_id = user.id, "email verified via link");
            format!("{}/login.html?verified=1", state.config.frontend_base_url)
        }
        Err(err) => {
            warn!(error = %err, "link verification rejected");
            format!("{}/login.html?verified=0", state.config.frontend_base_url)
        }
    };
    Redirect::to(&target)
}

fn map_otp_error(err: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        AuthError::InvalidEmail | AuthError::InvalidOtpFormat => StatusCode::BAD_REQUEST,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

// Issues (or reissues, replacing the previous code) a six-digit OTP.
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> Result<Json<OkResponse>, (StatusCode, Json<ErrorResponse>)> {
    let use_case = RequestOtpUseCase {
        clock: state.clock.clone(),
        users: state.users.clone(),
        tokens: state.tokens.clone(),
    };
    match use_case.execute(&payload.email).await.map_err(map_otp_error)? {
        OtpOutcome::Issued { user, code } => {
            let html = format!("<p>Your verification code is <b>{code}</b>.</p>");
            if let Err(err) = state
                .mailer
                .send(&user.email, "Your RestyleRoom verification code", &html)
                .await
            {
                warn!(email = %user.email, error = %err, "otp email failed");
            }
            Ok(Json(OkResponse::with_message("Verification code sent")))
        }
        OtpOutcome::AlreadyVerified => {
            Ok(Json(OkResponse::with_message("Account is already verified")))
        }
    }
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpVerifyRequest>,
) -> Result<(SetCookie, Json<OkResponse>), (StatusCode, Json<ErrorResponse>)> {
    let use_case = VerifyOtpUseCase {
        clock: state.clock.clone(),
        users: state.users.clone(),
        tokens: state.tokens.clone(),
        ledger: state.ledger(),
    };
    let user = use_case
        .execute(&payload.email, &payload.code)
        .await
        .map_err(map_otp_error)?;

    info!(user_id = user.id, "email verified via otp");
    Ok((
        issue_session(&state, &user),
        Json(OkResponse::with_message("Email verified")),
    ))
}

fn map_login_error(err: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        // A malformed email reads as bad credentials too; the login form
        // never learns which part was wrong.
        AuthError::InvalidEmail | AuthError::InvalidCredentials => error_response(
            StatusCode::UNAUTHORIZED,
            AuthError::InvalidCredentials.to_string(),
        ),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(SetCookie, Json<OkResponse>), (StatusCode, Json<ErrorResponse>)> {
    let use_case = LoginUseCase {
        clock: state.clock.clone(),
        users: state.users.clone(),
    };
    let user = use_case
        .execute(&payload.email, &payload.password)
        .await
        .map_err(map_login_error)?;

    Ok((issue_session(&state, &user), Json(OkResponse::new())))
}

// Re-sends the verification link (and a fresh code) to the logged-in,
// still-unverified account.
pub async fn resend_verification(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<OkResponse>, (StatusCode, Json<ErrorResponse>)> {
    use crate::interface_adapters::identity::{cookie_value, parse_session};
    use crate::use_cases::register::{issue_link_token, issue_otp, OTP_TTL_MINUTES, VERIFY_LINK_TTL_MINUTES};

    let user_id = cookie_value(&headers, AUTH_COOKIE)
        .and_then(|token| parse_session(&token, &state.config.jwt_secret))
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "not signed in"))?;
    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable"))?
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "not signed in"))?;

    if user.is_verified {
        return Ok(Json(OkResponse::with_message("Account is already verified")));
    }

    let token = issue_link_token(
        state.clock.as_ref(),
        state.tokens.as_ref(),
        user.id,
        VERIFY_LINK_TTL_MINUTES,
    )
    .await
    .map_err(map_otp_error)?;
    let code = issue_otp(
        state.clock.as_ref(),
        state.tokens.as_ref(),
        user.id,
        OTP_TTL_MINUTES,
    )
    .await
    .map_err(map_otp_error)?;
    deliver_verification_email(&state, &user, &token, &code).await;

    Ok(Json(OkResponse::with_message("Verification email sent")))
}

pub async fn logout() -> (SetCookie, Json<OkResponse>) {
    (
        AppendHeaders([(SET_COOKIE, clear_cookie(AUTH_COOKIE))]),
        Json(OkResponse::new()),
    )
}
