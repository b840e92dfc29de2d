use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, Redirect};
use axum::Json;
use tracing::{info, warn};

use crate::interface_adapters::handlers::error_response;
use crate::interface_adapters::identity::{
    clear_cookie, cookie_value, oauth_state_cookie, session_cookie, sign_session,
    OAUTH_STATE_COOKIE,
};
use crate::interface_adapters::protocol::{ErrorResponse, OAuthCallbackQuery};
use crate::interface_adapters::state::AppState;
use crate::use_cases::google_login::GoogleLoginUseCase;
use crate::use_cases::register::random_token;

type StartResponse = (
    AppendHeaders<[(axum::http::HeaderName, String); 1]>,
    Redirect,
);

// Kicks off the authorization-code flow. The random state lands in a
// short-lived cookie and must echo back on the callback.
pub async fn google_start(
    State(state): State<AppState>,
) -> Result<StartResponse, (StatusCode, Json<ErrorResponse>)> {
    if !state.oauth.is_configured() {
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Google sign-in is not configured",
        ));
    }

    let nonce = random_token();
    let url = state.oauth.authorize_url(&nonce);
    Ok((
        AppendHeaders([(SET_COOKIE, oauth_state_cookie(&nonce))]),
        Redirect::to(&url),
    ))
}

type CallbackResponse = (
    AppendHeaders<Vec<(axum::http::HeaderName, String)>>,
    Redirect,
);

fn failed_redirect(state: &AppState) -> CallbackResponse {
    (
        AppendHeaders(vec![(SET_COOKIE, clear_cookie(OAUTH_STATE_COOKIE))]),
        Redirect::to(&format!(
            "{}/login.html?google=0",
            state.config.frontend_base_url
        )),
    )
}

// Finishes the flow: state check, code exchange, account upsert, session
// cookie. Every failure path lands the browser back on the login page.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> CallbackResponse {
    let Some(code) = query.code else {
        warn!("oauth callback without a code");
        return failed_redirect(&state);
    };
    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || expected != query.state {
        warn!("oauth state mismatch");
        return failed_redirect(&state);
    }

    let info = match state.oauth.exchange_code(&code).await {
        Ok(info) => info,
        Err(err) => {
            warn!(error = %err, "oauth code exchange failed");
            return failed_redirect(&state);
        }
    };

    // Known email or not decides whether this counts as a registration.
    let was_known = matches!(state.users.find_by_email(&info.email).await, Ok(Some(_)));

    let use_case = GoogleLoginUseCase {
        users: state.users.clone(),
        ledger: state.ledger(),
        config: state.config.ledger,
    };
    let user = match use_case.execute(info).await {
        Ok(user) => user,
        Err(err) => {
            warn!(error = %err, "oauth login rejected");
            return failed_redirect(&state);
        }
    };

    if !was_known {
        let row = vec![
            state.clock.now().to_rfc3339(),
            user.email.clone(),
            "google".to_string(),
        ];
        if let Err(err) = state
            .analytics
            .append("registrations.csv", &["ts", "email", "method"], row)
            .await
        {
            warn!(error = %err, "registration analytics write failed");
        }
    }

    info!(user_id = user.id, "google sign-in completed");
    let token = sign_session(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expire_minutes,
        state.clock.now().timestamp(),
    );
    (
        AppendHeaders(vec![
            (SET_COOKIE, clear_cookie(OAUTH_STATE_COOKIE)),
            (SET_COOKIE, session_cookie(&token)),
        ]),
        Redirect::to(&format!(
            "{}/snap.html?google=1",
            state.config.frontend_base_url
        )),
    )
}
