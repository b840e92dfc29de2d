use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::Identity;
use crate::domain::errors::StoreError;
use crate::interface_adapters::state::AppState;

pub const AUTH_COOKIE: &str = "rs_auth";
pub const GUEST_COOKIE: &str = "rs_guest";
pub const OAUTH_STATE_COOKIE: &str = "rs_oauth_state";

const MONTH_SECONDS: i64 = 60 * 60 * 24 * 30;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

// Signs the session token carried by the auth cookie.
pub fn sign_session(user_id: i64, secret: &str, expire_minutes: i64, now_epoch: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now_epoch + expire_minutes * 60,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    // HS256 signing over serializable claims cannot fail at runtime.
    .unwrap_or_default()
}

// Returns the user id for a valid, unexpired session token.
pub fn parse_session(token: &str, secret: &str) -> Option<i64> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;
    data.claims.sub.parse().ok()
}

// Minimal cookie-header lookup; the service only ever reads three cookies.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub fn session_cookie(token: &str) -> String {
    format!("{AUTH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={MONTH_SECONDS}")
}

pub fn guest_cookie(id: &str) -> String {
    format!("{GUEST_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={MONTH_SECONDS}")
}

pub fn oauth_state_cookie(state: &str) -> String {
    format!("{OAUTH_STATE_COOKIE}={state}; Path=/; HttpOnly; SameSite=Lax; Max-Age=600")
}

pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub struct ResolvedIdentity {
    pub identity: Identity,
    // Set when a guest cookie was just issued; callers attach it to the
    // response.
    pub set_cookie: Option<String>,
}

// The identity resolver: a valid auth cookie wins; otherwise the guest
// cookie, creating the guest row (and the cookie itself) on first contact.
pub async fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<ResolvedIdentity, StoreError> {
    if let Some(token) = cookie_value(headers, AUTH_COOKIE) {
        if let Some(user_id) = parse_session(&token, &state.config.jwt_secret) {
            if let Some(user) = state.users.find_by_id(user_id).await? {
                return Ok(ResolvedIdentity {
                    identity: Identity::User(user),
                    set_cookie: None,
                });
            }
        }
    }

    let (guest_id, fresh_cookie) = match cookie_value(headers, GUEST_COOKIE) {
        Some(id) => (id, false),
        None => (Uuid::new_v4().simple().to_string(), true),
    };

    let guest = match state.guests.find(&guest_id).await? {
        Some(guest) => {
            let _ = state
                .guests
                .touch_last_seen(&guest_id, state.clock.now())
                .await;
            guest
        }
        None => {
            state
                .guests
                .create(&guest_id, state.config.ledger.guest_starting_credits)
                .await?
        }
    };

    Ok(ResolvedIdentity {
        identity: Identity::Guest(guest),
        set_cookie: fresh_cookie.then(|| guest_cookie(&guest_id)),
    })
}
