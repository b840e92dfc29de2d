use std::sync::Arc;

use chrono::Duration;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::domain::entities::{EmailToken, TokenPurpose, UserAccount};
use crate::domain::errors::AuthError;
use crate::domain::ports::{Clock, TokenStore, UserStore};

// Verification link tokens live for three days; OTP codes for fifteen
// minutes.
pub const VERIFY_LINK_TTL_MINUTES: i64 = 60 * 24 * 3;
pub const OTP_TTL_MINUTES: i64 = 15;

const PASSWORD_MIN_LEN: usize = 6;
const PASSWORD_MAX_LEN: usize = 128;

// Response returned by the registration use case. The caller delivers the
// token and code by email and issues the session cookie.
pub struct RegisterResponse {
    pub user: UserAccount,
    pub verify_token: String,
    pub otp_code: String,
}

// Registration use case with injected dependencies.
pub struct RegisterUseCase {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl RegisterUseCase {
    pub async fn execute(&self, email: &str, password: &str) -> Result<RegisterResponse, AuthError> {
        let email = normalize_email(email)?;
        if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password.len()) {
            return Err(AuthError::InvalidPassword);
        }

        if self
            .users
            .find_by_email(&email)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }

        let password_hash =
            bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| AuthError::StorageFailure)?;

        // New accounts start unverified with no prepaid credits; the bonus is
        // granted by the ledger on verification.
        let user = self
            .users
            .create(&email, &password_hash, false, 0, false)
            .await
            .map_err(|_| AuthError::StorageFailure)?;

        let verify_token = issue_link_token(
            self.clock.as_ref(),
            self.tokens.as_ref(),
            user.id,
            VERIFY_LINK_TTL_MINUTES,
        )
        .await?;
        let otp_code =
            issue_otp(self.clock.as_ref(), self.tokens.as_ref(), user.id, OTP_TTL_MINUTES).await?;

        Ok(RegisterResponse {
            user,
            verify_token,
            otp_code,
        })
    }
}

pub fn normalize_email(value: &str) -> Result<String, AuthError> {
    let email = value.trim().to_lowercase();
    // Minimal shape check; delivery is the real validator.
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.len() > 320 {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

// Opaque urlsafe token for verification links.
pub fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect()
}

pub async fn issue_link_token(
    clock: &dyn Clock,
    tokens: &dyn TokenStore,
    user_id: i64,
    ttl_minutes: i64,
) -> Result<String, AuthError> {
    let token = random_token();
    tokens
        .insert(EmailToken {
            user_id,
            token: token.clone(),
            purpose: TokenPurpose::Verify,
            expires_at: clock.now() + Duration::minutes(ttl_minutes),
        })
        .await
        .map_err(|_| AuthError::StorageFailure)?;
    Ok(token)
}

// Six-digit OTP. Reissuing replaces any previous codes for the user.
pub async fn issue_otp(
    clock: &dyn Clock,
    tokens: &dyn TokenStore,
    user_id: i64,
    ttl_minutes: i64,
) -> Result<String, AuthError> {
    let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
    tokens
        .delete_for_user(user_id, TokenPurpose::Otp)
        .await
        .map_err(|_| AuthError::StorageFailure)?;
    tokens
        .insert(EmailToken {
            user_id,
            token: code.clone(),
            purpose: TokenPurpose::Otp,
            expires_at: clock.now() + Duration::minutes(ttl_minutes),
        })
        .await
        .map_err(|_| AuthError::StorageFailure)?;
    Ok(code)
}
