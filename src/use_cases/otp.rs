use std::sync::Arc;

use crate::domain::entities::{TokenPurpose, UserAccount};
use crate::domain::errors::AuthError;
use crate::domain::ports::{Clock, TokenStore, UserStore};
use crate::use_cases::entitlement::EntitlementLedger;
use crate::use_cases::register::{issue_otp, normalize_email, OTP_TTL_MINUTES};

// Outcome of an OTP request: either a fresh code to deliver, or nothing to do
// because the account is already verified.
pub enum OtpOutcome {
    Issued { user: UserAccount, code: String },
    AlreadyVerified,
}

// OTP issue/reissue use case.
pub struct RequestOtpUseCase {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl RequestOtpUseCase {
    pub async fn execute(&self, email: &str) -> Result<OtpOutcome, AuthError> {
        let email = normalize_email(email)?;

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::UserNotFound)?;

        if user.is_verified {
            return Ok(OtpOutcome::AlreadyVerified);
        }

        let code = issue_otp(
            self.clock.as_ref(),
            self.tokens.as_ref(),
            user.id,
            OTP_TTL_MINUTES,
        )
        .await?;
        Ok(OtpOutcome::Issued { user, code })
    }
}

// OTP verification use case: a matching unexpired code verifies the account
// and routes the bonus through the ledger.
pub struct VerifyOtpUseCase {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub ledger: EntitlementLedger,
}

impl VerifyOtpUseCase {
    pub async fn execute(&self, email: &str, code: &str) -> Result<UserAccount, AuthError> {
        let email = normalize_email(email)?;
        let code = code.trim();
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidOtpFormat);
        }

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::UserNotFound)?;

        let stored = self
            .tokens
            .find_valid_for_user(user.id, TokenPurpose::Otp, self.clock.now())
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        if stored.token != code {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.ledger
            .grant_verification_bonus(user.id)
            .await
            .map_err(|_| AuthError::StorageFailure)?;
        self.tokens
            .delete(&stored.token)
            .await
            .map_err(|_| AuthError::StorageFailure)?;

        self.users
            .find_by_id(user.id)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::UserNotFound)
    }
}
