use std::sync::Arc;

use crate::domain::entities::UserAccount;
use crate::domain::errors::AuthError;
use crate::domain::ports::{OAuthUserInfo, UserStore};
use crate::use_cases::entitlement::{EntitlementLedger, LedgerConfig};
use crate::use_cases::register::{normalize_email, random_token};

// Upserts an account from OAuth claims. New accounts created from a
// Google-verified email start verified with the bonus already claimed;
// existing unverified accounts are verified through the ledger's idempotent
// grant.
pub struct GoogleLoginUseCase {
    pub users: Arc<dyn UserStore>,
    pub ledger: EntitlementLedger,
    pub config: LedgerConfig,
}

impl GoogleLoginUseCase {
    pub async fn execute(&self, info: OAuthUserInfo) -> Result<UserAccount, AuthError> {
        let email = normalize_email(&info.email)?;

        let existing = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|_| AuthError::StorageFailure)?;

        let user = match existing {
            Some(user) => {
                if info.email_verified && !user.is_verified {
                    self.ledger
                        .grant_verification_bonus(user.id)
                        .await
                        .map_err(|_| AuthError::StorageFailure)?;
                    self.users
                        .find_by_id(user.id)
                        .await
                        .map_err(|_| AuthError::StorageFailure)?
                        .ok_or(AuthError::UserNotFound)?
                } else {
                    user
                }
            }
            None => {
                // Password login stays possible via reset later; the stored
                // hash is of a throwaway random secret.
                let password_hash = bcrypt::hash(random_token(), bcrypt::DEFAULT_COST)
                    .map_err(|_| AuthError::StorageFailure)?;
                let bonus = if info.email_verified {
                    self.config.verification_bonus
                } else {
                    0
                };
                self.users
                    .create(
                        &email,
                        &password_hash,
                        info.email_verified,
                        bonus,
                        info.email_verified,
                    )
                    .await
                    .map_err(|_| AuthError::StorageFailure)?
            }
        };

        Ok(user)
    }
}
