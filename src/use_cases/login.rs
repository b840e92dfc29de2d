use std::sync::Arc;

use crate::domain::entities::UserAccount;
use crate::domain::errors::AuthError;
use crate::domain::ports::{Clock, UserStore};
use crate::use_cases::register::normalize_email;

// Password login use case with injected dependencies.
pub struct LoginUseCase {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
}

impl LoginUseCase {
    pub async fn execute(&self, email: &str, password: &str) -> Result<UserAccount, AuthError> {
        let email = normalize_email(email)?;

        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            // Same error for unknown email and bad password.
            .ok_or(AuthError::InvalidCredentials)?;

        if !bcrypt::verify(password, &user.password_hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }

        // Best-effort bookkeeping; a failed touch does not block the login.
        let _ = self.users.touch_last_login(user.id, self.clock.now()).await;

        Ok(user)
    }
}
