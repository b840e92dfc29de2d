use std::sync::Arc;

use crate::domain::entities::{TokenPurpose, UserAccount};
use crate::domain::errors::AuthError;
use crate::domain::ports::{Clock, TokenStore, UserStore};
use crate::use_cases::entitlement::EntitlementLedger;

// Verification-link use case: consumes the token, marks the user verified and
// routes the one-time bonus through the ledger.
pub struct VerifyEmailUseCase {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub ledger: EntitlementLedger,
}

impl VerifyEmailUseCase {
    pub async fn execute(&self, token: &str) -> Result<UserAccount, AuthError> {
        let stored = self
            .tokens
            .find_valid(token, TokenPurpose::Verify, self.clock.now())
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let user = self
            .users
            .find_by_id(stored.user_id)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::UserNotFound)?;

        self.ledger
            .grant_verification_bonus(user.id)
            .await
            .map_err(|_| AuthError::StorageFailure)?;

        // One-shot token: gone once used.
        self.tokens
            .delete(token)
            .await
            .map_err(|_| AuthError::StorageFailure)?;

        self.users
            .find_by_id(user.id)
            .await
            .map_err(|_| AuthError::StorageFailure)?
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::EmailToken;
    use crate::use_cases::entitlement::LedgerConfig;
    use crate::use_cases::test_support::{
        FixedClock, InMemoryGuests, InMemoryTokens, InMemoryUsage, InMemoryUsers,
    };
    use chrono::Duration;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<FixedClock>,
        users: Arc<InMemoryUsers>,
        tokens: Arc<InMemoryTokens>,
        use_case: VerifyEmailUseCase,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::at(NOW));
        let users = Arc::new(InMemoryUsers::new());
        let tokens = Arc::new(InMemoryTokens::new());
        let ledger = EntitlementLedger {
            clock: clock.clone(),
            users: users.clone(),
            guests: Arc::new(InMemoryGuests::new()),
            usage: Arc::new(InMemoryUsage::new()),
            config: LedgerConfig::default(),
        };
        let use_case = VerifyEmailUseCase {
            clock: clock.clone(),
            users: users.clone(),
            tokens: tokens.clone(),
            ledger,
        };
        Fixture {
            clock,
            users,
            tokens,
            use_case,
        }
    }

    async fn seed(fx: &Fixture, expires_in_minutes: i64) -> i64 {
        let user = fx
            .users
            .create("pilot@example.com", "hash", false, 0, false)
            .await
            .expect("expected seed user");
        fx.tokens
            .insert(EmailToken {
                user_id: user.id,
                token: "link-token".to_string(),
                purpose: TokenPurpose::Verify,
                expires_at: fx.clock.now() + Duration::minutes(expires_in_minutes),
            })
            .await
            .expect("expected token insert");
        user.id
    }

    #[tokio::test]
    async fn when_token_is_valid_then_user_is_verified_with_bonus_and_token_consumed() {
        let fx = fixture();
        let user_id = seed(&fx, 60).await;

        let user = fx
            .use_case
            .execute("link-token")
            .await
            .expect("expected verification to succeed");

        assert!(user.is_verified);
        assert_eq!(user.free_credits, 2);
        assert!(user.verify_bonus_claimed);
        assert!(fx.tokens.tokens_for(user_id, TokenPurpose::Verify).is_empty());
    }

    #[tokio::test]
    async fn when_token_is_expired_then_returns_invalid_or_expired() {
        let fx = fixture();
        seed(&fx, 60).await;
        fx.clock.advance(61 * 60);

        let result = fx.use_case.execute("link-token").await;

        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn when_token_is_unknown_then_returns_invalid_or_expired() {
        let fx = fixture();
        seed(&fx, 60).await;

        let result = fx.use_case.execute("other-token").await;

        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn when_user_was_already_verified_then_bonus_is_not_granted_again() {
        let fx = fixture();
        let user_id = seed(&fx, 60).await;
        fx.users
            .mark_verified_with_bonus(user_id, 2)
            .await
            .expect("expected first grant");

        let user = fx
            .use_case
            .execute("link-token")
            .await
            .expect("expected verification to succeed");

        assert_eq!(user.free_credits, 2);
    }
}
