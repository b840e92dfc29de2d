use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{
    EmailToken, GuestVisitor, IdentityKey, TokenPurpose, UserAccount,
};
use crate::domain::errors::{GenerationError, StoreError};
use crate::domain::prompt::PromptPlan;

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// Port for registered-account storage used by auth and ledger workflows.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserAccount>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError>;
    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        is_verified: bool,
        free_credits: i32,
        verify_bonus_claimed: bool,
    ) -> Result<UserAccount, StoreError>;
    // Conditional decrement: affects no row at zero balance. Returns whether
    // a credit was actually taken, so decrement-if-positive is linearizable.
    async fn debit_prepaid_credit(&self, id: i64) -> Result<bool, StoreError>;
    // Marks the user verified; adds the bonus and sets the claimed flag in
    // the same statement only when the flag was still unset. Returns whether
    // the bonus was granted by this call.
    async fn mark_verified_with_bonus(&self, id: i64, bonus: i32) -> Result<bool, StoreError>;
    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

// Port for guest-visitor storage.
#[async_trait]
pub trait GuestStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<GuestVisitor>, StoreError>;
    async fn create(&self, id: &str, credits: i32) -> Result<GuestVisitor, StoreError>;
    async fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    // Conditional decrement, same contract as the prepaid debit.
    async fn debit_credit(&self, id: &str) -> Result<bool, StoreError>;
}

// Port for email verification tokens (links and OTP codes).
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: EmailToken) -> Result<(), StoreError>;
    async fn find_valid(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailToken>, StoreError>;
    async fn find_valid_for_user(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailToken>, StoreError>;
    async fn delete(&self, token: &str) -> Result<(), StoreError>;
    // Reissuing an OTP replaces any previous codes for the user.
    async fn delete_for_user(&self, user_id: i64, purpose: TokenPurpose)
        -> Result<(), StoreError>;
}

// Append-only record of accounted actions, read back newest-first to compute
// rolling-window counts and the Nth-most-recent timestamp.
#[async_trait]
pub trait UsageLog: Send + Sync {
    async fn append(&self, identity: &IdentityKey, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn events_since(
        &self,
        identity: &IdentityKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
}

// Port for outbound email. Adapters are best-effort; callers log failures
// rather than failing the request.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), String>;
}

// Port for the third-party image-generation provider.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn restyle(
        &self,
        image: Vec<u8>,
        filename: &str,
        plan: &PromptPlan,
    ) -> Result<Vec<u8>, GenerationError>;
}

// Identity claims returned by the OAuth provider after code exchange.
#[derive(Clone, Debug)]
pub struct OAuthUserInfo {
    pub email: String,
    pub email_verified: bool,
}

// Port for the Google OAuth code-exchange flow.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn is_configured(&self) -> bool;
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<OAuthUserInfo, String>;
}

// Port for append-only analytics rows. Failures are logged, never fatal.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn append(
        &self,
        file: &'static str,
        headers: &[&'static str],
        row: Vec<String>,
    ) -> Result<(), String>;
}
