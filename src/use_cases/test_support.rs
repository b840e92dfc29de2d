use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::domain::entities::{
    EmailToken, GuestVisitor, IdentityKey, TokenPurpose, UserAccount,
};
use crate::domain::errors::{GenerationError, StoreError};
use crate::domain::ports::{
    AnalyticsSink, Clock, GuestStore, ImageGenerator, Mailer, OAuthProvider, OAuthUserInfo,
    TokenStore, UsageLog, UserStore,
};
use crate::domain::prompt::PromptPlan;

// Shared fixed time source for deterministic tests.
pub(crate) struct FixedClock(AtomicI64);

impl FixedClock {
    pub(crate) fn at(epoch_seconds: i64) -> Self {
        Self(AtomicI64::new(epoch_seconds))
    }

    pub(crate) fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0.load(Ordering::SeqCst), 0)
            .single()
            .expect("fixed clock out of range")
    }
}

// Toggles used by negative-path tests to simulate infrastructure failures.
#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub find: bool,
    pub write: bool,
    // Makes conditional debits report zero affected rows, as if a concurrent
    // request spent the last credit first.
    pub lose_debit_race: bool,
}

pub(crate) struct InMemoryUsers {
    rows: Mutex<HashMap<i64, UserAccount>>,
    next_id: AtomicI64,
    failures: Mutex<FailureFlags>,
}

impl InMemoryUsers {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            failures: Mutex::new(FailureFlags::default()),
        }
    }

    pub(crate) fn set_failures(&self, failures: FailureFlags) {
        *self.failures.lock().expect("users mutex poisoned") = failures;
    }

    fn flags(&self) -> FailureFlags {
        *self.failures.lock().expect("users mutex poisoned")
    }

    pub(crate) fn credits_of(&self, id: i64) -> i32 {
        let rows = self.rows.lock().expect("users mutex poisoned");
        rows.get(&id).expect("expected user row").free_credits
    }
}

#[async_trait]
impl UserStore for InMemoryUsers {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserAccount>, StoreError> {
        if self.flags().find {
            return Err(StoreError("find failed".to_string()));
        }
        let rows = self.rows.lock().expect("users mutex poisoned");
        Ok(rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        if self.flags().find {
            return Err(StoreError("find failed".to_string()));
        }
        let rows = self.rows.lock().expect("users mutex poisoned");
        Ok(rows.values().find(|u| u.email == email).cloned())
    }

    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        is_verified: bool,
        free_credits: i32,
        verify_bonus_claimed: bool,
    ) -> Result<UserAccount, StoreError> {
        if self.flags().write {
            return Err(StoreError("create failed".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = UserAccount {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_verified,
            free_credits,
            verify_bonus_claimed,
            created_at: Utc::now(),
            last_login_at: None,
        };
        let mut rows = self.rows.lock().expect("users mutex poisoned");
        rows.insert(id, user.clone());
        Ok(user)
    }

    async fn debit_prepaid_credit(&self, id: i64) -> Result<bool, StoreError> {
        let flags = self.flags();
        if flags.write {
            return Err(StoreError("debit failed".to_string()));
        }
        if flags.lose_debit_race {
            return Ok(false);
        }
        let mut rows = self.rows.lock().expect("users mutex poisoned");
        match rows.get_mut(&id) {
            Some(user) if user.free_credits > 0 => {
                user.free_credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_verified_with_bonus(&self, id: i64, bonus: i32) -> Result<bool, StoreError> {
        if self.flags().write {
            return Err(StoreError("update failed".to_string()));
        }
        let mut rows = self.rows.lock().expect("users mutex poisoned");
        let Some(user) = rows.get_mut(&id) else {
            return Ok(false);
        };
        user.is_verified = true;
        if user.verify_bonus_claimed {
            return Ok(false);
        }
        user.free_credits += bonus;
        user.verify_bonus_claimed = true;
        Ok(true)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("users mutex poisoned");
        if let Some(user) = rows.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

pub(crate) struct InMemoryGuests {
    rows: Mutex<HashMap<String, GuestVisitor>>,
    failures: Mutex<FailureFlags>,
}

impl InMemoryGuests {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            failures: Mutex::new(FailureFlags::default()),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn set_failures(&self, failures: FailureFlags) {
        *self.failures.lock().expect("guests mutex poisoned") = failures;
    }

    fn flags(&self) -> FailureFlags {
        *self.failures.lock().expect("guests mutex poisoned")
    }

    pub(crate) fn credits_of(&self, id: &str) -> i32 {
        let rows = self.rows.lock().expect("guests mutex poisoned");
        rows.get(id).expect("expected guest row").credits
    }
}

#[async_trait]
impl GuestStore for InMemoryGuests {
    async fn find(&self, id: &str) -> Result<Option<GuestVisitor>, StoreError> {
        if self.flags().find {
            return Err(StoreError("find failed".to_string()));
        }
        let rows = self.rows.lock().expect("guests mutex poisoned");
        Ok(rows.get(id).cloned())
    }

    async fn create(&self, id: &str, credits: i32) -> Result<GuestVisitor, StoreError> {
        if self.flags().write {
            return Err(StoreError("create failed".to_string()));
        }
        let guest = GuestVisitor {
            id: id.to_string(),
            credits,
            created_at: Utc::now(),
            last_seen: Utc::now(),
        };
        let mut rows = self.rows.lock().expect("guests mutex poisoned");
        rows.insert(id.to_string(), guest.clone());
        Ok(guest)
    }

    async fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("guests mutex poisoned");
        if let Some(guest) = rows.get_mut(id) {
            guest.last_seen = at;
        }
        Ok(())
    }

    async fn debit_credit(&self, id: &str) -> Result<bool, StoreError> {
        let flags = self.flags();
        if flags.write {
            return Err(StoreError("debit failed".to_string()));
        }
        if flags.lose_debit_race {
            return Ok(false);
        }
        let mut rows = self.rows.lock().expect("guests mutex poisoned");
        match rows.get_mut(id) {
            Some(guest) if guest.credits > 0 => {
                guest.credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub(crate) struct InMemoryTokens {
    rows: Mutex<Vec<EmailToken>>,
}

impl InMemoryTokens {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn tokens_for(&self, user_id: i64, purpose: TokenPurpose) -> Vec<String> {
        let rows = self.rows.lock().expect("tokens mutex poisoned");
        rows.iter()
            .filter(|t| t.user_id == user_id && t.purpose == purpose)
            .map(|t| t.token.clone())
            .collect()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokens {
    async fn insert(&self, token: EmailToken) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("tokens mutex poisoned");
        rows.push(token);
        Ok(())
    }

    async fn find_valid(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailToken>, StoreError> {
        let rows = self.rows.lock().expect("tokens mutex poisoned");
        Ok(rows
            .iter()
            .find(|t| t.token == token && t.purpose == purpose && t.expires_at >= now)
            .cloned())
    }

    async fn find_valid_for_user(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailToken>, StoreError> {
        let rows = self.rows.lock().expect("tokens mutex poisoned");
        Ok(rows
            .iter()
            .find(|t| t.user_id == user_id && t.purpose == purpose && t.expires_at >= now)
            .cloned())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("tokens mutex poisoned");
        rows.retain(|t| t.token != token);
        Ok(())
    }

    async fn delete_for_user(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("tokens mutex poisoned");
        rows.retain(|t| !(t.user_id == user_id && t.purpose == purpose));
        Ok(())
    }
}

pub(crate) struct InMemoryUsage {
    rows: Mutex<Vec<(IdentityKey, DateTime<Utc>)>>,
}

impl InMemoryUsage {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.lock().expect("usage mutex poisoned").len()
    }
}

#[async_trait]
impl UsageLog for InMemoryUsage {
    async fn append(&self, identity: &IdentityKey, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().expect("usage mutex poisoned");
        rows.push((identity.clone(), at));
        Ok(())
    }

    async fn events_since(
        &self,
        identity: &IdentityKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let rows = self.rows.lock().expect("usage mutex poisoned");
        let mut events: Vec<DateTime<Utc>> = rows
            .iter()
            .filter(|(key, at)| key == identity && *at >= since)
            .map(|(_, at)| *at)
            .collect();
        events.sort_unstable_by(|a, b| b.cmp(a));
        Ok(events)
    }
}

// Records outbound mail so tests can assert on subjects and recipients.
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), String> {
        let mut sent = self.sent.lock().expect("mailer mutex poisoned");
        sent.push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

// Provider double that echoes the upload back, like mock mode.
pub(crate) struct EchoGenerator;

#[async_trait]
impl ImageGenerator for EchoGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn restyle(
        &self,
        image: Vec<u8>,
        _filename: &str,
        _plan: &PromptPlan,
    ) -> Result<Vec<u8>, GenerationError> {
        Ok(image)
    }
}

// Provider double that always fails, to exercise the fallback path.
pub(crate) struct FailingGenerator;

#[async_trait]
impl ImageGenerator for FailingGenerator {
    fn name(&self) -> &'static str {
        "stability"
    }

    async fn restyle(
        &self,
        _image: Vec<u8>,
        _filename: &str,
        _plan: &PromptPlan,
    ) -> Result<Vec<u8>, GenerationError> {
        Err(GenerationError::Upstream {
            status: 500,
            message: "boom".to_string(),
        })
    }
}

pub(crate) struct FakeOAuth {
    pub email: String,
    pub email_verified: bool,
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn is_configured(&self) -> bool {
        true
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://oauth.test/authorize?state={state}")
    }

    async fn exchange_code(&self, _code: &str) -> Result<OAuthUserInfo, String> {
        Ok(OAuthUserInfo {
            email: self.email.clone(),
            email_verified: self.email_verified,
        })
    }
}

pub(crate) struct RecordingAnalytics {
    rows: Mutex<Vec<(&'static str, Vec<String>)>>,
}

impl RecordingAnalytics {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn rows_for(&self, file: &str) -> Vec<Vec<String>> {
        let rows = self.rows.lock().expect("analytics mutex poisoned");
        rows.iter()
            .filter(|(name, _)| *name == file)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

#[async_trait]
impl AnalyticsSink for RecordingAnalytics {
    async fn append(
        &self,
        file: &'static str,
        _headers: &[&'static str],
        row: Vec<String>,
    ) -> Result<(), String> {
        let mut rows = self.rows.lock().expect("analytics mutex poisoned");
        rows.push((file, row));
        Ok(())
    }
}
