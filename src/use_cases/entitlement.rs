use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::entities::{
    AccountingBucket, Decision, Denial, EntitlementSummary, Identity, IdentityKey,
};
use crate::domain::errors::StoreError;
use crate::domain::ports::{Clock, GuestStore, UsageLog, UserStore};

// Limits are injected at construction; the ledger never reads ambient
// configuration.
#[derive(Clone, Copy, Debug)]
pub struct LedgerConfig {
    pub daily_free_limit: u32,
    pub window_hours: i64,
    pub verification_bonus: i32,
    pub guest_starting_credits: i32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            daily_free_limit: 2,
            window_hours: 24,
            verification_bonus: 2,
            guest_starting_credits: 2,
        }
    }
}

// Entitlement ledger: decides whether an identity may act now and performs
// the corresponding debit before the caller proceeds to the expensive
// generation step.
pub struct EntitlementLedger {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub guests: Arc<dyn GuestStore>,
    pub usage: Arc<dyn UsageLog>,
    pub config: LedgerConfig,
}

impl EntitlementLedger {
    // Ordered decision tree: prepaid credits first for verified users, then
    // the rolling 24-hour quota; guests spend their fixed balance and are
    // hard-blocked at zero.
    pub async fn check_and_debit(&self, identity: &Identity) -> Result<Decision, StoreError> {
        match identity {
            Identity::User(user) => {
                // Re-read so the balance reflects concurrent spends.
                let user = self
                    .users
                    .find_by_id(user.id)
                    .await?
                    .ok_or_else(|| StoreError("user row missing".to_string()))?;

                if user.is_verified && user.free_credits > 0 {
                    if self.users.debit_prepaid_credit(user.id).await? {
                        return Ok(Decision::Allowed {
                            bucket: AccountingBucket::Prepaid,
                        });
                    }
                    // Another request took the last prepaid credit between the
                    // read and the debit; continue into the quota path.
                }

                let (used, next_available) =
                    self.window_state(&IdentityKey::User(user.id)).await?;
                if used >= self.config.daily_free_limit {
                    let now = self.clock.now();
                    let next = next_available
                        .ok_or_else(|| StoreError("window state inconsistent".to_string()))?;
                    return Ok(Decision::Denied(Denial::DailyLimitReached {
                        used,
                        limit: self.config.daily_free_limit,
                        retry_after_seconds: (next - now).num_seconds().max(0),
                        next_available: next,
                    }));
                }

                // No counter to decrement here: the slot is consumed by the
                // usage event appended after the action completes.
                Ok(Decision::Allowed {
                    bucket: AccountingBucket::DailyQuota,
                })
            }
            Identity::Guest(guest) => {
                if self.guests.debit_credit(&guest.id).await? {
                    Ok(Decision::Allowed {
                        bucket: AccountingBucket::Guest,
                    })
                } else {
                    Ok(Decision::Denied(Denial::GuestCreditsExhausted))
                }
            }
        }
    }

    // Appends one immutable usage event at the current time. Called for every
    // permitted action, independent of which bucket authorized it.
    pub async fn record_usage(&self, identity: &IdentityKey) -> Result<(), StoreError> {
        self.usage.append(identity, self.clock.now()).await
    }

    // Idempotent: the bonus is granted at most once per user, gated by the
    // monotone claimed flag. Returns whether this call granted it.
    pub async fn grant_verification_bonus(&self, user_id: i64) -> Result<bool, StoreError> {
        self.users
            .mark_verified_with_bonus(user_id, self.config.verification_bonus)
            .await
    }

    // Read-only status projection. Does not mutate any balance or log.
    pub async fn describe(&self, identity: &Identity) -> Result<EntitlementSummary, StoreError> {
        match identity {
            Identity::User(user) => {
                let user = self
                    .users
                    .find_by_id(user.id)
                    .await?
                    .ok_or_else(|| StoreError("user row missing".to_string()))?;
                let (used, next_available) =
                    self.window_state(&IdentityKey::User(user.id)).await?;

                Ok(EntitlementSummary {
                    kind: "user",
                    email: Some(user.email),
                    verified: user.is_verified,
                    free_credits: Some(user.free_credits),
                    guest_credits: None,
                    daily_limit: self.config.daily_free_limit,
                    used_last_24h: used,
                    next_available_ts: next_available.map(|ts| ts.timestamp()),
                })
            }
            Identity::Guest(guest) => {
                let key = IdentityKey::Guest(guest.id.clone());
                let since = self.clock.now() - Duration::hours(self.config.window_hours);
                let used = self.usage.events_since(&key, since).await?.len() as u32;

                Ok(EntitlementSummary {
                    kind: "guest",
                    email: None,
                    verified: false,
                    free_credits: None,
                    guest_credits: Some(guest.credits),
                    daily_limit: 0,
                    used_last_24h: used,
                    next_available_ts: None,
                })
            }
        }
    }

    // Counts events in the trailing window and, once the limit is reached,
    // finds when the limit-th most recent event ages out. Events come back
    // newest-first from the log.
    async fn window_state(
        &self,
        identity: &IdentityKey,
    ) -> Result<(u32, Option<DateTime<Utc>>), StoreError> {
        let since = self.clock.now() - Duration::hours(self.config.window_hours);
        let events = self.usage.events_since(identity, since).await?;
        let used = events.len() as u32;

        let next_available = events
            .get(self.config.daily_free_limit.saturating_sub(1) as usize)
            .filter(|_| used >= self.config.daily_free_limit)
            .map(|kth| *kth + Duration::hours(self.config.window_hours));

        Ok((used, next_available))
    }
}
