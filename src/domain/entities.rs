use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Registered account row. `free_credits` is the prepaid balance consumed
// before the rolling daily quota applies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub free_credits: i32,
    pub verify_bonus_claimed: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

// Anonymous visitor identified by a long-lived cookie. Starts with two
// credits, never replenished.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuestVisitor {
    pub id: String,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// Subject of entitlement accounting: a registered user or an anonymous guest.
#[derive(Clone, Debug)]
pub enum Identity {
    User(UserAccount),
    Guest(GuestVisitor),
}

impl Identity {
    pub fn key(&self) -> IdentityKey {
        match self {
            Identity::User(user) => IdentityKey::User(user.id),
            Identity::Guest(guest) => IdentityKey::Guest(guest.id.clone()),
        }
    }
}

// Lightweight identity reference used for usage-event accounting. A usage
// event belongs to exactly one identity kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    User(i64),
    Guest(String),
}

// Link tokens and OTP codes stored for email verification.
#[derive(Clone, Debug)]
pub struct EmailToken {
    pub user_id: i64,
    pub token: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    Verify,
    Otp,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Verify => "verify",
            TokenPurpose::Otp => "otp",
        }
    }
}

// Outcome of the entitlement check, including which bucket authorized the
// action so callers and analytics can tell them apart.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Allowed { bucket: AccountingBucket },
    Denied(Denial),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountingBucket {
    Prepaid,
    DailyQuota,
    Guest,
}

impl AccountingBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountingBucket::Prepaid => "prepaid",
            AccountingBucket::DailyQuota => "daily_quota",
            AccountingBucket::Guest => "guest",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Denial {
    DailyLimitReached {
        used: u32,
        limit: u32,
        // Seconds until the oldest of the counted events ages out of the
        // 24-hour window.
        retry_after_seconds: i64,
        next_available: DateTime<Utc>,
    },
    GuestCreditsExhausted,
}

// Read-only projection served by the credits endpoint. Must not mutate state.
#[derive(Clone, Debug, Serialize)]
pub struct EntitlementSummary {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_credits: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_credits: Option<i32>,
    pub daily_limit: u32,
    pub used_last_24h: u32,
    pub next_available_ts: Option<i64>,
}
