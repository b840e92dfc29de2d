use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::ports::{
    AnalyticsSink, Clock, GuestStore, ImageGenerator, Mailer, OAuthProvider, TokenStore,
    UsageLog, UserStore,
};
use crate::frameworks::config::Config;
use crate::use_cases::entitlement::EntitlementLedger;

// Application state. Arc<dyn Trait> fields hold any implementation
// (dependency injection), so route tests run on in-memory adapters.
#[derive(Clone)]
pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserStore>,
    pub guests: Arc<dyn GuestStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub usage: Arc<dyn UsageLog>,
    pub mailer: Arc<dyn Mailer>,
    pub generator: Arc<dyn ImageGenerator>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub config: Arc<Config>,
}

impl AppState {
    // Ledgers are built per request from the shared ports; construction is a
    // handful of Arc clones.
    pub fn ledger(&self) -> EntitlementLedger {
        EntitlementLedger {
            clock: self.clock.clone(),
            users: self.users.clone(),
            guests: self.guests.clone(),
            usage: self.usage.clone(),
            config: self.config.ledger,
        }
    }
}

// System clock adapter used outside of tests.
#[derive(Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
