use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entities::{
    EmailToken, GuestVisitor, IdentityKey, TokenPurpose, UserAccount,
};
use crate::domain::errors::StoreError;
use crate::domain::ports::{GuestStore, TokenStore, UsageLog, UserStore};

// PostgreSQL-backed adapter implementing the storage ports. One struct so
// startup wiring hands out clones of a single pool holder.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    StoreError(err.to_string())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    is_verified: bool,
    free_credits: i32,
    verify_bonus_claimed: bool,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            is_verified: row.is_verified,
            free_credits: row.free_credits,
            verify_bonus_claimed: row.verify_bonus_claimed,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GuestRow {
    id: String,
    credits: i32,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl From<GuestRow> for GuestVisitor {
    fn from(row: GuestRow) -> Self {
        Self {
            id: row.id,
            credits: row.credits,
            created_at: row.created_at,
            last_seen: row.last_seen,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    user_id: i64,
    token: String,
    purpose: String,
    expires_at: DateTime<Utc>,
}

impl From<TokenRow> for EmailToken {
    fn from(row: TokenRow) -> Self {
        Self {
            user_id: row.user_id,
            token: row.token,
            purpose: match row.purpose.as_str() {
                "otp" => TokenPurpose::Otp,
                _ => TokenPurpose::Verify,
            },
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Into::into))
    }

    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        is_verified: bool,
        free_credits: i32,
        verify_bonus_claimed: bool,
    ) -> Result<UserAccount, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash, is_verified, free_credits, verify_bonus_claimed)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(is_verified)
        .bind(free_credits)
        .bind(verify_bonus_claimed)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn debit_prepaid_credit(&self, id: i64) -> Result<bool, StoreError> {
        // Conditional update keeps decrement-if-positive linearizable; no row
        // is affected once the balance hits zero.
        let result = sqlx::query(
            "UPDATE users SET free_credits = free_credits - 1 WHERE id = $1 AND free_credits > 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_verified_with_bonus(&self, id: i64, bonus: i32) -> Result<bool, StoreError> {
        // Bonus and flag travel in one statement, gated on the flag being
        // unset, so the grant happens at most once.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                free_credits = free_credits + $2,
                verify_bonus_claimed = TRUE
            WHERE id = $1 AND verify_bonus_claimed = FALSE
            "#,
        )
        .bind(id)
        .bind(bonus)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Already claimed; still make sure the verified flag lands.
        sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(false)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl GuestStore for PgStore {
    async fn find(&self, id: &str) -> Result<Option<GuestVisitor>, StoreError> {
        let row = sqlx::query_as::<_, GuestRow>("SELECT * FROM guests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Into::into))
    }

    async fn create(&self, id: &str, credits: i32) -> Result<GuestVisitor, StoreError> {
        // Upsert so two first-contact requests with the same cookie cannot
        // fail on the primary key.
        let row = sqlx::query_as::<_, GuestRow>(
            r#"
            INSERT INTO guests (id, credits)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET last_seen = now()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(credits)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE guests SET last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn debit_credit(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE guests SET credits = credits - 1 WHERE id = $1 AND credits > 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: EmailToken) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO email_tokens (user_id, token, purpose, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.purpose.as_str())
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn find_valid(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, token, purpose, expires_at FROM email_tokens
            WHERE token = $1 AND purpose = $2 AND expires_at >= $3
            "#,
        )
        .bind(token)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_valid_for_user(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<EmailToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, token, purpose, expires_at FROM email_tokens
            WHERE user_id = $1 AND purpose = $2 AND expires_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM email_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_for_user(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM email_tokens WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl UsageLog for PgStore {
    async fn append(&self, identity: &IdentityKey, at: DateTime<Utc>) -> Result<(), StoreError> {
        let (user_id, guest_id) = match identity {
            IdentityKey::User(id) => (Some(*id), None),
            IdentityKey::Guest(id) => (None, Some(id.as_str())),
        };
        sqlx::query("INSERT INTO usage_events (user_id, guest_id, created_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(guest_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn events_since(
        &self,
        identity: &IdentityKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        // Newest-first so the caller can index the Nth-most-recent event.
        let query = match identity {
            IdentityKey::User(_) => {
                r#"
                SELECT created_at FROM usage_events
                WHERE user_id = $1 AND created_at >= $2
                ORDER BY created_at DESC
                "#
            }
            IdentityKey::Guest(_) => {
                r#"
                SELECT created_at FROM usage_events
                WHERE guest_id = $1 AND created_at >= $2
                ORDER BY created_at DESC
                "#
            }
        };
        let builder = sqlx::query_scalar::<_, DateTime<Utc>>(query);
        let builder = match identity {
            IdentityKey::User(id) => builder.bind(*id),
            IdentityKey::Guest(id) => builder.bind(id.clone()),
        };
        builder
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)
    }
}
