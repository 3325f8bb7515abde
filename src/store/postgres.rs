//! PostgreSQL implementation of [`KeyStore`].
//!
//! # Atomicity
//!
//! Admission is a single conditional `UPDATE ... WHERE used_today < daily_quota
//! RETURNING *`. PostgreSQL row locking serializes concurrent updates on the same
//! key, so two requests racing for the last unit of quota cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    models::{
        api_key::{ApiKey, NewApiKey},
        plan::Plan,
        usage::{ApiUsage, NewApiUsage, UsageFilter},
        user::{User, UserFilter, UserStatus},
    },
    store::{ConsumeOutcome, KeyStore, StoreError, StoreResult},
};

#[derive(Debug, Clone)]
pub struct PgKeyStore {
    pool: DbPool,
}

impl PgKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Filter shared by the user listing and its count. `$1` search, `$2` plan, `$3` status.
const USER_FILTER: &str = r#"
    WHERE ($1::TEXT IS NULL OR username ILIKE '%' || $1 || '%' OR email ILIKE '%' || $1 || '%')
      AND ($2::TEXT IS NULL OR plan = $2)
      AND ($3::TEXT IS NULL OR status = $3)
"#;

/// Filter shared by the usage listing and its count. `$1` user, `$2` endpoint, `$3` status code.
const USAGE_FILTER: &str = r#"
    WHERE ($1::UUID IS NULL OR user_id = $1)
      AND ($2::TEXT IS NULL OR endpoint ILIKE '%' || $2 || '%')
      AND ($3::INTEGER IS NULL OR status_code = $3)
"#;

/// Map constraint violations on insert to their domain meaning.
fn classify_insert_error(err: sqlx::Error, on_unique: StoreError) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return on_unique;
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::UnknownUser;
        }
    }
    err.into()
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn create_user(&self, username: &str, email: &str, plan: Plan) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, plan)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(plan.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_insert_error(e, StoreError::DuplicateUser))
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<User>, i64)> {
        let plan = filter.plan.map(|p| p.as_str());
        let status = filter.status.map(|s| s.as_str());

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT * FROM users {USER_FILTER} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.search.as_deref())
        .bind(plan)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {USER_FILTER}"))
            .bind(filter.search.as_deref())
            .bind(plan)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn change_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        daily_quota: i32,
    ) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>("UPDATE users SET plan = $1 WHERE id = $2 RETURNING *")
            .bind(plan.as_str())
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(user) = user else {
            tx.rollback().await?;
            return Ok(None);
        };

        // Revoked keys keep their old quota until they are regenerated
        sqlx::query(
            r#"
            UPDATE api_keys
            SET daily_quota = $1,
                updated_at = NOW()
            WHERE user_id = $2 AND status = 'active'
            "#,
        )
        .bind(daily_quota)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(user))
    }

    async fn block_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>("UPDATE users SET status = $1 WHERE id = $2 RETURNING *")
            .bind(UserStatus::Blocked.as_str())
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(user) = user else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE api_keys
            SET status = 'revoked',
                updated_at = NOW()
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(user))
    }

    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("UPDATE users SET status = $1 WHERE id = $2 RETURNING *")
            .bind(UserStatus::Active.as_str())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn delete_user(&self, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_key(&self, key: NewApiKey) -> StoreResult<ApiKey> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (user_id, name, key_hash, key_prefix, daily_quota, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(key.user_id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(key.daily_quota)
        .bind(key.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify_insert_error(e, StoreError::DuplicateOwner))
    }

    async fn find_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE id = $1 AND user_id = $2",
        )
        .bind(key_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn list_keys(&self, user_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn rename_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys
            SET name = $1,
                updated_at = NOW()
            WHERE id = $2 AND user_id = $3
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(key_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn replace_key_hash(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        key_hash: &str,
        key_prefix: &str,
    ) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys
            SET key_hash = $1,
                key_prefix = $2,
                status = 'active',
                updated_at = NOW()
            WHERE id = $3 AND user_id = $4
            RETURNING *
            "#,
        )
        .bind(key_hash)
        .bind(key_prefix)
        .bind(key_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn revoke_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys
            SET status = 'revoked',
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(key_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn delete_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND user_id = $2")
            .bind(key_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_active_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND status = 'active'",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn try_consume(&self, key_id: Uuid, now: DateTime<Utc>) -> StoreResult<ConsumeOutcome> {
        let admitted = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys
            SET used_today = used_today + 1,
                total_requests = total_requests + 1,
                last_used_at = $2,
                updated_at = $2
            WHERE id = $1
              AND status = 'active'
              AND used_today < daily_quota
            RETURNING *
            "#,
        )
        .bind(key_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(key) = admitted {
            return Ok(ConsumeOutcome::Admitted(key));
        }

        // No row matched: find out whether the quota ran out or the key went away
        let current = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE id = $1 AND status = 'active'",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match current {
            Some(key) => ConsumeOutcome::Exhausted(key),
            None => ConsumeOutcome::Inactive,
        })
    }

    async fn reset_daily_usage(&self) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE api_keys SET used_today = 0 WHERE status = 'active'")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_usage(&self, usage: NewApiUsage) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_usage (
                api_key_id,
                user_id,
                endpoint,
                method,
                status_code,
                response_time_ms,
                ip_address,
                user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(usage.api_key_id)
        .bind(usage.user_id)
        .bind(usage.endpoint)
        .bind(usage.method)
        .bind(usage.status_code)
        .bind(usage.response_time_ms)
        .bind(usage.ip_address)
        .bind(usage.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_usage(
        &self,
        filter: &UsageFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<ApiUsage>, i64)> {
        let logs = sqlx::query_as::<_, ApiUsage>(&format!(
            "SELECT * FROM api_usage {USAGE_FILTER} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.user_id)
        .bind(filter.endpoint.as_deref())
        .bind(filter.status_code)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM api_usage {USAGE_FILTER}"))
                .bind(filter.user_id)
                .bind(filter.endpoint.as_deref())
                .bind(filter.status_code)
                .fetch_one(&self.pool)
                .await?;

        Ok((logs, total))
    }
}
