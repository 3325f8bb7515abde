//! In-memory [`KeyStore`] for tests.
//!
//! Every operation runs under one mutex, which gives `try_consume` the same
//! check-and-increment atomicity as the conditional UPDATE in PostgreSQL.
//! Individual operation groups can be switched to fail to exercise error paths.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{
        api_key::{ApiKey, KeyStatus, NewApiKey},
        plan::Plan,
        usage::{ApiUsage, NewApiUsage, UsageFilter},
        user::{User, UserFilter, UserStatus},
    },
    store::{ConsumeOutcome, KeyStore, StoreError, StoreResult},
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    keys: HashMap<Uuid, ApiKey>,
    hashes: HashMap<Uuid, String>,
    usage: Vec<ApiUsage>,
}

#[derive(Default)]
pub struct MemoryKeyStore {
    state: Mutex<State>,
    pub fail_lookups: AtomicBool,
    pub fail_consume: AtomicBool,
    pub fail_usage: AtomicBool,
    pub fail_reset: AtomicBool,
}

fn check(flag: &AtomicBool) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable("injected failure".to_string()));
    }
    Ok(())
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key row directly, bypassing provisioning rules.
    pub fn put_key(&self, key: ApiKey, key_hash: &str) {
        let mut state = self.state.lock().unwrap();
        state.hashes.insert(key.id, key_hash.to_string());
        state.keys.insert(key.id, key);
    }

    pub fn key_hash(&self, key_id: Uuid) -> Option<String> {
        self.state.lock().unwrap().hashes.get(&key_id).cloned()
    }

    pub fn key(&self, key_id: Uuid) -> Option<ApiKey> {
        self.state.lock().unwrap().keys.get(&key_id).cloned()
    }

    pub fn set_used_today(&self, key_id: Uuid, used_today: i32) {
        if let Some(key) = self.state.lock().unwrap().keys.get_mut(&key_id) {
            key.used_today = used_today;
        }
    }

    pub fn usage_records(&self) -> Vec<ApiUsage> {
        self.state.lock().unwrap().usage.clone()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn create_user(&self, username: &str, email: &str, plan: Plan) -> StoreResult<User> {
        let mut state = self.state.lock().unwrap();
        if state
            .users
            .values()
            .any(|u| u.username == username || u.email == email)
        {
            return Err(StoreError::DuplicateUser);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            plan,
            status: UserStatus::Active,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        check(&self.fail_lookups)?;
        Ok(self.state.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<User>, i64)> {
        check(&self.fail_lookups)?;
        let state = self.state.lock().unwrap();
        let search = filter.search.as_deref().map(str::to_lowercase);

        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| {
                search.as_deref().is_none_or(|s| {
                    u.username.to_lowercase().contains(s) || u.email.to_lowercase().contains(s)
                })
            })
            .filter(|u| filter.plan.is_none_or(|p| u.plan == p))
            .filter(|u| filter.status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = users.len() as i64;
        Ok((paginate(users, limit, offset), total))
    }

    async fn change_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        daily_quota: i32,
    ) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().unwrap();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.plan = plan;
        let user = user.clone();

        for key in state.keys.values_mut() {
            if key.user_id == user_id && key.status == KeyStatus::Active {
                key.daily_quota = daily_quota;
                key.updated_at = Utc::now();
            }
        }
        Ok(Some(user))
    }

    async fn block_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().unwrap();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.status = UserStatus::Blocked;
        let user = user.clone();

        for key in state.keys.values_mut() {
            if key.user_id == user_id && key.status == KeyStatus::Active {
                key.status = KeyStatus::Revoked;
                key.updated_at = Utc::now();
            }
        }
        Ok(Some(user))
    }

    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.users.get_mut(&user_id).map(|u| {
            u.status = UserStatus::Active;
            u.clone()
        }))
    }

    async fn delete_user(&self, user_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        let owned: Vec<Uuid> = state
            .keys
            .values()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.id)
            .collect();
        for id in owned {
            state.keys.remove(&id);
            state.hashes.remove(&id);
        }
        state.usage.retain(|u| u.user_id != user_id);
        Ok(true)
    }

    async fn insert_key(&self, key: NewApiKey) -> StoreResult<ApiKey> {
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&key.user_id) {
            return Err(StoreError::UnknownUser);
        }
        if state.keys.values().any(|k| k.user_id == key.user_id) {
            return Err(StoreError::DuplicateOwner);
        }

        let now = Utc::now();
        let record = ApiKey {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            name: key.name,
            key_prefix: key.key_prefix,
            status: KeyStatus::Active,
            daily_quota: key.daily_quota,
            used_today: 0,
            total_requests: 0,
            last_used_at: None,
            expires_at: key.expires_at,
            created_at: now,
            updated_at: now,
        };
        state.hashes.insert(record.id, key.key_hash);
        state.keys.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<Option<ApiKey>> {
        check(&self.fail_lookups)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .keys
            .get(&key_id)
            .filter(|k| k.user_id == user_id)
            .cloned())
    }

    async fn list_keys(&self, user_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        check(&self.fail_lookups)?;
        let state = self.state.lock().unwrap();
        let mut keys: Vec<ApiKey> = state
            .keys
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn rename_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<ApiKey>> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .keys
            .get_mut(&key_id)
            .filter(|k| k.user_id == user_id)
            .map(|k| {
                k.name = name.to_string();
                k.updated_at = Utc::now();
                k.clone()
            }))
    }

    async fn replace_key_hash(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        key_hash: &str,
        key_prefix: &str,
    ) -> StoreResult<Option<ApiKey>> {
        let mut state = self.state.lock().unwrap();
        let Some(key) = state.keys.get_mut(&key_id).filter(|k| k.user_id == user_id) else {
            return Ok(None);
        };
        key.key_prefix = key_prefix.to_string();
        key.status = KeyStatus::Active;
        key.updated_at = Utc::now();
        let key = key.clone();

        state.hashes.insert(key_id, key_hash.to_string());
        Ok(Some(key))
    }

    async fn revoke_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<Option<ApiKey>> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .keys
            .get_mut(&key_id)
            .filter(|k| k.user_id == user_id)
            .map(|k| {
                k.status = KeyStatus::Revoked;
                k.updated_at = Utc::now();
                k.clone()
            }))
    }

    async fn delete_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        let owned = state.keys.get(&key_id).is_some_and(|k| k.user_id == user_id);
        if owned {
            state.keys.remove(&key_id);
            state.hashes.remove(&key_id);
            state.usage.retain(|u| u.api_key_id != key_id);
        }
        Ok(owned)
    }

    async fn find_active_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        check(&self.fail_lookups)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .hashes
            .iter()
            .find(|(_, hash)| hash.as_str() == key_hash)
            .and_then(|(id, _)| state.keys.get(id))
            .filter(|k| k.status == KeyStatus::Active)
            .cloned())
    }

    async fn try_consume(&self, key_id: Uuid, now: DateTime<Utc>) -> StoreResult<ConsumeOutcome> {
        check(&self.fail_consume)?;
        let mut state = self.state.lock().unwrap();
        let Some(key) = state
            .keys
            .get_mut(&key_id)
            .filter(|k| k.status == KeyStatus::Active)
        else {
            return Ok(ConsumeOutcome::Inactive);
        };

        if key.used_today >= key.daily_quota {
            return Ok(ConsumeOutcome::Exhausted(key.clone()));
        }

        key.used_today += 1;
        key.total_requests += 1;
        key.last_used_at = Some(now);
        key.updated_at = now;
        Ok(ConsumeOutcome::Admitted(key.clone()))
    }

    async fn reset_daily_usage(&self) -> StoreResult<u64> {
        check(&self.fail_reset)?;
        let mut state = self.state.lock().unwrap();
        let mut touched = 0;
        for key in state.keys.values_mut() {
            if key.status == KeyStatus::Active {
                key.used_today = 0;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_usage(&self, usage: NewApiUsage) -> StoreResult<()> {
        check(&self.fail_usage)?;
        self.state.lock().unwrap().usage.push(ApiUsage {
            id: Uuid::new_v4(),
            api_key_id: usage.api_key_id,
            user_id: usage.user_id,
            endpoint: usage.endpoint,
            method: usage.method,
            status_code: usage.status_code,
            response_time_ms: usage.response_time_ms,
            ip_address: usage.ip_address,
            user_agent: usage.user_agent,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_usage(
        &self,
        filter: &UsageFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<ApiUsage>, i64)> {
        check(&self.fail_lookups)?;
        let state = self.state.lock().unwrap();
        let endpoint = filter.endpoint.as_deref().map(str::to_lowercase);

        // Insertion order is creation order; newest first
        let logs: Vec<ApiUsage> = state
            .usage
            .iter()
            .rev()
            .filter(|u| filter.user_id.is_none_or(|id| u.user_id == id))
            .filter(|u| {
                endpoint
                    .as_deref()
                    .is_none_or(|e| u.endpoint.to_lowercase().contains(e))
            })
            .filter(|u| filter.status_code.is_none_or(|c| u.status_code == c))
            .cloned()
            .collect();

        let total = logs.len() as i64;
        Ok((paginate(logs, limit, offset), total))
    }
}

fn paginate<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}
