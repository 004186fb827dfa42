use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthTokenEntry, NewResource, Resource, ResetTokenRecord};
use crate::repositories::ResourceStore;

/// リソース1件分の状態
#[derive(Debug)]
struct ResourceRecord {
    resource: Resource,
    reset_token: Option<ResetTokenRecord>,
    auth_tokens: HashMap<String, AuthTokenEntry>,
}

/// インメモリのリソースストア（開発・テスト用）
///
/// リソースごとに Mutex を持ち、同一リソースへの変更を直列化する。
/// 異なるリソースへのアクセスは互いにブロックしない。
#[derive(Clone, Default)]
pub struct MemoryResourceStore {
    records: Arc<RwLock<HashMap<Uuid, Arc<Mutex<ResourceRecord>>>>>,
}

fn poisoned() -> AppError {
    AppError::Internal(anyhow::anyhow!("resource store lock poisoned"))
}

fn lock(record: &Mutex<ResourceRecord>) -> Result<MutexGuard<'_, ResourceRecord>, AppError> {
    record.lock().map_err(|_| poisoned())
}

fn emails_match(stored: &str, candidate: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        stored.to_lowercase() == candidate.to_lowercase()
    } else {
        stored == candidate
    }
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// リソースを登録
    ///
    /// 同じ種別に同じメールアドレス（`case_insensitive` に従って比較）が
    /// 既に存在する場合はエラー。
    pub fn insert(&self, new: NewResource, case_insensitive: bool) -> Result<Resource, AppError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        for record in records.values() {
            let record = lock(record)?;
            if record.resource.resource_type == new.resource_type
                && emails_match(&record.resource.email, &new.email, case_insensitive)
            {
                return Err(AppError::Internal(anyhow::anyhow!("email already taken")));
            }
        }

        let now = OffsetDateTime::now_utc();
        let email = if case_insensitive {
            new.email.to_lowercase()
        } else {
            new.email
        };
        let resource = Resource {
            id: Uuid::new_v4(),
            resource_type: new.resource_type,
            email,
            password_hash: new.password_hash,
            confirmed_at: new.confirmed_at,
            allow_password_change: false,
            created_at: now,
            updated_at: now,
        };

        records.insert(
            resource.id,
            Arc::new(Mutex::new(ResourceRecord {
                resource: resource.clone(),
                reset_token: None,
                auth_tokens: HashMap::new(),
            })),
        );

        Ok(resource)
    }

    fn record(&self, id: Uuid) -> Result<Option<Arc<Mutex<ResourceRecord>>>, AppError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&id).cloned())
    }

    fn snapshot(&self) -> Result<Vec<Arc<Mutex<ResourceRecord>>>, AppError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }

    /// 対象リソースのロックを取って処理する（存在しない場合は何もしない）
    fn with_record<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ResourceRecord) -> T,
    ) -> Result<Option<T>, AppError> {
        let Some(record) = self.record(id)? else {
            return Ok(None);
        };
        let mut guard = lock(&record)?;
        Ok(Some(f(&mut guard)))
    }

    fn find_first(
        &self,
        predicate: impl Fn(&Resource) -> bool,
    ) -> Result<Option<Resource>, AppError> {
        for record in self.snapshot()? {
            let guard = lock(&record)?;
            if predicate(&guard.resource) {
                return Ok(Some(guard.resource.clone()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn find_by_email(
        &self,
        resource_type: &str,
        email: &str,
        case_insensitive: bool,
    ) -> Result<Option<Resource>, AppError> {
        self.find_first(|r| {
            r.resource_type == resource_type && emails_match(&r.email, email, case_insensitive)
        })
    }

    async fn find_by_uid(
        &self,
        resource_type: &str,
        uid: &str,
    ) -> Result<Option<Resource>, AppError> {
        self.find_first(|r| r.resource_type == resource_type && r.email == uid)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, AppError> {
        self.with_record(id, |record| record.resource.clone())
    }

    async fn set_reset_token(&self, id: Uuid, token: ResetTokenRecord) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.reset_token = Some(token);
        })?;
        Ok(())
    }

    async fn take_reset_token(
        &self,
        resource_type: &str,
        token_hash: &str,
    ) -> Result<Option<(Resource, ResetTokenRecord)>, AppError> {
        for record in self.snapshot()? {
            let mut guard = lock(&record)?;
            if guard.resource.resource_type != resource_type {
                continue;
            }
            let matches = guard
                .reset_token
                .as_ref()
                .is_some_and(|t| t.token_hash == token_hash);
            if matches {
                // 照合と削除を同じロック内で行う
                let taken = guard.reset_token.take();
                return Ok(taken.map(|t| (guard.resource.clone(), t)));
            }
        }
        Ok(None)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.resource.password_hash = Some(password_hash.to_string());
            record.resource.allow_password_change = false;
            record.resource.updated_at = OffsetDateTime::now_utc();
        })?;
        Ok(())
    }

    async fn set_allow_password_change(&self, id: Uuid, allow: bool) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.resource.allow_password_change = allow;
        })?;
        Ok(())
    }

    async fn take_allow_password_change(&self, id: Uuid) -> Result<bool, AppError> {
        let taken = self.with_record(id, |record| {
            std::mem::take(&mut record.resource.allow_password_change)
        })?;
        Ok(taken.unwrap_or(false))
    }

    async fn confirm(&self, id: Uuid, at: OffsetDateTime) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.resource.confirmed_at.get_or_insert(at);
        })?;
        Ok(())
    }

    async fn insert_auth_token(
        &self,
        id: Uuid,
        entry: AuthTokenEntry,
        max_entries: usize,
    ) -> Result<usize, AppError> {
        let evicted = self.with_record(id, |record| {
            record.auth_tokens.insert(entry.client_id.clone(), entry);

            let mut evicted = 0;
            while record.auth_tokens.len() > max_entries {
                let oldest = record
                    .auth_tokens
                    .values()
                    .min_by_key(|t| t.expiry)
                    .map(|t| t.client_id.clone());
                match oldest {
                    Some(client_id) => {
                        record.auth_tokens.remove(&client_id);
                        evicted += 1;
                    }
                    None => break,
                }
            }
            evicted
        })?;

        evicted.ok_or_else(|| AppError::Internal(anyhow::anyhow!("resource not found")))
    }

    async fn find_auth_token(
        &self,
        id: Uuid,
        client_id: &str,
    ) -> Result<Option<AuthTokenEntry>, AppError> {
        Ok(self
            .with_record(id, |record| record.auth_tokens.get(client_id).cloned())?
            .flatten())
    }

    async fn list_auth_tokens(&self, id: Uuid) -> Result<Vec<AuthTokenEntry>, AppError> {
        Ok(self
            .with_record(id, |record| {
                record.auth_tokens.values().cloned().collect::<Vec<_>>()
            })?
            .unwrap_or_default())
    }

    async fn touch_auth_token(
        &self,
        id: Uuid,
        client_id: &str,
        at: OffsetDateTime,
    ) -> Result<(), AppError> {
        self.with_record(id, |record| {
            if let Some(entry) = record.auth_tokens.get_mut(client_id) {
                entry.last_used_at = Some(at);
            }
        })?;
        Ok(())
    }

    async fn remove_auth_token(&self, id: Uuid, client_id: &str) -> Result<bool, AppError> {
        Ok(self
            .with_record(id, |record| record.auth_tokens.remove(client_id).is_some())?
            .unwrap_or(false))
    }

    async fn remove_expired_auth_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let mut removed = 0u64;
        for record in self.snapshot()? {
            let mut guard = lock(&record)?;
            let before = guard.auth_tokens.len();
            guard.auth_tokens.retain(|_, t| !t.is_expired_at(now));
            removed += (before - guard.auth_tokens.len()) as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewResource {
        NewResource {
            resource_type: "user".to_string(),
            email: email.to_string(),
            password_hash: None,
            confirmed_at: None,
        }
    }

    fn entry(client_id: &str, expiry: OffsetDateTime) -> AuthTokenEntry {
        AuthTokenEntry {
            client_id: client_id.to_string(),
            token_hash: format!("hash-{client_id}"),
            expiry,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_find_by_email_case_sensitivity() {
        let store = MemoryResourceStore::new();
        store.insert(new_user("User@Example.com"), false).unwrap();

        assert!(
            store
                .find_by_email("user", "user@example.com", true)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_by_email("user", "user@example.com", false)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_by_email("mang", "User@Example.com", false)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_email() {
        let store = MemoryResourceStore::new();
        store.insert(new_user("user@example.com"), true).unwrap();
        assert!(store.insert(new_user("USER@example.com"), true).is_err());
    }

    #[tokio::test]
    async fn test_take_reset_token_is_single_use() {
        let store = MemoryResourceStore::new();
        let user = store.insert(new_user("user@example.com"), true).unwrap();
        let record = ResetTokenRecord {
            token_hash: "abc".to_string(),
            sent_at: OffsetDateTime::now_utc(),
            config_name: "default".to_string(),
            redirect_url: "https://app.example".to_string(),
        };
        store.set_reset_token(user.id, record.clone()).await.unwrap();

        let (resource, taken) = store.take_reset_token("user", "abc").await.unwrap().unwrap();
        assert_eq!(resource.id, user.id);
        assert_eq!(taken, record);
        assert!(store.take_reset_token("user", "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_allow_password_change_reports_once() {
        let store = MemoryResourceStore::new();
        let user = store.insert(new_user("user@example.com"), true).unwrap();
        assert!(!store.take_allow_password_change(user.id).await.unwrap());

        store.set_allow_password_change(user.id, true).await.unwrap();
        assert!(store.take_allow_password_change(user.id).await.unwrap());
        assert!(!store.take_allow_password_change(user.id).await.unwrap());

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(!reloaded.allow_password_change);
    }

    #[tokio::test]
    async fn test_insert_auth_token_evicts_earliest_expiry() {
        let store = MemoryResourceStore::new();
        let user = store.insert(new_user("user@example.com"), true).unwrap();
        let now = OffsetDateTime::now_utc();

        for (i, client) in ["a", "b", "c"].iter().enumerate() {
            let expiry = now + time::Duration::hours(i as i64 + 1);
            store
                .insert_auth_token(user.id, entry(client, expiry), 2)
                .await
                .unwrap();
        }

        let mut clients: Vec<_> = store
            .list_auth_tokens(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.client_id)
            .collect();
        clients.sort();
        assert_eq!(clients, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_expired_auth_tokens() {
        let store = MemoryResourceStore::new();
        let user = store.insert(new_user("user@example.com"), true).unwrap();
        let now = OffsetDateTime::now_utc();

        store
            .insert_auth_token(user.id, entry("old", now - time::Duration::minutes(1)), 10)
            .await
            .unwrap();
        store
            .insert_auth_token(user.id, entry("new", now + time::Duration::hours(1)), 10)
            .await
            .unwrap();

        assert_eq!(store.remove_expired_auth_tokens(now).await.unwrap(), 1);
        assert!(store.find_auth_token(user.id, "old").await.unwrap().is_none());
        assert!(store.find_auth_token(user.id, "new").await.unwrap().is_some());
    }
}
