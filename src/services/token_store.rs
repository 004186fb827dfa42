use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use time::{Duration, OffsetDateTime};

use crate::error::AppError;
use crate::models::{AuthTokenEntry, Resource};
use crate::repositories::ResourceStore;
use crate::services::token_codec;

/// 発行された認証トークン（平文は呼び出し元に一度だけ渡す）
#[derive(Debug)]
pub struct IssuedToken {
    pub client_id: String,
    pub token: SecretString,
    pub expiry: OffsetDateTime,
}

/// 認証トークンの検証結果
///
/// Expired / Mismatch はどちらもアクセス拒否。区別はログ用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidation {
    Valid,
    Expired,
    Mismatch,
}

/// リソースごとの認証トークン管理
///
/// 有効期限は発行時に固定し、検証成功時も延長しない（last_used_at のみ更新）。
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn ResourceStore>,
    lifespan: Duration,
    max_devices: usize,
}

impl TokenStore {
    pub fn new(store: Arc<dyn ResourceStore>, lifespan: Duration, max_devices: usize) -> Self {
        Self {
            store,
            lifespan,
            max_devices: max_devices.max(1),
        }
    }

    /// 新しいクライアントIDとトークンを発行
    pub async fn issue(&self, resource: &Resource) -> Result<IssuedToken, AppError> {
        let client_id = token_codec::generate_client_id();
        let token = token_codec::generate_token();
        let now = OffsetDateTime::now_utc();
        let expiry = now + self.lifespan;

        let entry = AuthTokenEntry {
            client_id: client_id.clone(),
            token_hash: token_codec::hash_token(token.expose_secret()),
            expiry,
            last_used_at: None,
            created_at: now,
        };

        let evicted = self
            .store
            .insert_auth_token(resource.id, entry, self.max_devices)
            .await?;

        if evicted > 0 {
            tracing::info!(
                resource_id = %resource.id,
                evicted,
                "端末数の上限により古いトークンを削除"
            );
        }

        tracing::info!(resource_id = %resource.id, client_id = %client_id, "認証トークン発行");

        Ok(IssuedToken {
            client_id,
            token,
            expiry,
        })
    }

    /// クライアントIDとトークンの組を検証
    pub async fn validate(
        &self,
        resource: &Resource,
        client_id: &str,
        token: &str,
    ) -> Result<TokenValidation, AppError> {
        let Some(entry) = self.store.find_auth_token(resource.id, client_id).await? else {
            tracing::warn!(resource_id = %resource.id, client_id = %client_id, "未知のクライアントID");
            return Ok(TokenValidation::Mismatch);
        };

        if !token_codec::verify_token(token, &entry.token_hash) {
            tracing::warn!(resource_id = %resource.id, client_id = %client_id, "トークン不一致");
            return Ok(TokenValidation::Mismatch);
        }

        let now = OffsetDateTime::now_utc();
        if entry.is_expired_at(now) {
            tracing::warn!(resource_id = %resource.id, client_id = %client_id, "期限切れトークン");
            return Ok(TokenValidation::Expired);
        }

        self.store
            .touch_auth_token(resource.id, client_id, now)
            .await?;

        Ok(TokenValidation::Valid)
    }

    /// クライアントのトークンを失効させる
    pub async fn revoke(&self, resource: &Resource, client_id: &str) -> Result<bool, AppError> {
        let removed = self.store.remove_auth_token(resource.id, client_id).await?;
        if removed {
            tracing::info!(resource_id = %resource.id, client_id = %client_id, "認証トークン失効");
        }
        Ok(removed)
    }

    /// 期限切れトークンを削除
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let removed = self
            .store
            .remove_expired_auth_tokens(OffsetDateTime::now_utc())
            .await?;
        if removed > 0 {
            tracing::info!(removed, "期限切れ認証トークンを削除");
        }
        Ok(removed)
    }
}
