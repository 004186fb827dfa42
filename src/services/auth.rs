use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;

use crate::config::ResourceType;
use crate::error::AppError;
use crate::models::{ConfirmationState, Resource};
use crate::repositories::ResourceStore;
use crate::services::token_store::{IssuedToken, TokenStore, TokenValidation};
use crate::services::{identity, password};

pub const ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("access-token");
pub const CLIENT_HEADER: HeaderName = HeaderName::from_static("client");
pub const UID_HEADER: HeaderName = HeaderName::from_static("uid");
pub const EXPIRY_HEADER: HeaderName = HeaderName::from_static("expiry");
pub const TOKEN_TYPE_HEADER: HeaderName = HeaderName::from_static("token-type");

/// リクエストヘッダーから取り出した認証情報
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub access_token: String,
    pub client: String,
    pub uid: String,
}

impl AuthHeaders {
    /// 3つのヘッダーが揃っていない場合は None
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            access_token: get(&ACCESS_TOKEN_HEADER)?,
            client: get(&CLIENT_HEADER)?,
            uid: get(&UID_HEADER)?,
        })
    }
}

/// 発行したトークンをレスポンスヘッダーに設定
pub fn write_auth_headers(
    headers: &mut HeaderMap,
    resource: &Resource,
    issued: &IssuedToken,
) -> Result<(), AppError> {
    let value = |v: &str| {
        HeaderValue::from_str(v).map_err(|e| {
            tracing::error!(error = ?e, "認証ヘッダーの生成エラー");
            AppError::Internal(anyhow::anyhow!("invalid header value"))
        })
    };

    headers.insert(ACCESS_TOKEN_HEADER, value(issued.token.expose_secret())?);
    headers.insert(CLIENT_HEADER, value(&issued.client_id)?);
    headers.insert(UID_HEADER, value(resource.uid())?);
    headers.insert(
        EXPIRY_HEADER,
        value(&issued.expiry.unix_timestamp().to_string())?,
    );
    headers.insert(TOKEN_TYPE_HEADER, HeaderValue::from_static("Bearer"));
    Ok(())
}

/// 認証サービス（サインイン・トークン検証・サインアウト）
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn ResourceStore>,
    tokens: TokenStore,
}

impl AuthService {
    pub fn new(store: Arc<dyn ResourceStore>, tokens: TokenStore) -> Self {
        Self { store, tokens }
    }

    /// メールアドレスとパスワードでサインインし、新しいトークンを発行
    ///
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行
    pub async fn sign_in(
        &self,
        resource_type: &ResourceType,
        email: &str,
        password: &str,
    ) -> Result<(Resource, IssuedToken), AppError> {
        let resource = identity::find_by_email(self.store.as_ref(), resource_type, email).await?;

        let verified = password::verify_optional(
            password,
            resource.as_ref().and_then(|r| r.password_hash.as_deref()),
        )?;

        let resource = match resource {
            Some(resource) if verified => resource,
            Some(_) => {
                tracing::warn!(email = %email, "認証失敗: パスワード不一致");
                return Err(AppError::InvalidCredentials);
            }
            None => {
                tracing::warn!(email = %email, "認証失敗: ユーザー不在");
                return Err(AppError::InvalidCredentials);
            }
        };

        if resource.confirmation_state(resource_type.confirmable) == ConfirmationState::Unconfirmed
        {
            tracing::warn!(resource_id = %resource.id, "認証失敗: 未確認アカウント");
            return Err(AppError::NotConfirmed(resource.email));
        }

        let issued = self.tokens.issue(&resource).await?;
        tracing::info!(resource_id = %resource.id, "サインイン成功");

        Ok((resource, issued))
    }

    /// 認証ヘッダーを検証し、呼び出し元のリソースとクライアントIDを返す
    pub async fn authenticate(
        &self,
        resource_type: &ResourceType,
        headers: &HeaderMap,
    ) -> Result<(Resource, String), AppError> {
        let Some(auth) = AuthHeaders::from_headers(headers) else {
            tracing::debug!("認証ヘッダーなし");
            return Err(AppError::Unauthenticated);
        };

        let resource = self
            .store
            .find_by_uid(&resource_type.name, &auth.uid)
            .await?
            .ok_or_else(|| {
                tracing::warn!(uid = %auth.uid, "認証失敗: uid に対応するリソースなし");
                AppError::Unauthenticated
            })?;

        match self
            .tokens
            .validate(&resource, &auth.client, &auth.access_token)
            .await?
        {
            TokenValidation::Valid => Ok((resource, auth.client)),
            TokenValidation::Expired | TokenValidation::Mismatch => Err(AppError::Unauthenticated),
        }
    }

    /// 現在のクライアントのトークンを失効させる
    pub async fn sign_out(
        &self,
        resource_type: &ResourceType,
        headers: &HeaderMap,
    ) -> Result<Resource, AppError> {
        let (resource, client_id) = match self.authenticate(resource_type, headers).await {
            Ok(found) => found,
            Err(AppError::Unauthenticated) => return Err(AppError::SessionNotFound),
            Err(e) => return Err(e),
        };

        if !self.tokens.revoke(&resource, &client_id).await? {
            return Err(AppError::SessionNotFound);
        }

        tracing::info!(resource_id = %resource.id, client_id = %client_id, "サインアウト");
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewResource;
    use crate::repositories::MemoryResourceStore;
    use time::{Duration, OffsetDateTime};

    fn setup(confirmed: bool) -> (AuthService, ResourceType) {
        let store = MemoryResourceStore::new();
        store
            .insert(
                NewResource {
                    resource_type: "user".to_string(),
                    email: "user@example.com".to_string(),
                    password_hash: Some(password::hash_password("secret123").unwrap()),
                    confirmed_at: confirmed.then(OffsetDateTime::now_utc),
                },
                true,
            )
            .unwrap();
        let store: Arc<dyn ResourceStore> = Arc::new(store);
        let tokens = TokenStore::new(store.clone(), Duration::weeks(2), 10);
        (AuthService::new(store, tokens), ResourceType::new("user", "auth"))
    }

    fn headers_for(resource: &Resource, issued: &IssuedToken) -> HeaderMap {
        let mut headers = HeaderMap::new();
        write_auth_headers(&mut headers, resource, issued).unwrap();
        headers
    }

    #[test]
    fn test_auth_headers_require_all_three() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("t"));
        headers.insert(CLIENT_HEADER, HeaderValue::from_static("c"));
        assert!(AuthHeaders::from_headers(&headers).is_none());

        headers.insert(UID_HEADER, HeaderValue::from_static("user@example.com"));
        let auth = AuthHeaders::from_headers(&headers).unwrap();
        assert_eq!(auth.uid, "user@example.com");
    }

    #[tokio::test]
    async fn test_sign_in_then_authenticate() {
        let (service, user_type) = setup(true);
        let (resource, issued) = service
            .sign_in(&user_type, "USER@example.com", "secret123")
            .await
            .unwrap();

        let headers = headers_for(&resource, &issued);
        assert_eq!(headers[&TOKEN_TYPE_HEADER], "Bearer");

        let (authenticated, client_id) = service.authenticate(&user_type, &headers).await.unwrap();
        assert_eq!(authenticated.id, resource.id);
        assert_eq!(client_id, issued.client_id);
    }

    #[tokio::test]
    async fn test_sign_in_failures() {
        let (service, user_type) = setup(true);
        assert!(matches!(
            service.sign_in(&user_type, "user@example.com", "wrong").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            service.sign_in(&user_type, "nobody@example.com", "secret123").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_requires_confirmation() {
        let (service, user_type) = setup(false);
        assert!(matches!(
            service.sign_in(&user_type, "user@example.com", "secret123").await,
            Err(AppError::NotConfirmed(email)) if email == "user@example.com"
        ));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_token() {
        let (service, user_type) = setup(true);
        let (resource, issued) = service
            .sign_in(&user_type, "user@example.com", "secret123")
            .await
            .unwrap();

        let mut headers = headers_for(&resource, &issued);
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("forged"));
        assert!(matches!(
            service.authenticate(&user_type, &headers).await,
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            service.authenticate(&user_type, &HeaderMap::new()).await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_only_current_client() {
        let (service, user_type) = setup(true);
        let (resource, first) = service
            .sign_in(&user_type, "user@example.com", "secret123")
            .await
            .unwrap();
        let (_, second) = service
            .sign_in(&user_type, "user@example.com", "secret123")
            .await
            .unwrap();

        let first_headers = headers_for(&resource, &first);
        service.sign_out(&user_type, &first_headers).await.unwrap();

        assert!(matches!(
            service.sign_out(&user_type, &first_headers).await,
            Err(AppError::SessionNotFound)
        ));
        assert!(
            service
                .authenticate(&user_type, &headers_for(&resource, &second))
                .await
                .is_ok()
        );
    }
}
