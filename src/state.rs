use std::sync::Arc;

use crate::config::{AuthSettings, ResourceType};
use crate::error::AppError;
use crate::repositories::ResourceStore;
use crate::services::{
    AuthService, CredentialUpdateService, PasswordResetService, ResetMailer, TokenStore,
};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// リソースの永続化層（PostgreSQL またはインメモリ）
    pub store: Arc<dyn ResourceStore>,
    pub tokens: TokenStore,
    /// リセットメールの送信先
    pub mailer: Arc<dyn ResetMailer>,
    /// 認証設定（Arc で共有）
    pub settings: Arc<AuthSettings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        mailer: Arc<dyn ResetMailer>,
        settings: AuthSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let tokens = TokenStore::new(
            store.clone(),
            settings.token_lifespan,
            settings.max_number_of_devices,
        );

        Self {
            store,
            tokens,
            mailer,
            settings,
        }
    }

    /// ルーティングのスコープからリソース種別を解決
    pub fn resource_type(&self, scope: &str) -> Result<&ResourceType, AppError> {
        self.settings.resource_type(scope).ok_or_else(|| {
            tracing::debug!(scope = %scope, "未知のスコープ");
            AppError::UnknownResourceType(scope.to_string())
        })
    }

    pub fn password_reset_service(&self) -> PasswordResetService {
        PasswordResetService::new(
            self.store.clone(),
            self.tokens.clone(),
            self.mailer.clone(),
            self.settings.clone(),
        )
    }

    pub fn credential_update_service(&self) -> CredentialUpdateService {
        CredentialUpdateService::new(self.store.clone(), self.settings.clone())
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.tokens.clone())
    }
}
