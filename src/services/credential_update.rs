use std::sync::Arc;

use crate::config::AuthSettings;
use crate::error::{AppError, ValidationFailure};
use crate::models::Resource;
use crate::repositories::ResourceStore;
use crate::services::password;

/// パスワード変更の入力
#[derive(Debug, Default, Clone)]
pub struct UpdatePassword {
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub current_password: Option<String>,
}

/// 認証済みリソースのパスワード変更
///
/// 他端末の認証トークンは変更後も有効なまま残る。
#[derive(Clone)]
pub struct CredentialUpdateService {
    store: Arc<dyn ResourceStore>,
    settings: Arc<AuthSettings>,
}

impl CredentialUpdateService {
    pub fn new(store: Arc<dyn ResourceStore>, settings: Arc<AuthSettings>) -> Self {
        Self { store, settings }
    }

    /// パスワードを更新し、更新後のリソースを返す
    ///
    /// # Security
    /// - password, current_password はログに出力しない
    pub async fn update_password(
        &self,
        resource: &Resource,
        input: &UpdatePassword,
    ) -> Result<Resource, AppError> {
        let (Some(password), Some(confirmation)) = (
            input.password.as_deref().filter(|p| !p.is_empty()),
            input.password_confirmation.as_deref().filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::Validation(vec![ValidationFailure::MissingPasswords]));
        };

        let mut failures = Vec::new();

        if password != confirmation {
            failures.push(ValidationFailure::PasswordConfirmationMismatch);
        }

        if password.chars().count() < self.settings.min_password_length {
            failures.push(ValidationFailure::PasswordTooShort {
                minimum: self.settings.min_password_length,
            });
        }

        if self.settings.check_current_password_before_update
            && !self.current_password_accepted(resource, input, failures.is_empty()).await?
        {
            failures.insert(0, ValidationFailure::CurrentPasswordInvalid);
        }

        if !failures.is_empty() {
            tracing::info!(resource_id = %resource.id, ?failures, "パスワード変更のバリデーションエラー");
            return Err(AppError::Validation(failures));
        }

        let password_hash = password::hash_password(password)?;
        self.store.update_password(resource.id, &password_hash).await?;

        tracing::info!(resource_id = %resource.id, "パスワード変更完了");

        self.store
            .find_by_id(resource.id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("resource vanished after update")))
    }

    /// 現在のパスワード、またはリセット直後の変更許可で確認を通す
    ///
    /// 変更許可は他の検査がすべて通る場合にのみ消費する。消費はストア上で
    /// 原子的に行うため、同時に届いた変更のうち許可を使えるのは一つだけ。
    async fn current_password_accepted(
        &self,
        resource: &Resource,
        input: &UpdatePassword,
        consume_window: bool,
    ) -> Result<bool, AppError> {
        if let Some(current) = input.current_password.as_deref().filter(|p| !p.is_empty()) {
            if password::verify_optional(current, resource.password_hash.as_deref())? {
                return Ok(true);
            }
        }

        if !consume_window {
            return Ok(resource.allow_password_change);
        }

        let taken = self.store.take_allow_password_change(resource.id).await?;
        if taken {
            tracing::info!(resource_id = %resource.id, "リセット直後のため現在のパスワード確認を省略");
        }
        Ok(taken)
    }
}
