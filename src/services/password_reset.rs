use std::sync::Arc;

use secrecy::ExposeSecret;
use time::OffsetDateTime;
use url::Url;

use crate::config::{AuthSettings, DEFAULT_CONFIG_NAME, ResourceType};
use crate::error::{AppError, MissingParameter};
use crate::locale::Locale;
use crate::models::{ConfirmationState, ResetArtifact, ResetTokenRecord, Resource};
use crate::repositories::ResourceStore;
use crate::services::email::{ResetMailer, reset_password_instructions};
use crate::services::redirect::RedirectPolicy;
use crate::services::token_store::{IssuedToken, TokenStore};
use crate::services::{identity, token_codec};

/// リセット要求の入力
#[derive(Debug, Default, Clone)]
pub struct ResetRequest {
    pub email: Option<String>,
    pub redirect_url: Option<String>,
    pub config_name: Option<String>,
}

/// リセットトークン検証の入力
#[derive(Debug, Default, Clone)]
pub struct RedeemRequest {
    pub reset_password_token: Option<String>,
    pub redirect_url: Option<String>,
}

/// 検証成功時の結果
#[derive(Debug)]
pub struct Redemption {
    pub resource: Resource,
    pub issued: IssuedToken,
    /// 認証情報をクエリに付与したリダイレクト先
    pub location: String,
}

/// パスワードリセットサービス
///
/// 状態遷移: Idle → Requested → Sent → Redeemed(Valid | Invalid) → Idle
#[derive(Clone)]
pub struct PasswordResetService {
    store: Arc<dyn ResourceStore>,
    tokens: TokenStore,
    mailer: Arc<dyn ResetMailer>,
    settings: Arc<AuthSettings>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        tokens: TokenStore,
        mailer: Arc<dyn ResetMailer>,
        settings: Arc<AuthSettings>,
    ) -> Self {
        Self {
            store,
            tokens,
            mailer,
            settings,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// 必須パラメータとリダイレクト先の検査はユーザー検索より前に行う。
    /// 成功時は送信先メールアドレスを返す。
    ///
    /// # Security
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(
        &self,
        resource_type: &ResourceType,
        request: &ResetRequest,
        locale: Locale,
    ) -> Result<String, AppError> {
        let email = present(request.email.as_deref())
            .ok_or(AppError::MissingParameter(MissingParameter::Email))?;

        let redirect_url =
            RedirectPolicy::from_settings(&self.settings).resolve(request.redirect_url.as_deref())?;

        let config_name = present(request.config_name.as_deref())
            .unwrap_or(DEFAULT_CONFIG_NAME)
            .to_string();

        tracing::info!(email = %email, resource_type = %resource_type.name, "パスワードリセットリクエスト");

        let resource = identity::find_by_email(self.store.as_ref(), resource_type, email)
            .await?
            .ok_or_else(|| {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在");
                AppError::UserNotFound(email.to_string())
            })?;

        // 未確認アカウントにも送信する（存在と確認状態は独立に扱う）
        if resource.confirmation_state(resource_type.confirmable) == ConfirmationState::Unconfirmed
        {
            tracing::info!(resource_id = %resource.id, "未確認アカウントへのリセットメール送信");
        }

        let token = token_codec::generate_token();

        // 既存のリセットトークンは置き換わる
        self.store
            .set_reset_token(
                resource.id,
                ResetTokenRecord {
                    token_hash: token_codec::hash_token(token.expose_secret()),
                    sent_at: OffsetDateTime::now_utc(),
                    config_name: config_name.clone(),
                    redirect_url: redirect_url.clone(),
                },
            )
            .await?;

        let artifact = ResetArtifact {
            to: resource.email.clone(),
            config_name,
            redirect_url,
            reset_password_token: token,
        };

        let message = reset_password_instructions(
            &artifact,
            &self.settings.password_reset_edit_url,
            locale,
        );
        self.mailer.deliver(message).await?;

        tracing::info!(resource_id = %resource.id, "パスワードリセットメール送信完了");

        Ok(resource.email)
    }

    /// リセットトークンを検証し、新しい認証トークンを発行
    ///
    /// トークンは照合できた時点で削除され、以降の検証が失敗しても再利用できない。
    pub async fn redeem(
        &self,
        resource_type: &ResourceType,
        request: &RedeemRequest,
    ) -> Result<Redemption, AppError> {
        let raw_token = present(request.reset_password_token.as_deref())
            .ok_or(AppError::ResetTokenInvalid)?;

        let token_hash = token_codec::hash_token(raw_token);
        let (resource, record) = self
            .store
            .take_reset_token(&resource_type.name, &token_hash)
            .await?
            .ok_or_else(|| {
                tracing::warn!("一致するリセットトークンなし");
                AppError::ResetTokenInvalid
            })?;

        let now = OffsetDateTime::now_utc();
        if record.is_expired_at(now, self.settings.reset_password_within) {
            tracing::warn!(resource_id = %resource.id, "期限切れリセットトークン");
            return Err(AppError::ResetTokenInvalid);
        }

        // リダイレクト先の検査はアカウントへの変更より前に行う
        let redirect_url = match present(request.redirect_url.as_deref()) {
            Some(url) => {
                RedirectPolicy::from_settings(&self.settings).validate(url)?;
                url
            }
            None => record.redirect_url.as_str(),
        };
        let redirect_url = Url::parse(redirect_url)
            .map_err(|_| AppError::RedirectRejected(redirect_url.to_string()))?;

        if resource.confirmation_state(resource_type.confirmable) == ConfirmationState::Unconfirmed
        {
            if !self.settings.confirm_on_password_reset {
                tracing::warn!(resource_id = %resource.id, "未確認アカウントのリセットを拒否");
                return Err(AppError::ResetTokenInvalid);
            }
            // メールのリンクを開けたことで所有が確認できたものとみなす
            self.store.confirm(resource.id, now).await?;
            tracing::info!(resource_id = %resource.id, "リセットによりアカウントを確認済みに変更");
        }

        self.store
            .set_allow_password_change(resource.id, true)
            .await?;

        let issued = self.tokens.issue(&resource).await?;
        let location =
            build_redirect_location(redirect_url, &record.config_name, &resource, &issued);

        tracing::info!(resource_id = %resource.id, client_id = %issued.client_id, "リセットトークン検証完了");

        Ok(Redemption {
            resource,
            issued,
            location,
        })
    }
}

/// リダイレクト先に認証情報をクエリとして付与
fn build_redirect_location(
    mut url: Url,
    config_name: &str,
    resource: &Resource,
    issued: &IssuedToken,
) -> String {
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &issued.client_id);
        if config_name != DEFAULT_CONFIG_NAME {
            query.append_pair("config", config_name);
        }
        query
            .append_pair("expiry", &issued.expiry.unix_timestamp().to_string())
            .append_pair("reset_password", "true")
            .append_pair("token", issued.token.expose_secret())
            .append_pair("uid", resource.uid());
    }

    url.to_string()
}
