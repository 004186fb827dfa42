use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::{Localize, LocalizedError};
use crate::handlers::payload::Payload;
use crate::locale::{Locale, Message};
use crate::models::Resource;
use crate::services::{RedeemRequest, ResetRequest, UpdatePassword};
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Default, Deserialize)]
pub struct CreateResetRequest {
    pub email: Option<String>,
    pub redirect_url: Option<String>,
    pub config_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// POST /{scope}/password
///
/// リセット用リンクをメールで送信する。
pub async fn create(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
    payload: Payload<CreateResetRequest>,
) -> Result<Json<MessageResponse>, LocalizedError> {
    let locale = Locale::negotiate(&headers, state.settings.default_locale);
    let resource_type = state.resource_type(&scope).localize(locale)?;
    // ボディが読めない場合は空として扱い、必須パラメータ不足を返す
    let request = payload.or_default();

    let email = state
        .password_reset_service()
        .request_reset(
            resource_type,
            &ResetRequest {
                email: request.email,
                redirect_url: request.redirect_url,
                config_name: request.config_name,
            },
            locale,
        )
        .await
        .localize(locale)?;

    Ok(Json(MessageResponse {
        success: true,
        message: Message::Sended { email }.render(locale),
    }))
}

// === リセットトークン検証 ===

#[derive(Debug, Default, Deserialize)]
pub struct EditParams {
    pub reset_password_token: Option<String>,
    pub redirect_url: Option<String>,
    /// メールのリンクに含まれる設定名（保存済みの値を優先するため参照のみ）
    pub config: Option<String>,
}

/// GET /{scope}/password/edit
///
/// メール内リンクの遷移先。成功時は認証情報付きでリダイレクトする。
///
/// # Security
/// - reset_password_token はログに出力しない
pub async fn edit(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
    Query(params): Query<EditParams>,
) -> Result<impl IntoResponse, LocalizedError> {
    let locale = Locale::negotiate(&headers, state.settings.default_locale);
    let resource_type = state.resource_type(&scope).localize(locale)?;

    if let Some(config) = params.config.as_deref() {
        tracing::debug!(config = %config, "リセットリンクの設定名");
    }

    let redemption = state
        .password_reset_service()
        .redeem(
            resource_type,
            &RedeemRequest {
                reset_password_token: params.reset_password_token,
                redirect_url: params.redirect_url,
            },
        )
        .await
        .localize(locale)?;

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, redemption.location)],
    ))
}

// === パスワード変更 ===

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub current_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePasswordData {
    pub user: Resource,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatePasswordResponse {
    pub success: bool,
    pub data: UpdatePasswordData,
}

/// PUT /{scope}/password
///
/// 認証ヘッダーが必要。ボディの形式に関わらず未認証なら 401。
///
/// # Security
/// - password, current_password はログに出力しない
pub async fn update(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
    payload: Payload<UpdatePasswordRequest>,
) -> Result<Json<UpdatePasswordResponse>, LocalizedError> {
    let locale = Locale::negotiate(&headers, state.settings.default_locale);
    let resource_type = state.resource_type(&scope).localize(locale)?;

    let (resource, _client_id) = state
        .auth_service()
        .authenticate(resource_type, &headers)
        .await
        .localize(locale)?;

    // ボディの内容は認証後にのみ参照する
    let request = payload.or_default();
    let user = state
        .credential_update_service()
        .update_password(
            &resource,
            &UpdatePassword {
                password: request.password,
                password_confirmation: request.password_confirmation,
                current_password: request.current_password,
            },
        )
        .await
        .localize(locale)?;

    Ok(Json(UpdatePasswordResponse {
        success: true,
        data: UpdatePasswordData {
            user,
            message: Message::SuccessfullyUpdated.render(locale),
        },
    }))
}
