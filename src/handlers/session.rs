use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Localize, LocalizedError};
use crate::handlers::payload::Payload;
use crate::locale::Locale;
use crate::models::Resource;
use crate::services::auth::write_auth_headers;
use crate::state::AppState;

/// サインインリクエスト
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub success: bool,
    pub data: Resource,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// POST /{scope}/sign_in
///
/// 成功時はレスポンスヘッダーに access-token / client / uid / expiry を設定する。
///
/// # Security
/// - password はログに出力しない
pub async fn sign_in(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
    payload: Payload<SignInRequest>,
) -> Result<impl IntoResponse, LocalizedError> {
    let locale = Locale::negotiate(&headers, state.settings.default_locale);
    let resource_type = state.resource_type(&scope).localize(locale)?;
    let request = payload.or_default();

    validate_sign_in_request(&request).localize(locale)?;

    let (resource, issued) = state
        .auth_service()
        .sign_in(resource_type, &request.email, &request.password)
        .await
        .localize(locale)?;

    let mut response_headers = HeaderMap::new();
    write_auth_headers(&mut response_headers, &resource, &issued).localize(locale)?;

    Ok((
        response_headers,
        Json(ResourceResponse {
            success: true,
            data: resource,
        }),
    ))
}

/// DELETE /{scope}/sign_out
pub async fn sign_out(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, LocalizedError> {
    let locale = Locale::negotiate(&headers, state.settings.default_locale);
    let resource_type = state.resource_type(&scope).localize(locale)?;

    state
        .auth_service()
        .sign_out(resource_type, &headers)
        .await
        .localize(locale)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /{scope}/validate_token
pub async fn validate_token(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ResourceResponse>, LocalizedError> {
    let locale = Locale::negotiate(&headers, state.settings.default_locale);
    let resource_type = state.resource_type(&scope).localize(locale)?;

    let (resource, _client_id) = state
        .auth_service()
        .authenticate(resource_type, &headers)
        .await
        .localize(locale)?;

    Ok(Json(ResourceResponse {
        success: true,
        data: resource,
    }))
}

/// サインインリクエストのバリデーション
fn validate_sign_in_request(request: &SignInRequest) -> Result<(), AppError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::InvalidCredentials);
    }
    Ok(())
}
