use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::locale::{Locale, Message};

/// 必須パラメータの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingParameter {
    Email,
    RedirectUrl,
}

/// パスワード変更時の入力エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    MissingPasswords,
    CurrentPasswordInvalid,
    PasswordConfirmationMismatch,
    PasswordTooShort { minimum: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("必須パラメータ不足: {0:?}")]
    MissingParameter(MissingParameter),

    #[error("ユーザーが見つかりません")]
    UserNotFound(String),

    #[error("無効または期限切れのリセットトークン")]
    ResetTokenInvalid,

    #[error("許可されていないリダイレクトURL: {0}")]
    RedirectRejected(String),

    #[error("未認証")]
    Unauthenticated,

    #[error("メールアドレスまたはパスワードが正しくありません")]
    InvalidCredentials,

    #[error("未確認のアカウント")]
    NotConfirmed(String),

    #[error("セッションが見つかりません")]
    SessionNotFound,

    #[error("バリデーションエラー: {0:?}")]
    Validation(Vec<ValidationFailure>),

    #[error("未知のリソース種別: {0}")]
    UnknownResourceType(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    errors: Vec<String>,
}

impl AppError {
    /// ステータスコードとクライアント向けメッセージ
    ///
    /// 内部エラーの詳細はログにのみ出力する。
    fn status_and_messages(&self) -> (StatusCode, Vec<Message>) {
        match self {
            Self::MissingParameter(MissingParameter::Email) => {
                (StatusCode::UNAUTHORIZED, vec![Message::MissingEmail])
            }
            Self::MissingParameter(MissingParameter::RedirectUrl) => {
                (StatusCode::UNAUTHORIZED, vec![Message::MissingRedirectUrl])
            }
            Self::UserNotFound(email) => (
                StatusCode::NOT_FOUND,
                vec![Message::UserNotFound {
                    email: email.clone(),
                }],
            ),
            Self::ResetTokenInvalid => (StatusCode::NOT_FOUND, vec![Message::ResetTokenInvalid]),
            Self::RedirectRejected(url) => (
                StatusCode::FORBIDDEN,
                vec![Message::NotAllowedRedirectUrl {
                    redirect_url: url.clone(),
                }],
            ),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, vec![Message::Unauthorized]),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, vec![Message::BadCredentials]),
            Self::NotConfirmed(email) => (
                StatusCode::UNAUTHORIZED,
                vec![Message::NotConfirmed {
                    email: email.clone(),
                }],
            ),
            Self::SessionNotFound => (StatusCode::NOT_FOUND, vec![Message::SessionNotFound]),
            Self::Validation(failures) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                failures.iter().map(|f| f.message()).collect(),
            ),
            Self::UnknownResourceType(_) => {
                (StatusCode::NOT_FOUND, vec![Message::UnknownResource])
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    vec![Message::InternalError],
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    vec![Message::InternalError],
                )
            }
        }
    }

    /// 指定言語でレスポンスを生成
    pub fn localize(self, locale: Locale) -> LocalizedError {
        LocalizedError {
            error: self,
            locale,
        }
    }
}

impl ValidationFailure {
    fn message(&self) -> Message {
        match self {
            Self::MissingPasswords => Message::MissingPasswords,
            Self::CurrentPasswordInvalid => Message::CurrentPasswordInvalid,
            Self::PasswordConfirmationMismatch => Message::PasswordConfirmationMismatch,
            Self::PasswordTooShort { minimum } => Message::PasswordTooShort { minimum: *minimum },
        }
    }
}

/// 言語情報付きのエラー（ハンドラーの戻り値用）
#[derive(Debug)]
pub struct LocalizedError {
    pub error: AppError,
    pub locale: Locale,
}

impl IntoResponse for LocalizedError {
    fn into_response(self) -> Response {
        let (status, messages) = self.error.status_and_messages();
        let errors = messages.iter().map(|m| m.render(self.locale)).collect();

        (
            status,
            Json(ErrorResponse {
                success: false,
                errors,
            }),
        )
            .into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.localize(Locale::default()).into_response()
    }
}

/// `Result<T, AppError>` を言語付きエラーに変換するヘルパー
pub trait Localize<T> {
    fn localize(self, locale: Locale) -> Result<T, LocalizedError>;
}

impl<T> Localize<T> for Result<T, AppError> {
    fn localize(self, locale: Locale) -> Result<T, LocalizedError> {
        self.map_err(|e| e.localize(locale))
    }
}
