use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 認証可能なアカウント
///
/// `email` はトークン認証時の uid としても使われる。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resource {
    pub id: Uuid,
    pub resource_type: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub confirmed_at: Option<OffsetDateTime>,
    #[serde(skip)]
    pub allow_password_change: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// アカウント確認状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Confirmed,
    Unconfirmed,
    /// 確認フローを持たないリソース種別
    NotApplicable,
}

impl Resource {
    pub fn uid(&self) -> &str {
        &self.email
    }

    pub fn confirmation_state(&self, confirmable: bool) -> ConfirmationState {
        match (confirmable, self.confirmed_at) {
            (false, _) => ConfirmationState::NotApplicable,
            (true, Some(_)) => ConfirmationState::Confirmed,
            (true, None) => ConfirmationState::Unconfirmed,
        }
    }
}

/// 新規リソース（ストアへの登録用）
#[derive(Debug, Clone)]
pub struct NewResource {
    pub resource_type: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub confirmed_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(confirmed_at: Option<OffsetDateTime>) -> Resource {
        let now = OffsetDateTime::now_utc();
        Resource {
            id: Uuid::new_v4(),
            resource_type: "user".to_string(),
            email: "user@example.com".to_string(),
            password_hash: None,
            confirmed_at,
            allow_password_change: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_confirmation_state() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            resource(Some(now)).confirmation_state(true),
            ConfirmationState::Confirmed
        );
        assert_eq!(
            resource(None).confirmation_state(true),
            ConfirmationState::Unconfirmed
        );
        assert_eq!(
            resource(None).confirmation_state(false),
            ConfirmationState::NotApplicable
        );
    }

    #[test]
    fn test_serialization_skips_secrets() {
        let json = serde_json::to_value(resource(None)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "user@example.com");
    }
}
