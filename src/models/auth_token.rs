use sqlx::FromRow;
use time::OffsetDateTime;

/// クライアント（端末・セッション）ごとの認証トークン
///
/// 平文トークンは発行時に一度だけ返却し、ここにはハッシュのみ保持する。
#[derive(Debug, Clone, FromRow)]
pub struct AuthTokenEntry {
    pub client_id: String,
    pub token_hash: String,
    pub expiry: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl AuthTokenEntry {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiry <= now
    }
}
