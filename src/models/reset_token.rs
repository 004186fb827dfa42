use secrecy::{ExposeSecret, SecretString};
use time::OffsetDateTime;

/// リソースに保存されるパスワードリセットトークン
///
/// リソースごとに高々1つ。検証の試行時に必ず削除される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTokenRecord {
    pub token_hash: String,
    pub sent_at: OffsetDateTime,
    pub config_name: String,
    pub redirect_url: String,
}

impl ResetTokenRecord {
    pub fn is_expired_at(&self, now: OffsetDateTime, within: time::Duration) -> bool {
        now > self.sent_at + within
    }
}

/// メール送信側に渡すリセット情報
///
/// 平文トークンを含むため Debug 出力では伏せる（SecretString）。
#[derive(Debug)]
pub struct ResetArtifact {
    pub to: String,
    pub config_name: String,
    pub redirect_url: String,
    pub reset_password_token: SecretString,
}

impl ResetArtifact {
    /// メール本文に埋め込むリンクを構築
    ///
    /// `<edit_url>?config=..&redirect_url=..&reset_password_token=..`
    pub fn link(&self, edit_url: &str) -> String {
        let separator = if edit_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}config={}&redirect_url={}&reset_password_token={}",
            edit_url,
            separator,
            urlencoding::encode(&self.config_name),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(self.reset_password_token.expose_secret()),
        )
    }
}
