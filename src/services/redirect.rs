use url::Url;

use crate::config::AuthSettings;
use crate::error::{AppError, MissingParameter};

/// リダイレクト先URLの検証
///
/// ホワイトリスト未設定なら構文的に正しいURLをすべて許可する。
/// 設定済みなら、いずれかのエントリに完全一致するか、URLの区切りで
/// 前方一致する場合のみ許可する。
pub struct RedirectPolicy<'a> {
    default_url: Option<&'a str>,
    whitelist: Option<&'a [String]>,
}

impl<'a> RedirectPolicy<'a> {
    pub fn new(default_url: Option<&'a str>, whitelist: Option<&'a [String]>) -> Self {
        Self {
            default_url,
            whitelist,
        }
    }

    pub fn from_settings(settings: &'a AuthSettings) -> Self {
        Self::new(
            settings.default_password_reset_url.as_deref(),
            settings.redirect_whitelist.as_deref(),
        )
    }

    /// 呼び出し元が指定したURL（省略可）から最終的なリダイレクト先を決定
    ///
    /// 省略時は既定URLで置き換える（ホワイトリスト検査なし）。
    /// 既定URLもない場合は `MissingParameter(RedirectUrl)`。
    pub fn resolve(&self, candidate: Option<&str>) -> Result<String, AppError> {
        match candidate.map(str::trim).filter(|c| !c.is_empty()) {
            Some(url) => self.validate(url).map(|()| url.to_string()),
            None => self
                .default_url
                .map(str::to_string)
                .ok_or(AppError::MissingParameter(MissingParameter::RedirectUrl)),
        }
    }

    /// URLの構文とホワイトリストを検査
    pub fn validate(&self, candidate: &str) -> Result<(), AppError> {
        if Url::parse(candidate).is_err() {
            tracing::warn!(redirect_url = %candidate, "不正な形式のリダイレクトURL");
            return Err(AppError::RedirectRejected(candidate.to_string()));
        }

        let Some(whitelist) = self.whitelist else {
            return Ok(());
        };

        if whitelist.iter().any(|entry| matches_entry(candidate, entry)) {
            Ok(())
        } else {
            tracing::warn!(redirect_url = %candidate, "ホワイトリスト外のリダイレクトURL");
            Err(AppError::RedirectRejected(candidate.to_string()))
        }
    }
}

fn matches_entry(candidate: &str, entry: &str) -> bool {
    if candidate == entry {
        return true;
    }
    let Some(rest) = candidate.strip_prefix(entry) else {
        return false;
    };
    // "https://app.example" が "https://app.example.evil.com" に一致しないようにする
    entry.ends_with('/') || rest.starts_with(['/', '?', '#'])
}
