use http::{HeaderMap, header::ACCEPT_LANGUAGE};
use serde::Deserialize;

/// クライアント向けメッセージの言語
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ja,
}

impl Locale {
    /// Accept-Language ヘッダーから言語を決定
    ///
    /// q値は見ずに、最初に対応している言語タグを採用する。
    pub fn negotiate(headers: &HeaderMap, fallback: Locale) -> Locale {
        let Some(value) = headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
        else {
            return fallback;
        };

        value
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .find_map(|tag| Self::from_tag(&tag))
            .unwrap_or(fallback)
    }

    fn from_tag(tag: &str) -> Option<Locale> {
        let primary = tag.split('-').next().unwrap_or(tag);
        match primary {
            "en" => Some(Locale::En),
            "ja" => Some(Locale::Ja),
            _ => None,
        }
    }
}

/// クライアントに返すメッセージの一覧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    MissingEmail,
    MissingRedirectUrl,
    NotAllowedRedirectUrl { redirect_url: String },
    UserNotFound { email: String },
    Sended { email: String },
    ResetTokenInvalid,
    SuccessfullyUpdated,
    MissingPasswords,
    CurrentPasswordInvalid,
    PasswordConfirmationMismatch,
    PasswordTooShort { minimum: usize },
    Unauthorized,
    BadCredentials,
    NotConfirmed { email: String },
    SessionNotFound,
    UnknownResource,
    InternalError,
}

impl Message {
    pub fn render(&self, locale: Locale) -> String {
        match locale {
            Locale::En => self.render_en(),
            Locale::Ja => self.render_ja(),
        }
    }

    fn render_en(&self) -> String {
        match self {
            Self::MissingEmail => "You must provide an email address.".to_string(),
            Self::MissingRedirectUrl => "Missing redirect URL.".to_string(),
            Self::NotAllowedRedirectUrl { redirect_url } => {
                format!("Redirect to '{redirect_url}' not allowed.")
            }
            Self::UserNotFound { email } => {
                format!("Unable to find user with email '{email}'.")
            }
            Self::Sended { email } => format!(
                "An email has been sent to '{email}' containing instructions for resetting your password."
            ),
            Self::ResetTokenInvalid => {
                "The password reset link is invalid or has expired.".to_string()
            }
            Self::SuccessfullyUpdated => "Your password has been successfully updated.".to_string(),
            Self::MissingPasswords => {
                "You must fill out the fields labeled 'Password' and 'Password confirmation'."
                    .to_string()
            }
            Self::CurrentPasswordInvalid => "Current password is invalid.".to_string(),
            Self::PasswordConfirmationMismatch => {
                "Password confirmation doesn't match Password.".to_string()
            }
            Self::PasswordTooShort { minimum } => {
                format!("Password is too short (minimum is {minimum} characters).")
            }
            Self::Unauthorized => {
                "You need to sign in or sign up before continuing.".to_string()
            }
            Self::BadCredentials => "Invalid login credentials. Please try again.".to_string(),
            Self::NotConfirmed { email } => format!(
                "A confirmation email was sent to your account at '{email}'. You must follow the instructions in the email before your account can be activated."
            ),
            Self::SessionNotFound => "User was not found or was not logged in.".to_string(),
            Self::UnknownResource => "Not found.".to_string(),
            Self::InternalError => "An internal error occurred.".to_string(),
        }
    }

    fn render_ja(&self) -> String {
        match self {
            Self::MissingEmail => "メールアドレスを入力してください".to_string(),
            Self::MissingRedirectUrl => "リダイレクトURLが指定されていません".to_string(),
            Self::NotAllowedRedirectUrl { redirect_url } => {
                format!("'{redirect_url}' へのリダイレクトは許可されていません")
            }
            Self::UserNotFound { email } => {
                format!("メールアドレス '{email}' のユーザーが見つかりません")
            }
            Self::Sended { email } => {
                format!("'{email}' にパスワードリセットの手順を送信しました")
            }
            Self::ResetTokenInvalid => "無効または期限切れのリンクです".to_string(),
            Self::SuccessfullyUpdated => "パスワードが更新されました".to_string(),
            Self::MissingPasswords => {
                "パスワードとパスワード（確認）を入力してください".to_string()
            }
            Self::CurrentPasswordInvalid => "現在のパスワードが正しくありません".to_string(),
            Self::PasswordConfirmationMismatch => {
                "パスワード（確認）とパスワードが一致しません".to_string()
            }
            Self::PasswordTooShort { minimum } => {
                format!("パスワードは{minimum}文字以上で入力してください")
            }
            Self::Unauthorized => "ログインしてください".to_string(),
            Self::BadCredentials => {
                "メールアドレスまたはパスワードが正しくありません".to_string()
            }
            Self::NotConfirmed { email } => {
                format!("'{email}' に確認メールを送信しました。メールの手順に従ってアカウントを有効化してください")
            }
            Self::SessionNotFound => {
                "ユーザーが見つからないか、ログインしていません".to_string()
            }
            Self::UnknownResource => "見つかりません".to_string(),
            Self::InternalError => "内部エラーが発生しました".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_negotiate_without_header_uses_fallback() {
        assert_eq!(Locale::negotiate(&HeaderMap::new(), Locale::Ja), Locale::Ja);
    }

    #[test]
    fn test_negotiate_picks_first_supported_tag() {
        let headers = headers("fr-FR;q=0.9, ja-JP;q=0.8, en;q=0.5");
        assert_eq!(Locale::negotiate(&headers, Locale::En), Locale::Ja);
    }

    #[test]
    fn test_negotiate_unsupported_falls_back() {
        let headers = headers("de, fr");
        assert_eq!(Locale::negotiate(&headers, Locale::En), Locale::En);
    }

    #[test]
    fn test_messages_echo_parameters() {
        let message = Message::NotAllowedRedirectUrl {
            redirect_url: "https://evil.example".to_string(),
        };
        assert!(message.render(Locale::En).contains("https://evil.example"));
        assert!(message.render(Locale::Ja).contains("https://evil.example"));
    }
}
