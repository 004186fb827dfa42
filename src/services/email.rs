use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::AppError;
use crate::locale::Locale;
use crate::models::ResetArtifact;

/// 送信するメール
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// HTML 本文に埋め込む文字列のエスケープ
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// パスワードリセットメールを組み立てる
///
/// 本文には `config=..&redirect_url=..&reset_password_token=..` を含むリンクを埋め込む。
/// リンクの各値はパーセントエンコード済み、宛先は HTML エスケープする。
pub fn reset_password_instructions(
    artifact: &ResetArtifact,
    edit_url: &str,
    locale: Locale,
) -> MailMessage {
    let link = artifact.link(edit_url);
    let to = escape_html(&artifact.to);
    let (subject, body) = match locale {
        Locale::En => (
            "Reset password instructions".to_string(),
            format!(
                "Hello {},\n\n\
                 Someone has requested a link to change your password. You can do this through the link below.\n\n\
                 <a href=\"{}\">Change my password</a>\n\n\
                 If you didn't request this, please ignore this email.\n\
                 Your password won't change until you access the link above and create a new one.\n",
                to, link
            ),
        ),
        Locale::Ja => (
            "パスワード再設定のご案内".to_string(),
            format!(
                "{} 様\n\n\
                 パスワード再設定のリクエストを受け付けました。以下のリンクから再設定してください。\n\n\
                 <a href=\"{}\">パスワードを変更する</a>\n\n\
                 心当たりがない場合は、このメールを破棄してください。\n\
                 上記リンクから新しいパスワードを設定するまで、パスワードは変更されません。\n",
                to, link
            ),
        ),
    };

    MailMessage {
        to: artifact.to.clone(),
        subject,
        body,
    }
}

/// メール送信（外部の配送層）
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn deliver(&self, message: MailMessage) -> Result<(), AppError>;
}

/// 開発用: 送信せずログ出力のみ
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn deliver(&self, message: MailMessage) -> Result<(), AppError> {
        tracing::info!(to = %message.to, subject = %message.subject, "メール送信（開発モード）");
        // 本文にはリセットトークンが含まれるため debug レベルのみ
        tracing::debug!(body = %message.body, "メール本文");
        Ok(())
    }
}

/// 送信内容をメモリに保持する（テスト・検証用）
#[derive(Clone, Default)]
pub struct MemoryMailer {
    deliveries: Arc<Mutex<Vec<MailMessage>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<MailMessage> {
        self.deliveries
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<MailMessage> {
        self.deliveries().pop()
    }
}

#[async_trait]
impl ResetMailer for MemoryMailer {
    async fn deliver(&self, message: MailMessage) -> Result<(), AppError> {
        self.deliveries
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("mailer lock poisoned")))?
            .push(message);
        Ok(())
    }
}

#[cfg(feature = "email")]
pub use smtp::SmtpMailer;

#[cfg(feature = "email")]
mod smtp {
    use async_trait::async_trait;
    use lettre::message::{Mailbox, header::ContentType};
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
    use secrecy::ExposeSecret;

    use super::{MailMessage, ResetMailer};
    use crate::config::Config;
    use crate::error::AppError;

    /// SMTP経由でメールを送信
    #[derive(Clone)]
    pub struct SmtpMailer {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: String,
    }

    impl SmtpMailer {
        /// SMTP設定が揃っている場合のみ作成
        pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
            let (Some(host), Some(username), Some(password), Some(from)) = (
                &config.smtp_host,
                &config.smtp_username,
                &config.smtp_password,
                &config.smtp_from_address,
            ) else {
                return Ok(None);
            };

            let credentials = Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            );

            let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| {
                    tracing::error!(error = ?e, "SMTPトランスポートの初期化エラー");
                    AppError::Internal(anyhow::anyhow!("smtp transport error"))
                })?
                .port(config.smtp_port)
                .credentials(credentials)
                .build();

            Ok(Some(Self {
                transport,
                from: from.clone(),
            }))
        }
    }

    #[async_trait]
    impl ResetMailer for SmtpMailer {
        async fn deliver(&self, message: MailMessage) -> Result<(), AppError> {
            let email = Message::builder()
                .from(self.from.parse::<Mailbox>().map_err(|e| {
                    tracing::error!(error = ?e, "送信元アドレスのパースエラー");
                    AppError::Internal(anyhow::anyhow!("invalid from address"))
                })?)
                .to(message.to.parse::<Mailbox>().map_err(|e| {
                    tracing::error!(error = ?e, "宛先アドレスのパースエラー");
                    AppError::Internal(anyhow::anyhow!("invalid recipient address"))
                })?)
                .subject(message.subject)
                .header(ContentType::TEXT_HTML)
                .body(message.body)
                .map_err(|e| {
                    tracing::error!(error = ?e, "メール組み立てエラー");
                    AppError::Internal(anyhow::anyhow!("message build error"))
                })?;

            self.transport.send(email).await.map_err(|e| {
                tracing::error!(error = ?e, "SMTP送信エラー");
                AppError::Internal(anyhow::anyhow!("smtp send error"))
            })?;

            tracing::info!(to = %message.to, "メール送信完了");
            Ok(())
        }
    }
}
