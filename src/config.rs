use secrecy::SecretBox;
use serde::Deserialize;
use time::Duration;

use crate::locale::Locale;

/// 環境変数から読み込むプロセス設定
#[derive(Debug, Deserialize)]
pub struct Config {
    /// 未設定の場合はインメモリストアで起動する
    #[serde(default)]
    pub database_url: Option<SecretBox<String>>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,

    // パスワードリセット設定
    /// メール内リンクの遷移先（リセットトークン検証エンドポイント）
    #[serde(default = "default_password_reset_edit_url")]
    pub password_reset_edit_url: String,
    #[serde(default)]
    pub default_password_reset_url: Option<String>,
    /// カンマ区切り
    #[serde(default)]
    pub redirect_whitelist: Option<Vec<String>>,
    #[serde(default = "default_reset_password_within_secs")]
    pub reset_password_within_secs: i64,
    #[serde(default = "default_true")]
    pub confirm_on_password_reset: bool,

    // 認証トークン設定
    #[serde(default = "default_token_lifespan_secs")]
    pub token_lifespan_secs: i64,
    #[serde(default = "default_max_number_of_devices")]
    pub max_number_of_devices: usize,
    #[serde(default = "default_token_sweep_interval_secs")]
    pub token_sweep_interval_secs: u64,

    // パスワード変更設定
    #[serde(default)]
    pub check_current_password_before_update: bool,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    // ユーザー種別設定
    /// `name:scope` のカンマ区切り（例: `user:auth,mang:mangs`）
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<String>,
    #[serde(default = "default_email_keys")]
    pub case_insensitive_keys: Vec<String>,
    #[serde(default = "default_email_keys")]
    pub strip_whitespace_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub confirmable: bool,

    #[serde(default)]
    pub default_locale: Locale,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PASSWORD_RESET_EDIT_URL: &str = "http://localhost:3000/auth/password/edit";
/// 6時間
const DEFAULT_RESET_PASSWORD_WITHIN_SECS: i64 = 6 * 60 * 60;
/// 2週間
const DEFAULT_TOKEN_LIFESPAN_SECS: i64 = 14 * 24 * 60 * 60;
const DEFAULT_MAX_NUMBER_OF_DEVICES: usize = 10;
const DEFAULT_TOKEN_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// 設定名が指定されなかった場合のクライアント設定名
pub const DEFAULT_CONFIG_NAME: &str = "default";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_password_reset_edit_url() -> String {
    DEFAULT_PASSWORD_RESET_EDIT_URL.to_string()
}

fn default_reset_password_within_secs() -> i64 {
    DEFAULT_RESET_PASSWORD_WITHIN_SECS
}

fn default_token_lifespan_secs() -> i64 {
    DEFAULT_TOKEN_LIFESPAN_SECS
}

fn default_max_number_of_devices() -> usize {
    DEFAULT_MAX_NUMBER_OF_DEVICES
}

fn default_token_sweep_interval_secs() -> u64 {
    DEFAULT_TOKEN_SWEEP_INTERVAL_SECS
}

fn default_min_password_length() -> usize {
    DEFAULT_MIN_PASSWORD_LENGTH
}

fn default_resource_types() -> Vec<String> {
    vec!["user:auth".to_string()]
}

fn default_email_keys() -> Vec<String> {
    vec!["email".to_string()]
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}

/// 認証可能なリソースの種別（User など）
///
/// ルーティング上は `scope` で識別される（例: `/auth/password`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    pub name: String,
    pub scope: String,
    pub case_insensitive_keys: Vec<String>,
    pub strip_whitespace_keys: Vec<String>,
    /// false の場合、確認状態は NotApplicable として扱う
    pub confirmable: bool,
}

impl ResourceType {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            case_insensitive_keys: default_email_keys(),
            strip_whitespace_keys: default_email_keys(),
            confirmable: true,
        }
    }

    /// `name:scope` 形式の設定値を解釈する。scope 省略時は name を使う
    pub fn parse(entry: &str) -> Option<Self> {
        let (name, scope) = match entry.split_once(':') {
            Some((name, scope)) => (name.trim(), scope.trim()),
            None => (entry.trim(), entry.trim()),
        };
        if name.is_empty() || scope.is_empty() {
            return None;
        }
        Some(Self::new(name, scope))
    }

    pub fn is_case_insensitive(&self, key: &str) -> bool {
        self.case_insensitive_keys.iter().any(|k| k == key)
    }

    pub fn strips_whitespace(&self, key: &str) -> bool {
        self.strip_whitespace_keys.iter().any(|k| k == key)
    }
}

/// 各フローに注入される認証設定
///
/// プロセス全体の可変グローバルは持たず、AppState 経由で渡す。
/// テストでは任意の値で組み立ててよい。
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub resource_types: Vec<ResourceType>,
    pub password_reset_edit_url: String,
    pub default_password_reset_url: Option<String>,
    pub redirect_whitelist: Option<Vec<String>>,
    pub reset_password_within: Duration,
    pub confirm_on_password_reset: bool,
    pub token_lifespan: Duration,
    pub max_number_of_devices: usize,
    pub check_current_password_before_update: bool,
    pub min_password_length: usize,
    pub default_locale: Locale,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            resource_types: vec![ResourceType::new("user", "auth")],
            password_reset_edit_url: DEFAULT_PASSWORD_RESET_EDIT_URL.to_string(),
            default_password_reset_url: None,
            redirect_whitelist: None,
            reset_password_within: Duration::seconds(DEFAULT_RESET_PASSWORD_WITHIN_SECS),
            confirm_on_password_reset: true,
            token_lifespan: Duration::seconds(DEFAULT_TOKEN_LIFESPAN_SECS),
            max_number_of_devices: DEFAULT_MAX_NUMBER_OF_DEVICES,
            check_current_password_before_update: false,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            default_locale: Locale::default(),
        }
    }
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        let mut resource_types: Vec<ResourceType> = Vec::new();
        for entry in config.resource_types.iter().filter(|e| !e.trim().is_empty()) {
            let Some(parsed) = ResourceType::parse(entry) else {
                tracing::warn!(entry = %entry, "リソース種別の設定を解釈できません");
                continue;
            };
            if resource_types.iter().any(|t| t.scope == parsed.scope) {
                tracing::warn!(scope = %parsed.scope, "重複したスコープを無視");
                continue;
            }
            resource_types.push(ResourceType {
                case_insensitive_keys: config.case_insensitive_keys.clone(),
                strip_whitespace_keys: config.strip_whitespace_keys.clone(),
                confirmable: config.confirmable,
                ..parsed
            });
        }

        Self {
            resource_types,
            password_reset_edit_url: config.password_reset_edit_url.clone(),
            default_password_reset_url: config
                .default_password_reset_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            redirect_whitelist: config
                .redirect_whitelist
                .clone()
                .filter(|list| !list.is_empty()),
            reset_password_within: Duration::seconds(config.reset_password_within_secs),
            confirm_on_password_reset: config.confirm_on_password_reset,
            token_lifespan: Duration::seconds(config.token_lifespan_secs),
            max_number_of_devices: config.max_number_of_devices,
            check_current_password_before_update: config.check_current_password_before_update,
            min_password_length: config.min_password_length,
            default_locale: config.default_locale,
        }
    }

    /// ルーティングのスコープからリソース種別を解決
    pub fn resource_type(&self, scope: &str) -> Option<&ResourceType> {
        self.resource_types.iter().find(|t| t.scope == scope)
    }
}
