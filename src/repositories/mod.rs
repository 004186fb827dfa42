pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthTokenEntry, Resource, ResetTokenRecord};

pub use memory::MemoryResourceStore;
pub use postgres::PgResourceStore;

/// リソース（アカウント）の永続化層
///
/// 同一リソースへの変更系操作（トークン追加・削除、リセットトークンの
/// 設定・取り出し、パスワード更新）は実装側でリソース単位に直列化すること。
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// メールアドレスでリソースを検索
    ///
    /// `case_insensitive` が true の場合は大文字小文字を区別しない。
    async fn find_by_email(
        &self,
        resource_type: &str,
        email: &str,
        case_insensitive: bool,
    ) -> Result<Option<Resource>, AppError>;

    /// uid（保存済みのメールアドレス、完全一致）でリソースを検索
    async fn find_by_uid(&self, resource_type: &str, uid: &str)
    -> Result<Option<Resource>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, AppError>;

    /// リセットトークンを保存（既存のものは置き換える）
    async fn set_reset_token(&self, id: Uuid, record: ResetTokenRecord) -> Result<(), AppError>;

    /// トークンハッシュが一致するリセットトークンを取り出して削除
    ///
    /// 照合と削除はアトミックに行うこと。同じハッシュで同時に呼ばれても
    /// `Some` を返すのは一方のみ。
    async fn take_reset_token(
        &self,
        resource_type: &str,
        token_hash: &str,
    ) -> Result<Option<(Resource, ResetTokenRecord)>, AppError>;

    /// パスワードハッシュを更新し、allow_password_change を解除
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    async fn set_allow_password_change(&self, id: Uuid, allow: bool) -> Result<(), AppError>;

    /// allow_password_change を解除し、解除前に立っていたかを返す
    ///
    /// 同時に呼ばれても true を返すのは一度だけ。
    async fn take_allow_password_change(&self, id: Uuid) -> Result<bool, AppError>;

    /// アカウントを確認済みにする
    async fn confirm(&self, id: Uuid, at: OffsetDateTime) -> Result<(), AppError>;

    /// 認証トークンを追加
    ///
    /// 追加後の件数が `max_entries` を超える場合は有効期限の早いものから削除し、
    /// 削除件数を返す。
    async fn insert_auth_token(
        &self,
        id: Uuid,
        entry: AuthTokenEntry,
        max_entries: usize,
    ) -> Result<usize, AppError>;

    async fn find_auth_token(
        &self,
        id: Uuid,
        client_id: &str,
    ) -> Result<Option<AuthTokenEntry>, AppError>;

    async fn list_auth_tokens(&self, id: Uuid) -> Result<Vec<AuthTokenEntry>, AppError>;

    async fn touch_auth_token(
        &self,
        id: Uuid,
        client_id: &str,
        at: OffsetDateTime,
    ) -> Result<(), AppError>;

    /// 認証トークンを削除（存在した場合 true）
    async fn remove_auth_token(&self, id: Uuid, client_id: &str) -> Result<bool, AppError>;

    /// 期限切れの認証トークンを全リソースから削除
    async fn remove_expired_auth_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError>;
}
