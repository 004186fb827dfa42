use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthTokenEntry, Resource, ResetTokenRecord};
use crate::repositories::ResourceStore;

const RESOURCE_COLUMNS: &str = "id, resource_type, email, password_hash, confirmed_at, \
     allow_password_change, created_at, updated_at";

/// take_reset_token の取得結果（リセット前の値を含む）
#[derive(FromRow)]
struct TakenResetToken {
    #[sqlx(flatten)]
    resource: Resource,
    reset_password_token: String,
    reset_password_sent_at: OffsetDateTime,
    reset_password_config: String,
    reset_password_redirect_url: String,
}

/// PostgreSQL のリソースストア
///
/// スキーマは `migrations/` を参照。
#[derive(Clone)]
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `migrations/` の未適用分を適用する
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn find_by_email(
        &self,
        resource_type: &str,
        email: &str,
        case_insensitive: bool,
    ) -> Result<Option<Resource>, AppError> {
        let sql = if case_insensitive {
            format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources \
                 WHERE resource_type = $1 AND lower(email) = lower($2)"
            )
        } else {
            format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources \
                 WHERE resource_type = $1 AND email = $2"
            )
        };

        Ok(sqlx::query_as::<_, Resource>(&sql)
            .bind(resource_type)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_uid(
        &self,
        resource_type: &str,
        uid: &str,
    ) -> Result<Option<Resource>, AppError> {
        self.find_by_email(resource_type, uid, false).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, AppError> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1");
        Ok(sqlx::query_as::<_, Resource>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_reset_token(&self, id: Uuid, record: ResetTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE resources
            SET reset_password_token = $2,
                reset_password_sent_at = $3,
                reset_password_config = $4,
                reset_password_redirect_url = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&record.token_hash)
        .bind(record.sent_at)
        .bind(&record.config_name)
        .bind(&record.redirect_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 照合と削除を1文で行う（行ロックで同時実行を直列化）
    async fn take_reset_token(
        &self,
        resource_type: &str,
        token_hash: &str,
    ) -> Result<Option<(Resource, ResetTokenRecord)>, AppError> {
        let taken = sqlx::query_as::<_, TakenResetToken>(
            r#"
            WITH target AS (
                SELECT id, reset_password_token, reset_password_sent_at,
                       reset_password_config, reset_password_redirect_url
                FROM resources
                WHERE resource_type = $1 AND reset_password_token = $2
                FOR UPDATE
            )
            UPDATE resources r
            SET reset_password_token = NULL,
                reset_password_sent_at = NULL,
                reset_password_config = NULL,
                reset_password_redirect_url = NULL,
                updated_at = NOW()
            FROM target
            WHERE r.id = target.id
            RETURNING r.id, r.resource_type, r.email, r.password_hash, r.confirmed_at,
                      r.allow_password_change, r.created_at, r.updated_at,
                      target.reset_password_token, target.reset_password_sent_at,
                      target.reset_password_config, target.reset_password_redirect_url
            "#,
        )
        .bind(resource_type)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(taken.map(|t| {
            (
                t.resource,
                ResetTokenRecord {
                    token_hash: t.reset_password_token,
                    sent_at: t.reset_password_sent_at,
                    config_name: t.reset_password_config,
                    redirect_url: t.reset_password_redirect_url,
                },
            )
        }))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE resources
            SET password_hash = $2, allow_password_change = false, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_allow_password_change(&self, id: Uuid, allow: bool) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE resources
            SET allow_password_change = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(allow)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 条件付き UPDATE のため、同時実行でも行を返すのは一方のみ
    async fn take_allow_password_change(&self, id: Uuid) -> Result<bool, AppError> {
        let taken = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE resources
            SET allow_password_change = false, updated_at = NOW()
            WHERE id = $1 AND allow_password_change
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(taken.is_some())
    }

    async fn confirm(&self, id: Uuid, at: OffsetDateTime) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE resources
            SET confirmed_at = COALESCE(confirmed_at, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// リソース行をロックしてから追加・削除する
    async fn insert_auth_token(
        &self,
        id: Uuid,
        entry: AuthTokenEntry,
        max_entries: usize,
    ) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM resources WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO auth_tokens (resource_id, client_id, token_hash, expiry, last_used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (resource_id, client_id)
            DO UPDATE SET token_hash = EXCLUDED.token_hash, expiry = EXCLUDED.expiry
            "#,
        )
        .bind(id)
        .bind(&entry.client_id)
        .bind(&entry.token_hash)
        .bind(entry.expiry)
        .bind(entry.last_used_at)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        let evicted = sqlx::query(
            r#"
            DELETE FROM auth_tokens
            WHERE resource_id = $1 AND client_id IN (
                SELECT client_id FROM auth_tokens
                WHERE resource_id = $1
                ORDER BY expiry DESC
                OFFSET $2
            )
            "#,
        )
        .bind(id)
        .bind(max_entries as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(evicted.rows_affected() as usize)
    }

    async fn find_auth_token(
        &self,
        id: Uuid,
        client_id: &str,
    ) -> Result<Option<AuthTokenEntry>, AppError> {
        Ok(sqlx::query_as::<_, AuthTokenEntry>(
            r#"
            SELECT client_id, token_hash, expiry, last_used_at, created_at
            FROM auth_tokens
            WHERE resource_id = $1 AND client_id = $2
            "#,
        )
        .bind(id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_auth_tokens(&self, id: Uuid) -> Result<Vec<AuthTokenEntry>, AppError> {
        Ok(sqlx::query_as::<_, AuthTokenEntry>(
            r#"
            SELECT client_id, token_hash, expiry, last_used_at, created_at
            FROM auth_tokens
            WHERE resource_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn touch_auth_token(
        &self,
        id: Uuid,
        client_id: &str,
        at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE auth_tokens
            SET last_used_at = $3
            WHERE resource_id = $1 AND client_id = $2
            "#,
        )
        .bind(id)
        .bind(client_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_auth_token(&self, id: Uuid, client_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM auth_tokens
            WHERE resource_id = $1 AND client_id = $2
            "#,
        )
        .bind(id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_expired_auth_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM auth_tokens
            WHERE expiry <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
