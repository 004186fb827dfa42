//! PostgreSQL ストアの同時実行テスト
//!
//! `DATABASE_URL` を設定して `cargo test -- --ignored` で実行する。

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use uuid::Uuid;

use oxtoken::models::ResetTokenRecord;
use oxtoken::repositories::{PgResourceStore, ResourceStore};

async fn connect() -> (sqlx::PgPool, PgResourceStore) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    let store = PgResourceStore::new(pool.clone());
    store.migrate().await.unwrap();
    (pool, store)
}

async fn insert_user(pool: &sqlx::PgPool) -> Uuid {
    sqlx::query_scalar("INSERT INTO resources (resource_type, email) VALUES ('user', $1) RETURNING id")
        .bind(format!("{}@example.com", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn delete_user(pool: &sqlx::PgPool, id: Uuid) {
    sqlx::query("DELETE FROM resources WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_take_reset_token_yields_one_winner() {
    let (pool, store) = connect().await;
    let id = insert_user(&pool).await;
    let token_hash = format!("hash-{}", Uuid::new_v4());

    store
        .set_reset_token(
            id,
            ResetTokenRecord {
                token_hash: token_hash.clone(),
                sent_at: OffsetDateTime::now_utc(),
                config_name: "default".to_string(),
                redirect_url: "http://ng-token-auth.dev".to_string(),
            },
        )
        .await
        .unwrap();

    let store = Arc::new(store);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let token_hash = token_hash.clone();
            tokio::spawn(async move { store.take_reset_token("user", &token_hash).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if let Some((resource, record)) = handle.await.unwrap().unwrap() {
            assert_eq!(resource.id, id);
            assert_eq!(record.token_hash, token_hash);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(store.take_reset_token("user", &token_hash).await.unwrap().is_none());

    delete_user(&pool, id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_take_allow_password_change_yields_one_winner() {
    let (pool, store) = connect().await;
    let id = insert_user(&pool).await;
    store.set_allow_password_change(id, true).await.unwrap();

    let store = Arc::new(store);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.take_allow_password_change(id).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let reloaded = store.find_by_id(id).await.unwrap().unwrap();
    assert!(!reloaded.allow_password_change);

    delete_user(&pool, id).await;
}
