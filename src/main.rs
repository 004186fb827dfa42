use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use oxtoken::{
    config::{AuthSettings, Config},
    repositories::{MemoryResourceStore, PgResourceStore, ResourceStore},
    router::create_router,
    services::{LogMailer, ResetMailer, TokenStore},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("oxtoken 起動中...");

    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(host = %config.host, port = %config.port, "設定読み込み完了");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    let store = build_store(&config).await?;
    let mailer = build_mailer(&config)?;
    let settings = AuthSettings::from_config(&config);

    let state = AppState::new(store, mailer, settings);
    spawn_token_sweeper(
        state.tokens.clone(),
        Duration::from_secs(config.token_sweep_interval_secs.max(1)),
    );

    let app = create_router(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,oxtoken=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// DATABASE_URL があれば PostgreSQL、なければインメモリ
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ResourceStore>> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL 未設定: インメモリストアで起動（再起動でデータは消えます）");
        return Ok(Arc::new(MemoryResourceStore::new()));
    };

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "データベース接続に失敗");
            anyhow::anyhow!("Failed to connect to database: {}", e)
        })?;

    tracing::info!("データベース接続完了");

    let store = PgResourceStore::new(db_pool);
    store.migrate().await.map_err(|e| {
        tracing::error!(error = ?e, "マイグレーションに失敗");
        anyhow::anyhow!("Failed to run migrations: {}", e)
    })?;
    tracing::info!("マイグレーション適用完了");

    Ok(Arc::new(store))
}

#[cfg(feature = "email")]
fn build_mailer(config: &Config) -> anyhow::Result<Arc<dyn ResetMailer>> {
    use oxtoken::services::email::SmtpMailer;

    match SmtpMailer::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to configure SMTP: {}", e))?
    {
        Some(mailer) => {
            tracing::info!("SMTP メール送信を有効化");
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::warn!("SMTP 未設定: メールはログ出力のみ");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[cfg(not(feature = "email"))]
fn build_mailer(_config: &Config) -> anyhow::Result<Arc<dyn ResetMailer>> {
    tracing::info!("email 機能無効: メールはログ出力のみ");
    Ok(Arc::new(LogMailer))
}

/// 期限切れ認証トークンの定期削除
fn spawn_token_sweeper(tokens: TokenStore, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // 初回の即時 tick を読み捨てる
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = tokens.sweep_expired().await {
                tracing::error!(error = ?e, "期限切れトークン削除に失敗");
            }
        }
    });
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
