use axum::{
    Router,
    http::HeaderName,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::services::auth::{
    ACCESS_TOKEN_HEADER, CLIENT_HEADER, EXPIRY_HEADER, TOKEN_TYPE_HEADER, UID_HEADER,
};
use crate::state::AppState;

fn auth_headers() -> [HeaderName; 5] {
    [
        ACCESS_TOKEN_HEADER,
        CLIENT_HEADER,
        UID_HEADER,
        EXPIRY_HEADER,
        TOKEN_TYPE_HEADER,
    ]
}

/// Router の構築
///
/// 認証系のルートはリソース種別のスコープ単位（`/auth/...`, `/mangs/...`）。
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(auth_headers());

    Router::new()
        .route("/api/health", get(handlers::health_check))
        // パスワードリセット
        .route(
            "/{scope}/password",
            post(handlers::password::create).put(handlers::password::update),
        )
        .route("/{scope}/password/edit", get(handlers::password::edit))
        // セッション
        .route("/{scope}/sign_in", post(handlers::sign_in))
        .route("/{scope}/sign_out", delete(handlers::sign_out))
        .route("/{scope}/validate_token", get(handlers::validate_token))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
