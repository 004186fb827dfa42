#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;

use oxtoken::{
    config::{AuthSettings, ResourceType},
    models::{NewResource, Resource},
    repositories::MemoryResourceStore,
    router::create_router,
    services::{MemoryMailer, password},
    state::AppState,
};

pub const PASSWORD: &str = "secret123";
pub const REDIRECT_URL: &str = "http://ng-token-auth.dev";

pub struct TestApp {
    pub router: Router,
    pub store: MemoryResourceStore,
    pub mailer: MemoryMailer,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn settings() -> AuthSettings {
    AuthSettings {
        resource_types: vec![
            ResourceType::new("user", "auth"),
            ResourceType::new("mang", "mangs"),
        ],
        ..AuthSettings::default()
    }
}

pub fn app_with(settings: AuthSettings) -> TestApp {
    let store = MemoryResourceStore::new();
    let mailer = MemoryMailer::new();
    let state = AppState::new(Arc::new(store.clone()), Arc::new(mailer.clone()), settings);
    TestApp {
        router: create_router(state),
        store,
        mailer,
    }
}

pub fn app() -> TestApp {
    app_with(settings())
}

impl TestApp {
    pub fn add_resource(&self, resource_type: &str, email: &str, confirmed: bool) -> Resource {
        self.store
            .insert(
                NewResource {
                    resource_type: resource_type.to_string(),
                    email: email.to_string(),
                    password_hash: Some(password::hash_password(PASSWORD).unwrap()),
                    confirmed_at: confirmed.then(OffsetDateTime::now_utc),
                },
                true,
            )
            .unwrap()
    }

    pub fn add_user(&self, email: &str) -> Resource {
        self.add_resource("user", email, true)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> TestResponse {
        self.send(json_request(method, uri, body, &HeaderMap::new()))
            .await
    }

    /// 最後に送信されたメールから平文のリセットトークンを取り出す
    pub fn mailed_token(&self) -> String {
        let body = self.mailer.last().expect("no mail delivered").body;
        query_value(&body, "reset_password_token").expect("no token in mail")
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, headers: &HeaderMap) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// 任意の Content-Type と生のボディでリクエストを組み立てる
pub fn raw_request(
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: &'static str,
    headers: &HeaderMap,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn get_request(uri: &str, headers: &HeaderMap) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

/// `key=value` をクエリ文字列やメール本文から取り出してデコード
pub fn query_value(text: &str, key: &str) -> Option<String> {
    let marker = format!("{key}=");
    let start = text
        .match_indices(&marker)
        .find(|(i, _)| *i == 0 || matches!(text.as_bytes()[i - 1], b'?' | b'&'))
        .map(|(i, _)| i + marker.len())?;
    let rest = &text[start..];
    let end = rest.find(['&', '"', '#']).unwrap_or(rest.len());
    Some(urlencoding::decode(&rest[..end]).ok()?.into_owned())
}

/// サインイン・リセット後のリダイレクトで得た認証情報からヘッダーを組み立てる
pub fn auth_headers(access_token: &str, client: &str, uid: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("access-token", access_token.parse().unwrap());
    headers.insert("client", client.parse().unwrap());
    headers.insert("uid", uid.parse().unwrap());
    headers
}

/// リダイレクトの Location から認証ヘッダーを組み立てる
pub fn auth_headers_from_location(location: &str) -> HeaderMap {
    auth_headers(
        &query_value(location, "token").unwrap(),
        &query_value(location, "client_id").unwrap(),
        &query_value(location, "uid").unwrap(),
    )
}
