use std::convert::Infallible;

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;

/// JSON またはフォーム形式のリクエストボディ
///
/// 読み取れないボディは `None` になり、リクエスト自体は拒否しない。
#[derive(Debug)]
pub struct Payload<T>(pub Option<T>);

impl<T> Payload<T>
where
    T: Default,
{
    pub fn or_default(self) -> T {
        self.0.unwrap_or_default()
    }
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let decoded = if is_form(&req) {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(value)| value)
                .map_err(|e| e.body_text())
        } else {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(value)| value)
                .map_err(|e| e.body_text())
        };

        match decoded {
            Ok(value) => Ok(Self(Some(value))),
            Err(reason) => {
                tracing::debug!(reason = %reason, "リクエストボディを読み取れません");
                Ok(Self(None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Params {
        email: Option<String>,
    }

    async fn extract(content_type: Option<&str>, body: &'static str) -> Option<Params> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder.body(Body::from(body)).unwrap();
        let Ok(Payload(params)) = Payload::<Params>::from_request(request, &()).await;
        params
    }

    #[tokio::test]
    async fn test_json_body() {
        let params = extract(Some("application/json"), r#"{"email":"a@example.com"}"#).await;
        assert_eq!(params.unwrap().email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_form_body() {
        let params = extract(
            Some("application/x-www-form-urlencoded"),
            "email=a%40example.com",
        )
        .await;
        assert_eq!(params.unwrap().email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_none() {
        assert!(extract(Some("application/json"), "{not json").await.is_none());
        assert!(extract(None, "").await.is_none());
        assert!(extract(Some("text/plain"), "email=x").await.is_none());
    }
}
