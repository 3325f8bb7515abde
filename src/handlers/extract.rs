//! Extractors that reject with the JSON error envelope.
//!
//! `AppJson`, `AppQuery` and `AppPath` behave like their axum counterparts,
//! but a body, query string or path segment that fails to parse comes back as
//! `400 { "success": false, "message": ... }` instead of axum's plain text.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, OptionalFromRequest, Path, Query, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub struct AppJson<T>(pub T);

pub struct AppQuery<T>(pub T);

pub struct AppPath<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

/// `Option<AppJson<T>>` is `None` when the request carries no content type.
impl<S, T> OptionalFromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let value = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(value.map(|Json(value)| AppJson(value)))
    }
}

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(AppQuery(value))
    }
}

impl<S, T> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(AppPath(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::StatusCode,
        routing::{get, post},
    };
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Deserialize)]
    struct Named {
        name: String,
    }

    #[derive(Deserialize)]
    struct Paging {
        page: i64,
    }

    async fn required(AppJson(body): AppJson<Named>) -> String {
        body.name
    }

    async fn optional(body: Option<AppJson<Named>>) -> String {
        body.map(|AppJson(b)| b.name).unwrap_or_default()
    }

    async fn paged(AppQuery(query): AppQuery<Paging>) -> String {
        query.page.to_string()
    }

    async fn by_id(AppPath(id): AppPath<Uuid>) -> String {
        id.to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/required", post(required))
            .route("/optional", post(optional))
            .route("/paged", get(paged))
            .route("/items/{id}", get(by_id))
    }

    async fn send(request: axum::http::Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json_post(uri: &str, body: &'static str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn assert_envelope(status: StatusCode, bytes: &[u8]) {
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_enveloped() {
        let (status, bytes) = send(json_post("/required", "{ not json")).await;
        assert_envelope(status, &bytes);

        let (status, bytes) = send(json_post("/required", r#"{"title":"x"}"#)).await;
        assert_envelope(status, &bytes);
    }

    #[tokio::test]
    async fn optional_body_may_be_absent_but_not_malformed() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/optional")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::OK);

        let (status, bytes) = send(json_post("/optional", r#"{"name":"lofi"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"lofi");

        let (status, bytes) = send(json_post("/optional", "[")).await;
        assert_envelope(status, &bytes);
    }

    #[tokio::test]
    async fn bad_query_is_enveloped() {
        let (status, bytes) = send(get_request("/paged?page=abc")).await;
        assert_envelope(status, &bytes);

        let (status, bytes) = send(get_request("/paged?page=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"2");
    }

    #[tokio::test]
    async fn bad_path_is_enveloped() {
        let (status, bytes) = send(get_request("/items/not-a-uuid")).await;
        assert_envelope(status, &bytes);
    }
}
