//! axum host adapter
//!
//! Thin binding from axum to the host-agnostic resources: each handler
//! converts the framework request into a `ResourceRequest`, establishes the
//! principal from a bearer token, and writes the `ResourceResponse` back.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use platibus_security::Principal;
use tokio_util::sync::CancellationToken;

use crate::resources::{ResourceRequest, ResourceResponse, ResourceRouter};
use crate::service::HttpTransportService;

/// Build the axum router serving the bus's HTTP surface.
pub fn router(transport: Arc<HttpTransportService>) -> Router {
    let state = Arc::new(ResourceRouter::new(transport));
    Router::new()
        .route("/message/:id", post(post_message))
        .route("/topic", get(get_topics))
        .route(
            "/topic/:topic/subscriber",
            post(post_subscriber).delete(delete_subscriber),
        )
        .route("/journal", get(get_journal))
        .with_state(state)
}

/// Serve the bus surface until the token is cancelled.
pub async fn serve(
    transport: Arc<HttpTransportService>,
    addr: &str,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(transport))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn post_message(
    State(router): State<Arc<ResourceRouter>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let principal = match principal_from_headers(&router, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let request = ResourceRequest {
        method: "POST".to_string(),
        path: vec!["message".to_string(), id],
        query: HashMap::new(),
        headers: header_pairs(&headers),
        principal,
        body,
    };
    into_axum(router.handle(request).await)
}

async fn post_subscriber(
    State(router): State<Arc<ResourceRouter>>,
    Path(topic): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response<Body> {
    subscriber_request(router, "POST", topic, query, headers).await
}

async fn delete_subscriber(
    State(router): State<Arc<ResourceRouter>>,
    Path(topic): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response<Body> {
    subscriber_request(router, "DELETE", topic, query, headers).await
}

async fn subscriber_request(
    router: Arc<ResourceRouter>,
    method: &str,
    topic: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
) -> Response<Body> {
    let principal = match principal_from_headers(&router, &headers) {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let request = ResourceRequest {
        method: method.to_string(),
        path: vec!["topic".to_string(), topic, "subscriber".to_string()],
        query,
        headers: header_pairs(&headers),
        principal,
        body: Bytes::new(),
    };
    into_axum(router.handle(request).await)
}

async fn get_topics(State(router): State<Arc<ResourceRouter>>) -> Response<Body> {
    let request = ResourceRequest {
        method: "GET".to_string(),
        path: vec!["topic".to_string()],
        query: HashMap::new(),
        headers: Vec::new(),
        principal: None,
        body: Bytes::new(),
    };
    into_axum(router.handle(request).await)
}

async fn get_journal(
    State(router): State<Arc<ResourceRouter>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    let request = ResourceRequest {
        method: "GET".to_string(),
        path: vec!["journal".to_string()],
        query,
        headers: Vec::new(),
        principal: None,
        body: Bytes::new(),
    };
    into_axum(router.handle(request).await)
}

/// Validate a bearer token into a principal. A present-but-invalid token is
/// answered 401; no token (or a non-bearer scheme) is anonymous.
fn principal_from_headers(
    router: &ResourceRouter,
    headers: &HeaderMap,
) -> Result<Option<Principal>, Response<Body>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let Ok(text) = value.to_str() else {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(token) = text.strip_prefix("Bearer ") else {
        return Ok(None);
    };
    match router.transport().token_service().validate(token) {
        Ok(principal) => Ok(Some(principal)),
        Err(_) => Err(StatusCode::UNAUTHORIZED.into_response()),
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn into_axum(response: ResourceResponse) -> Response<Body> {
    let mut builder = Response::builder().status(response.status);
    if let Some(content_type) = response.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
