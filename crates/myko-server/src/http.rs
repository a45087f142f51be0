//! HTTP API
//!
//! JSON over axum. Errors map to status codes by kind:
//! validation 400, backend 502, timeout 504, everything else 500.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use myko_aggregator::WriterStats;
use myko_common::{AggregatedRecord, Entry, EventFilter, EventSink, MykoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::service::MykoService;

/// Error returned by handlers
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] MykoError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            MykoError::Validation(_) => StatusCode::BAD_REQUEST,
            MykoError::Backend(_) => StatusCode::BAD_GATEWAY,
            MykoError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InsertEventsRequest {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InsertEventsResponse {
    pub accepted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub records: Vec<AggregatedRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteEventsResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub writer: WriterStats,
}

/// Build the service router
pub fn router<S>(service: Arc<MykoService<S>>) -> Router
where
    S: EventSink + Clone + 'static,
{
    Router::new()
        .route("/health", get(health::<S>))
        .route(
            "/v1/events",
            get(query_events::<S>)
                .post(insert_events::<S>)
                .delete(delete_events::<S>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health<S>(State(service): State<Arc<MykoService<S>>>) -> Json<HealthResponse>
where
    S: EventSink + Clone + 'static,
{
    Json(HealthResponse {
        status: "healthy",
        version: myko_common::VERSION,
        writer: service.stats().await,
    })
}

async fn insert_events<S>(
    State(service): State<Arc<MykoService<S>>>,
    Json(request): Json<InsertEventsRequest>,
) -> Result<Json<InsertEventsResponse>, ApiError>
where
    S: EventSink + Clone + 'static,
{
    let accepted = service.insert_events(request.entries).await?;
    Ok(Json(InsertEventsResponse { accepted }))
}

async fn query_events<S>(
    State(service): State<Arc<MykoService<S>>>,
    Query(filter): Query<EventFilter>,
) -> Result<Json<QueryResponse>, ApiError>
where
    S: EventSink + Clone + 'static,
{
    let records = service.query(filter).await?;
    Ok(Json(QueryResponse { records }))
}

async fn delete_events<S>(
    State(service): State<Arc<MykoService<S>>>,
    Query(filter): Query<EventFilter>,
) -> Result<Json<DeleteEventsResponse>, ApiError>
where
    S: EventSink + Clone + 'static,
{
    let deleted = service.delete_events(filter).await?;
    Ok(Json(DeleteEventsResponse { deleted }))
}
