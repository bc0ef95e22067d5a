// src/api.rs
//! HTTP surface over the core: synchronous queries and subscription
//! management. Validation and pipeline rules live in the modules behind it.

use std::sync::Arc;

use axum::{
    extract::{Path, Query as UrlQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::controller::Controller;
use crate::error::RequestError;
use crate::process::{FilteredResult, ResultProcessor};
use crate::query::{Query, QueryDraft};
use crate::subscribe::{
    scheduler::TriggerError, NotifyTime, Scheduler, StoreError, Subscription, SubscriptionStore,
};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub processor: Arc<ResultProcessor>,
    pub store: Arc<dyn SubscriptionStore>,
    pub scheduler: Scheduler,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/query", post(run_query))
        .route("/subscriptions", post(create_subscription).get(list_subscriptions))
        .route("/subscriptions/{id}", delete(delete_subscription))
        .route("/subscriptions/{id}/trigger", post(trigger_subscription))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---- errors ----

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Storage(String),
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

impl From<TriggerError> for ApiError {
    fn from(e: TriggerError) -> Self {
        match e {
            TriggerError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            TriggerError::Store(inner) => ApiError::Storage(inner.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Storage(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// ---- handlers ----

async fn run_query(
    State(state): State<AppState>,
    Json(draft): Json<QueryDraft>,
) -> Result<Json<FilteredResult>, ApiError> {
    let query = Query::try_from(draft)?;
    let bundle = state.controller.run(&query).await?;
    Ok(Json(state.processor.process(&query, &bundle).await))
}

#[derive(Deserialize)]
struct CreateSubscriptionReq {
    email: String,
    notification_time: String,
    keywords: Vec<String>,
    sources: Vec<String>,
    #[serde(default)]
    detail: String,
}

#[derive(Serialize)]
struct CreatedResp {
    id: String,
}

async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionReq>,
) -> Result<(StatusCode, Json<CreatedResp>), ApiError> {
    let time = NotifyTime::parse(&req.notification_time)?;
    let query = Query::new(req.keywords, req.sources, req.detail, None)?;
    // Reject unknown sources at creation time, not at the first due run.
    for source in query.sources() {
        if state.controller.registry().resolve(source).is_none() {
            return Err(RequestError::UnknownSource(source.clone()).into());
        }
    }
    let sub = Subscription::new(req.email, query, time)?;
    let id = sub.id.clone();
    state.store.put(sub).await?;
    Ok((StatusCode::CREATED, Json(CreatedResp { id })))
}

#[derive(Deserialize)]
struct EmailParam {
    email: String,
}

async fn list_subscriptions(
    State(state): State<AppState>,
    UrlQuery(params): UrlQuery<EmailParam>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.store.get(&params.email).await?))
}

async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    UrlQuery(params): UrlQuery<EmailParam>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(&params.email, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "no subscription `{id}` for `{}`",
            params.email
        )))
    }
}

async fn trigger_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    UrlQuery(params): UrlQuery<EmailParam>,
) -> Result<Json<FilteredResult>, ApiError> {
    let result = state.scheduler.trigger(&params.email, &id).await?;
    Ok(Json(result))
}
