//! Axum JSON API over the mirror: every operation answers with the uniform
//! `{success, data|error}` envelope and no error crosses the HTTP boundary as
//! a panic.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cronwatch_client::SchedulerClient;
use cronwatch_core::{JobCategory, JobStatus, TriggerKind};
use cronwatch_store::{store_from_env, JobFilter, JobPatch};
use cronwatch_sync::{JobService, OpsError, SyncConfig, SyncEngine};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const CRATE_NAME: &str = "cronwatch-web";

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_EXECUTIONS_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub service: Arc<JobService>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    code: u16,
}

#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    })
    .into_response()
}

fn fail(err: OpsError) -> Response {
    let (status, code) = match &err {
        OpsError::External(api) => (StatusCode::BAD_GATEWAY, api.code),
        OpsError::NotFound(_) => (StatusCode::NOT_FOUND, 404),
        OpsError::Unsupported => (StatusCode::METHOD_NOT_ALLOWED, 405),
        OpsError::NotMirrored(_) => (StatusCode::CONFLICT, 409),
        OpsError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
    };
    let body = Envelope::<()> {
        success: false,
        data: None,
        error: Some(ErrorBody {
            message: err.to_string(),
            code,
        }),
    };
    (status, Json(body)).into_response()
}

fn bad_request(message: String) -> Response {
    let body = Envelope::<()> {
        success: false,
        data: None,
        error: Some(ErrorBody { message, code: 400 }),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", post(sync_handler))
        .route("/api/jobs", get(list_jobs_handler).post(create_job_handler))
        .route(
            "/api/jobs/{id}",
            get(get_job_handler)
                .patch(update_job_handler)
                .delete(delete_job_handler),
        )
        .route("/api/jobs/{id}/run", post(run_job_handler))
        .route("/api/jobs/{id}/history", get(job_history_handler))
        .route("/api/executions", get(executions_handler))
        .route("/api/statistics", get(statistics_handler))
        .with_state(state)
}

/// Builds the full stack from environment configuration and serves it. The
/// missing-credential case surfaces here, at startup, as the subsystem's one
/// fatal error.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let client = Arc::new(SchedulerClient::new(config.client_config())?);
    let store = store_from_env().await?;

    let state = AppState {
        engine: Arc::new(SyncEngine::new(client.clone(), store.clone())),
        service: Arc::new(JobService::new(client, store)),
    };

    let port: u16 = std::env::var("CRONWATCH_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "serving mirror API");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn sync_handler(State(state): State<AppState>) -> Response {
    match state.engine.sync_jobs().await {
        Ok(summary) => ok(summary),
        Err(err) => fail(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct JobsQuery {
    category: Option<String>,
    status: Option<String>,
    created_by: Option<String>,
}

fn filter_from_query(query: &JobsQuery) -> Result<JobFilter, String> {
    let category = match &query.category {
        Some(raw) => Some(JobCategory::parse(raw).ok_or_else(|| format!("unknown category: {raw}"))?),
        None => None,
    };
    let status = match &query.status {
        Some(raw) => Some(JobStatus::parse(raw).ok_or_else(|| format!("unknown status: {raw}"))?),
        None => None,
    };
    Ok(JobFilter {
        category,
        status,
        created_by: query.created_by.clone(),
    })
}

async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Response {
    let filter = match filter_from_query(&query) {
        Ok(filter) => filter,
        Err(message) => return bad_request(message),
    };
    match state.service.get_jobs(&filter).await {
        Ok(jobs) => ok(jobs),
        Err(err) => fail(err),
    }
}

async fn create_job_handler(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    match state.service.create_job(payload).await {
        Ok(job) => ok(job),
        Err(err) => fail(err),
    }
}

async fn get_job_handler(State(state): State<AppState>, AxumPath(id): AxumPath<Uuid>) -> Response {
    match state.service.get_job(id).await {
        Ok(job) => ok(job),
        Err(err) => fail(err),
    }
}

async fn update_job_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Json(patch): Json<JobPatch>,
) -> Response {
    match state.service.update_job(id, patch).await {
        Ok(job) => ok(job),
        Err(err) => fail(err),
    }
}

async fn delete_job_handler(State(state): State<AppState>, AxumPath(id): AxumPath<Uuid>) -> Response {
    match state.service.delete_job(id).await {
        Ok(()) => ok(serde_json::json!({ "deleted": id })),
        Err(err) => fail(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct RunQuery {
    triggered_by: Option<String>,
}

async fn run_job_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Query(query): Query<RunQuery>,
) -> Response {
    let triggered_by = match query.triggered_by.as_deref() {
        None => TriggerKind::Manual,
        Some(raw) => match TriggerKind::parse(raw) {
            Some(kind) => kind,
            None => return bad_request(format!("unknown trigger kind: {raw}")),
        },
    };
    match state.service.execute_job(id, triggered_by).await {
        Ok(execution) => ok(execution),
        Err(err) => fail(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn job_history_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);
    match state.service.job_history(id, limit).await {
        Ok(executions) => ok(executions),
        Err(err) => fail(err),
    }
}

async fn executions_handler(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_EXECUTIONS_LIMIT).max(1);
    match state.service.all_executions(limit).await {
        Ok(executions) => ok(executions),
        Err(err) => fail(err),
    }
}

async fn statistics_handler(State(state): State<AppState>) -> Response {
    match state.service.statistics().await {
        Ok(stats) => ok(stats),
        Err(err) => fail(err),
    }
}
