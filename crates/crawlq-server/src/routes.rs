use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crawlq_core::error::AppError;
use crawlq_core::queue_store::QueueStore;
use crawlq_core::status::JobResult;

use crate::dto::{
    CrawlParams, CrawlResponse, HealthResponse, JobResultEntry, JobResultsResponse,
    JobStatusQuery, JobStatusResponse, QueueSizeResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/crawl", post(crawl))
        .route("/queueSize", get(queue_size))
        .route("/jobStatus", get(job_status))
        .route("/jobResults", get(job_results))
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/crawl",
    params(CrawlParams),
    responses(
        (status = 201, description = "One job queued per URL", body = CrawlResponse),
        (status = 400, description = "Invalid request", body = crate::dto::ErrorResponse),
        (status = 503, description = "Queue store unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn crawl(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let params = CrawlParams::from_query(query.as_deref().unwrap_or_default())?;
    let receipt = state.submission.submit(params.into_request()).await?;

    let response = CrawlResponse {
        job_ids: receipt.job_ids,
        current_queue_size: receipt.queue_size,
    };

    Ok((StatusCode::CREATED, axum::Json(response)))
}

#[utoipa::path(
    get,
    path = "/queueSize",
    responses(
        (status = 200, description = "Jobs waiting to be claimed", body = QueueSizeResponse),
        (status = 503, description = "Queue store unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn queue_size(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let current_queue_size = state.submission.queue_size().await?;
    Ok(axum::Json(QueueSizeResponse { current_queue_size }))
}

#[utoipa::path(
    get,
    path = "/jobStatus",
    params(JobStatusQuery),
    responses(
        (status = 200, description = "Job state and queue position", body = JobStatusResponse),
        (status = 400, description = "Missing jobID", body = crate::dto::ErrorResponse),
        (status = 404, description = "Unknown or expired job", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobStatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query
        .job_id
        .ok_or_else(|| AppError::ValidationError("jobID is required".into()))?;
    // A malformed id cannot name a job.
    let id = Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(raw.clone()))?;

    let report = state.status.get_status(id).await?;

    Ok(axum::Json(JobStatusResponse {
        status: report.state.to_string(),
        position: report.position,
    }))
}

#[utoipa::path(
    get,
    path = "/jobResults",
    params(
        ("jobIDs" = Vec<String>, Query, description = "Job ids returned from `/crawl`; repeat for several"),
    ),
    responses(
        (status = 200, description = "One entry per requested id", body = std::collections::BTreeMap<String, JobResultEntry>),
        (status = 400, description = "No jobIDs given", body = crate::dto::ErrorResponse),
        (status = 503, description = "Queue store unavailable", body = crate::dto::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn job_results(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let requested: Vec<String> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| key == "jobIDs")
        .map(|(_, value)| value.into_owned())
        .collect();

    if requested.is_empty() {
        return Err(AppError::ValidationError("at least one jobIDs parameter is required".into()).into());
    }

    let mut response = JobResultsResponse::new();
    let mut lookups = Vec::with_capacity(requested.len());
    for raw in requested {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => lookups.push((raw, id)),
            Err(_) => {
                response.insert(raw, JobResult::NotFound.into());
            }
        }
    }

    let ids: Vec<Uuid> = lookups.iter().map(|(_, id)| *id).collect();
    let results = state.status.get_results(&ids).await?;
    for ((raw, _), (_, result)) in lookups.into_iter().zip(results) {
        response.insert(raw, result.into());
    }

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Queue store health check failed");
            false
        }
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        store: if healthy { "ok" } else { "error" },
        backend: state.store.backend(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, axum::Json(response))
}
