//! Administrative HTTP API.
//!
//! `last_success` on a job reports scheduler health only: it advances when a
//! cycle runs to completion, even if some customers failed inside it.
//! Per-customer failures are visible in the logs, not through this API.

mod integrations;
mod jobs;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use secops_core::{IntegrationRegistry, JobStore, StoreError};
use secops_scheduler::{Scheduler, SchedulerError};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, require_bearer_auth, AuthState, RequestId};
use crate::provisioning::{ProvisionError, Provisioner};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scheduler: Scheduler,
    pub jobs: Arc<dyn JobStore>,
    pub registry: Arc<dyn IntegrationRegistry>,
    pub provisioner: Arc<Provisioner>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
    armed_jobs: usize,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: &str, data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id.to_owned()),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_store_error(request_id: &str, error: &StoreError) -> ApiError {
    match error {
        StoreError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        StoreError::Conflict(message) => ApiError::new(request_id, "conflict", message.clone()),
        StoreError::Invalid(message) => {
            ApiError::new(request_id, "validation_error", message.clone())
        }
        StoreError::Unavailable(_) | StoreError::Backend(_) => {
            tracing::error!(error = %error, "store operation failed");
            ApiError::new(request_id, "internal_error", "storage operation failed")
        }
    }
}

pub(super) fn map_scheduler_error(request_id: &str, error: &SchedulerError) -> ApiError {
    match error {
        SchedulerError::UnknownJob(_) => ApiError::new(request_id, "not_found", error.to_string()),
        SchedulerError::UnknownIntegration(_)
        | SchedulerError::JobIntegrationMismatch { .. }
        | SchedulerError::InvalidInterval(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        SchedulerError::Store(store) => map_store_error(request_id, store),
        SchedulerError::Systemic { .. } => {
            tracing::error!(error = %error, "scheduler operation failed");
            ApiError::new(request_id, "internal_error", "scheduler operation failed")
        }
    }
}

pub(super) fn map_provision_error(request_id: &str, error: &ProvisionError) -> ApiError {
    match error {
        ProvisionError::UnknownIntegration(_) | ProvisionError::Invalid(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        ProvisionError::AlreadyBound { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        ProvisionError::NotBound { .. } => ApiError::new(request_id, "not_found", error.to_string()),
        ProvisionError::Scheduler(e) => map_scheduler_error(request_id, e),
        ProvisionError::Store(e) => map_store_error(request_id, e),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/scheduler/jobs", get(jobs::list_jobs))
        .route(
            "/api/v1/scheduler/jobs/{job_id}",
            get(jobs::get_job).put(jobs::update_job),
        )
        .route("/api/v1/scheduler/jobs/{job_id}/run", post(jobs::run_job))
        .route(
            "/api/v1/integrations/{integration}/customers",
            get(integrations::list_customers),
        )
        .route(
            "/api/v1/integrations/{integration}/customers/{customer_code}",
            post(integrations::provision_customer).delete(integrations::decommission_customer),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);
    let armed_jobs = state.scheduler.armed_jobs().len();

    match secops_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                    armed_jobs,
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                        armed_jobs,
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
