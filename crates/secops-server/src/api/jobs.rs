use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use secops_core::StoreError;
use secops_scheduler::{integration_for, JobStatus, SchedulerError, TriggerResult};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_scheduler_error, map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdateJobBody {
    pub time_interval: Option<u32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunAccepted {
    job_id: String,
    accepted: bool,
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<JobStatus>>>, ApiError> {
    let jobs = state
        .scheduler
        .list_jobs()
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    Ok(Json(ApiResponse::new(&req_id.0, jobs)))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<JobStatus>>, ApiError> {
    let job = state
        .scheduler
        .job_status(&job_id)
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    Ok(Json(ApiResponse::new(&req_id.0, job)))
}

/// Change a job's interval or enabled flag.
///
/// Enabling (or updating an enabled job) goes through the scheduler so the
/// timer is re-armed with the new interval. Disabling persists the new
/// interval, if any, and then cancels the timer. An interval change on a
/// disabled job is stored without arming it.
pub(super) async fn update_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
    Json(body): Json<UpdateJobBody>,
) -> Result<Json<ApiResponse<JobStatus>>, ApiError> {
    if body.time_interval.is_none() && body.enabled.is_none() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "provide time_interval, enabled, or both",
        ));
    }

    let current = match state.jobs.get(&job_id).await {
        Ok(job) => Some(job),
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(map_store_error(&req_id.0, &e)),
    };

    let enabled = body
        .enabled
        .or(current.as_ref().map(|job| job.enabled))
        .unwrap_or(true);
    let Some(time_interval) = body
        .time_interval
        .or(current.as_ref().map(|job| job.time_interval))
    else {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("job {job_id} does not exist; provide time_interval to create it"),
        ));
    };

    if enabled {
        let Some(integration) = integration_for(&job_id) else {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("job id {job_id} does not name an integration collection job"),
            ));
        };
        state
            .scheduler
            .add_or_update_job(&job_id, time_interval, integration)
            .await
            .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    } else {
        if current.is_none() {
            return Err(map_scheduler_error(
                &req_id.0,
                &SchedulerError::UnknownJob(job_id),
            ));
        }
        state
            .jobs
            .upsert(&job_id, time_interval, false)
            .await
            .map_err(|e| map_store_error(&req_id.0, &e))?;
        state
            .scheduler
            .remove_job(&job_id)
            .await
            .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    }

    tracing::info!(job_id = %job_id, time_interval, enabled, "api: job updated");

    let job = state
        .scheduler
        .job_status(&job_id)
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;
    Ok(Json(ApiResponse::new(&req_id.0, job)))
}

/// Start one cycle on a background task and answer immediately.
pub(super) async fn run_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<RunAccepted>>), ApiError> {
    state
        .scheduler
        .job_status(&job_id)
        .await
        .map_err(|e| map_scheduler_error(&req_id.0, &e))?;

    let scheduler = state.scheduler.clone();
    let spawned_id = job_id.clone();
    tokio::spawn(async move {
        match scheduler.trigger_now(&spawned_id).await {
            Ok(TriggerResult::Completed(report)) => tracing::info!(
                job_id = %spawned_id,
                attempted = report.attempted(),
                failures = report.failures(),
                "api: manual run finished"
            ),
            Ok(TriggerResult::Skipped) => {
                tracing::warn!(job_id = %spawned_id, "api: manual run skipped; cycle in flight");
            }
            Err(e) => tracing::error!(job_id = %spawned_id, error = %e, "api: manual run failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            &req_id.0,
            RunAccepted {
                job_id,
                accepted: true,
            },
        )),
    ))
}
