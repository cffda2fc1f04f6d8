use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use secops_core::{Credentials, CustomerIntegrationBinding, JobMetadata};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_provision_error, map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct IntegrationCustomers {
    integration: String,
    customers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProvisionBody {
    pub auth_keys: BTreeMap<String, String>,
    pub time_interval: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProvisionedItem {
    binding: CustomerIntegrationBinding,
    job: JobMetadata,
    job_created: bool,
    armed: bool,
}

pub(super) async fn list_customers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(integration): Path<String>,
) -> Result<Json<ApiResponse<IntegrationCustomers>>, ApiError> {
    let integration = integration.to_ascii_lowercase();
    let customers = state
        .registry
        .list_customers_for(&integration)
        .await
        .map_err(|e| map_store_error(&req_id.0, &e))?;

    Ok(Json(ApiResponse::new(
        &req_id.0,
        IntegrationCustomers {
            integration,
            customers,
        },
    )))
}

pub(super) async fn provision_customer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((integration, customer_code)): Path<(String, String)>,
    Json(body): Json<ProvisionBody>,
) -> Result<(StatusCode, Json<ApiResponse<ProvisionedItem>>), ApiError> {
    let provisioned = state
        .provisioner
        .provision(
            &customer_code,
            &integration,
            Credentials::new(body.auth_keys),
            body.time_interval,
        )
        .await
        .map_err(|e| map_provision_error(&req_id.0, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            &req_id.0,
            ProvisionedItem {
                binding: provisioned.binding,
                job: provisioned.job,
                job_created: provisioned.job_created,
                armed: provisioned.armed,
            },
        )),
    ))
}

pub(super) async fn decommission_customer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((integration, customer_code)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .provisioner
        .decommission(&customer_code, &integration)
        .await
        .map_err(|e| map_provision_error(&req_id.0, &e))?;
    Ok(StatusCode::NO_CONTENT)
}
