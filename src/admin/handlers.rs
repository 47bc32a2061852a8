use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::deploy::CycleReport;
use crate::lifecycle::{LifecycleError, ServiceState};
use crate::routing::MountInfo;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub state: ServiceState,
    pub mounts: usize,
    pub deployment_root: Option<String>,
    pub units: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
pub struct TransitionResult {
    pub state: ServiceState,
}

#[derive(Serialize)]
pub struct RedeployResult {
    pub net: i64,
    #[serde(flatten)]
    pub report: CycleReport,
}

/// Operator request failures.
#[derive(Debug)]
pub enum AdminError {
    Lifecycle(LifecycleError),
    DeploymentDisabled,
    CycleBusy,
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminError::Lifecycle(e) => (StatusCode::CONFLICT, e.to_string()),
            AdminError::DeploymentDisabled => (StatusCode::NOT_FOUND, "Hot deployment is disabled".to_string()),
            AdminError::CycleBusy => (StatusCode::CONFLICT, "Deployment cycle already running".to_string()),
            AdminError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let (deployment_root, units) = match &state.manager {
        Some(manager) => (
            Some(manager.root().display().to_string()),
            manager.deployed_units(),
        ),
        None => (None, BTreeMap::new()),
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        state: state.router.lifecycle().state(),
        mounts: state.router.mounts().len(),
        deployment_root,
        units,
    })
}

pub async fn get_mounts(State(state): State<AdminState>) -> Json<Vec<MountInfo>> {
    Json(state.router.describe())
}

pub async fn suspend(State(state): State<AdminState>) -> Result<Json<TransitionResult>, AdminError> {
    let lifecycle = state.router.lifecycle();
    lifecycle.suspend().map_err(AdminError::Lifecycle)?;
    tracing::info!("Service suspended by operator");
    Ok(Json(TransitionResult {
        state: lifecycle.state(),
    }))
}

pub async fn resume(State(state): State<AdminState>) -> Result<Json<TransitionResult>, AdminError> {
    let lifecycle = state.router.lifecycle();
    lifecycle.resume().map_err(AdminError::Lifecycle)?;
    tracing::info!("Service resumed by operator");
    Ok(Json(TransitionResult {
        state: lifecycle.state(),
    }))
}

pub async fn redeploy(State(state): State<AdminState>) -> Result<Json<RedeployResult>, AdminError> {
    let manager = state.manager.clone().ok_or(AdminError::DeploymentDisabled)?;

    let report = tokio::task::spawn_blocking(move || manager.run_cycle())
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?
        .map_err(|e| AdminError::Internal(e.to_string()))?
        .ok_or(AdminError::CycleBusy)?;

    Ok(Json(RedeployResult {
        net: report.net(),
        report,
    }))
}
