use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use cld_state::{terraform, Cluster};
use cld_storage::Backend;
use cld_types::ClusterdError;

use crate::convert::{empty_sync, raw_json, sync, ApiError, TerraformError};

#[derive(Debug, Deserialize)]
pub struct LockIdQuery {
    #[serde(rename = "ID", default)]
    id: String,
}

pub async fn list_states<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
) -> Result<Response, ApiError> {
    Ok(sync(cluster.list_terraform_states().await?))
}

pub async fn get_state<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(plan): Path<String>,
) -> Result<Response, TerraformError> {
    Ok(raw_json(cluster.get_terraform_state(&plan).await?))
}

/// Terraform passes the lock it holds as `?ID=`. State bodies are raw JSON,
/// not sync envelopes.
pub async fn put_state<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(plan): Path<String>,
    Query(query): Query<LockIdQuery>,
    body: String,
) -> Result<Response, TerraformError> {
    cluster.put_terraform_state(&plan, &query.id, &body).await?;
    Ok(empty_sync())
}

pub async fn delete_state<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(plan): Path<String>,
) -> Result<Response, TerraformError> {
    cluster.delete_terraform_state(&plan).await?;
    Ok(empty_sync())
}

pub async fn list_locks<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
) -> Result<Response, ApiError> {
    Ok(sync(cluster.list_terraform_locks().await?))
}

/// The lock document is sent as a JSON string, which clients decode twice.
pub async fn get_lock<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(plan): Path<String>,
) -> Result<Response, TerraformError> {
    let lock = cluster.get_terraform_lock(&plan).await?;
    let text = serde_json::to_string(&lock)
        .map_err(|e| ClusterdError::Internal(format!("failed to encode lock: {e}")))?;
    Ok(Json(text).into_response())
}

pub async fn lock<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(plan): Path<String>,
    body: String,
) -> Result<Response, TerraformError> {
    let requested = terraform::decode_lock(&body)?;
    cluster.lock_terraform_plan(&plan, &requested).await?;
    Ok(empty_sync())
}

pub async fn unlock<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(plan): Path<String>,
    body: String,
) -> Result<Response, TerraformError> {
    let requested = terraform::decode_lock(&body)?;
    cluster.unlock_terraform_plan(&plan, &requested).await?;
    Ok(empty_sync())
}
