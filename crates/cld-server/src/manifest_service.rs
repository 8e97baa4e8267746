use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;

use cld_state::Cluster;
use cld_storage::Backend;

use crate::convert::{empty_sync, parse_json, sync, ApiError};

/// Body of `POST /manifests`. The applied date is assigned by the server.
#[derive(Debug, Deserialize)]
struct NewManifest {
    #[serde(rename = "manifestid")]
    manifest_id: String,
    #[serde(default)]
    data: String,
}

pub async fn list<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
) -> Result<Response, ApiError> {
    Ok(sync(cluster.list_manifests().await?))
}

pub async fn get<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(manifest_id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(sync(cluster.get_manifest(&manifest_id).await?))
}

pub async fn create<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: NewManifest = parse_json(&body)?;
    cluster.add_manifest(&req.manifest_id, &req.data).await?;
    Ok(empty_sync())
}

pub async fn delete<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(manifest_id): Path<String>,
) -> Result<Response, ApiError> {
    cluster.delete_manifest(&manifest_id).await?;
    Ok(empty_sync())
}
