use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;

use cld_state::Cluster;
use cld_storage::Backend;
use cld_types::JujuUser;

use crate::convert::{empty_sync, parse_json, sync, ApiError};

pub async fn list<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
) -> Result<Response, ApiError> {
    Ok(sync(cluster.list_juju_users().await?))
}

pub async fn get<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    Ok(sync(cluster.get_juju_user(&username).await?))
}

pub async fn create<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: JujuUser = parse_json(&body)?;
    cluster.add_juju_user(&req.username, &req.token).await?;
    Ok(empty_sync())
}

pub async fn delete<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(username): Path<String>,
) -> Result<Response, ApiError> {
    cluster.delete_juju_user(&username).await?;
    Ok(empty_sync())
}
