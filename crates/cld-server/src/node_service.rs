use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Response;

use cld_state::Cluster;
use cld_storage::Backend;
use cld_types::Node;

use crate::convert::{empty_sync, parse_json, sync, ApiError};

/// `?role=a&role=b` keeps nodes that carry both roles.
pub async fn list<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let roles: Vec<String> = params
        .into_iter()
        .filter(|(name, _)| name == "role")
        .map(|(_, role)| role)
        .collect();
    let nodes = cluster.list_nodes(&roles).await?;
    Ok(sync(nodes))
}

pub async fn get<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let node = cluster.get_node(&name).await?;
    Ok(sync(node))
}

pub async fn create<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: Node = parse_json(&body)?;
    cluster.add_node(&req.name, &req.roles, req.machine_id, &req.system_id).await?;
    Ok(empty_sync())
}

/// Fields left out of the body keep their stored value.
pub async fn update<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: Node = parse_json(&body)?;
    cluster.update_node(&name, &req.roles, req.machine_id, &req.system_id).await?;
    Ok(empty_sync())
}

pub async fn delete<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    cluster.delete_node(&name).await?;
    Ok(empty_sync())
}
