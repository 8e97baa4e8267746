use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use cld_state::Cluster;
use cld_storage::Backend;

use crate::convert::{empty_sync, sync, ApiError};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    prefix: Option<String>,
}

pub async fn list<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let keys = cluster.list_config_keys(query.prefix.as_deref()).await?;
    Ok(sync(keys))
}

pub async fn get<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let value = cluster.get_config(&key).await?;
    Ok(sync(value))
}

/// The request body is stored verbatim as the value.
pub async fn put<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(key): Path<String>,
    body: String,
) -> Result<Response, ApiError> {
    cluster.put_config(&key, &body).await?;
    Ok(empty_sync())
}

pub async fn delete<B: Backend>(
    State(cluster): State<Arc<Cluster<B>>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    cluster.delete_config(&key).await?;
    Ok(empty_sync())
}
