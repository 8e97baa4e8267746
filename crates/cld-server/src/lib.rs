mod config_service;
mod convert;
mod jujuuser_service;
mod manifest_service;
mod node_service;
mod terraform_service;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, put};
use axum::Router;
use serde_json::json;
use tower_http::trace::TraceLayer;

use cld_state::Cluster;
use cld_storage::Backend;

/// Every route is served under this prefix.
pub const API_ROOT: &str = "/1.0";

/// Build the HTTP API for `cluster`.
pub fn router<B: Backend>(cluster: Arc<Cluster<B>>) -> Router {
    let api = Router::new()
        .route("/health", get(health::<B>))
        .route("/config", get(config_service::list::<B>))
        .route(
            "/config/{key}",
            get(config_service::get::<B>)
                .put(config_service::put::<B>)
                .delete(config_service::delete::<B>),
        )
        .route(
            "/nodes",
            get(node_service::list::<B>).post(node_service::create::<B>),
        )
        .route(
            "/nodes/{name}",
            get(node_service::get::<B>)
                .put(node_service::update::<B>)
                .delete(node_service::delete::<B>),
        )
        .route(
            "/manifests",
            get(manifest_service::list::<B>).post(manifest_service::create::<B>),
        )
        .route(
            "/manifests/{manifestid}",
            get(manifest_service::get::<B>).delete(manifest_service::delete::<B>),
        )
        .route(
            "/jujuusers",
            get(jujuuser_service::list::<B>).post(jujuuser_service::create::<B>),
        )
        .route(
            "/jujuusers/{name}",
            get(jujuuser_service::get::<B>).delete(jujuuser_service::delete::<B>),
        )
        .route("/terraformstate", get(terraform_service::list_states::<B>))
        .route(
            "/terraformstate/{name}",
            get(terraform_service::get_state::<B>)
                .put(terraform_service::put_state::<B>)
                .delete(terraform_service::delete_state::<B>),
        )
        .route("/terraformlock", get(terraform_service::list_locks::<B>))
        .route(
            "/terraformlock/{name}",
            get(terraform_service::get_lock::<B>).put(terraform_service::lock::<B>),
        )
        .route("/terraformunlock/{name}", put(terraform_service::unlock::<B>));

    Router::new()
        .nest(API_ROOT, api)
        .layer(TraceLayer::new_for_http())
        .with_state(cluster)
}

async fn health<B: Backend>(State(cluster): State<Arc<Cluster<B>>>) -> Response {
    convert::sync(json!({ "member": cluster.member() }))
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve<B: Backend>(
    addr: SocketAddr,
    cluster: Arc<Cluster<B>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, member = cluster.member(), "HTTP API listening");
    axum::serve(listener, router(cluster))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Into::into)
}
