use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cld_types::{ClusterdError, ErrorKind};

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Envelope<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    status_code: u16,
    operation: &'static str,
    error_code: u16,
    error: String,
    metadata: T,
}

/// 200 with `metadata` wrapped in a sync envelope.
pub fn sync<T: Serialize>(metadata: T) -> Response {
    Json(Envelope {
        kind: "sync",
        status: "Success",
        status_code: StatusCode::OK.as_u16(),
        operation: "",
        error_code: 0,
        error: String::new(),
        metadata,
    })
    .into_response()
}

pub fn empty_sync() -> Response {
    sync(serde_json::Map::new())
}

/// 200 with a JSON document that is already serialized.
pub fn raw_json(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Locked => StatusCode::LOCKED,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_failure(status: StatusCode, err: &ClusterdError) {
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::debug!(%status, error = %err, "request rejected");
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error answered with an error envelope.
#[derive(Debug)]
pub struct ApiError(pub ClusterdError);

impl From<ClusterdError> for ApiError {
    fn from(err: ClusterdError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(self.0.kind());
        log_failure(status, &self.0);
        let body = Envelope {
            kind: "error",
            status: "",
            status_code: 0,
            operation: "",
            error_code: status.as_u16(),
            error: self.0.to_string(),
            metadata: serde_json::Value::Null,
        };
        (status, Json(body)).into_response()
    }
}

/// Error for the Terraform backend routes. Lock conflicts answer with the
/// stored lock as the whole body, which is what Terraform prints to the user
/// as the current lock holder.
#[derive(Debug)]
pub struct TerraformError(pub ClusterdError);

impl From<ClusterdError> for TerraformError {
    fn from(err: ClusterdError) -> Self {
        TerraformError(err)
    }
}

impl IntoResponse for TerraformError {
    fn into_response(self) -> Response {
        let status = status_of(self.0.kind());
        match self.0.lock() {
            Some(lock) => {
                log_failure(status, &self.0);
                (status, Json(lock.clone())).into_response()
            }
            None => ApiError(self.0).into_response(),
        }
    }
}

/// Decode a JSON request body. Malformed input is a 400.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClusterdError> {
    serde_json::from_slice(body)
        .map_err(|e| ClusterdError::InvalidArgument(format!("invalid request body: {e}")))
}
