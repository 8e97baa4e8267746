use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Name of a cluster member (the daemon instance that owns a record).
pub type MemberName = String;

/// Sentinel meaning "keep the stored machine id" on node updates.
pub const UNSET_MACHINE_ID: i64 = -1;

/// Manifest id that resolves to the most recently applied manifest.
pub const LATEST_MANIFEST: &str = "latest";

/// Terraform lock metadata, serialized with Terraform's own field names.
///
/// Stored verbatim as the lock for a plan; only `(ID, Operation, Who)`
/// participate in ownership checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Operation", default)]
    pub operation: String,
    #[serde(rename = "Info", default)]
    pub info: String,
    #[serde(rename = "Who", default)]
    pub who: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Created", default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Path", default)]
    pub path: String,
}

impl Lock {
    /// True when `other` was issued by the same actor for the same operation.
    pub fn same_holder(&self, other: &Lock) -> bool {
        self.id == other.id && self.operation == other.operation && self.who == other.who
    }
}

/// A machine registered in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "role", default)]
    pub roles: Vec<String>,
    #[serde(rename = "machineid", default = "unset_machine_id")]
    pub machine_id: i64,
    #[serde(rename = "systemid", default)]
    pub system_id: String,
    /// Member that last wrote the record. Never sent over the wire.
    #[serde(skip)]
    pub member: MemberName,
}

fn unset_machine_id() -> i64 {
    UNSET_MACHINE_ID
}

/// An applied deployment manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "manifestid")]
    pub manifest_id: String,
    #[serde(rename = "applieddate")]
    pub applied_date: DateTime<Utc>,
    pub data: String,
}

/// Juju user registration token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JujuUser {
    pub username: String,
    pub token: String,
}

/// Coarse classification used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Locked,
    InvalidArgument,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum ClusterdError {
    #[error("{0} not found")]
    NotFound(String),
    /// Uniqueness violation, or a lock mismatch. Lock mismatches carry the
    /// currently stored lock (an empty one when none is held).
    #[error("{message}")]
    Conflict { message: String, lock: Option<Lock> },
    /// The requester already holds the lock.
    #[error("{message}")]
    Locked { message: String, lock: Lock },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClusterdError {
    pub fn already_exists(what: &str) -> Self {
        ClusterdError::Conflict {
            message: format!("this \"{what}\" entry already exists"),
            lock: None,
        }
    }

    pub fn lock_conflict(lock: Lock) -> Self {
        ClusterdError::Conflict { message: "conflict in lock ID".into(), lock: Some(lock) }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterdError::NotFound(_) => ErrorKind::NotFound,
            ClusterdError::Conflict { .. } => ErrorKind::Conflict,
            ClusterdError::Locked { .. } => ErrorKind::Locked,
            ClusterdError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ClusterdError::Storage(_) | ClusterdError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Lock attached to a Terraform conflict or locked response.
    pub fn lock(&self) -> Option<&Lock> {
        match self {
            ClusterdError::Conflict { lock, .. } => lock.as_ref(),
            ClusterdError::Locked { lock, .. } => Some(lock),
            _ => None,
        }
    }
}
