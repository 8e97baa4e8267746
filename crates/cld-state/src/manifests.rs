use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cld_storage::codec::{decode, encode};
use cld_storage::{Backend, Table, Transaction};
use cld_types::{ClusterdError, Manifest, LATEST_MANIFEST};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestRow {
    /// Insertion order, used to break applied-time ties.
    row_id: u64,
    applied_at_ns: i64,
    data: String,
}

impl ManifestRow {
    fn into_manifest(self, manifest_id: String) -> Manifest {
        Manifest {
            manifest_id,
            applied_date: DateTime::from_timestamp_nanos(self.applied_at_ns),
            data: self.data,
        }
    }
}

fn not_found(manifest_id: &str) -> ClusterdError {
    tracing::debug!(manifest_id, "manifest lookup missed");
    ClusterdError::NotFound("ManifestItem".into())
}

/// All manifests ordered by id.
pub async fn list<B: Backend>(tx: &Transaction<B>) -> Result<Vec<Manifest>, ClusterdError> {
    tx.scan_prefix(Table::Manifest, "")
        .await?
        .into_iter()
        .map(|(id, bytes)| -> Result<Manifest, ClusterdError> {
            Ok(decode::<ManifestRow>(&bytes)?.into_manifest(id))
        })
        .collect()
}

/// Look up a manifest by id, or the latest one for [`LATEST_MANIFEST`]:
/// greatest applied time, and among equal applied times the most recently
/// inserted row.
pub async fn get<B: Backend>(
    tx: &Transaction<B>,
    manifest_id: &str,
) -> Result<Manifest, ClusterdError> {
    if manifest_id == LATEST_MANIFEST {
        return latest(tx).await;
    }
    match tx.get(Table::Manifest, manifest_id).await? {
        Some(bytes) => Ok(decode::<ManifestRow>(&bytes)?.into_manifest(manifest_id.to_string())),
        None => Err(not_found(manifest_id)),
    }
}

async fn latest<B: Backend>(tx: &Transaction<B>) -> Result<Manifest, ClusterdError> {
    let mut best: Option<(String, ManifestRow)> = None;
    for (id, bytes) in tx.scan_prefix(Table::Manifest, "").await? {
        let row: ManifestRow = decode(&bytes)?;
        let newer = match &best {
            None => true,
            Some((_, cur)) => (row.applied_at_ns, row.row_id) > (cur.applied_at_ns, cur.row_id),
        };
        if newer {
            best = Some((id, row));
        }
    }
    best.map(|(id, row)| row.into_manifest(id))
        .ok_or_else(|| not_found(LATEST_MANIFEST))
}

/// Record a manifest applied at `applied_at`. Fails with Conflict if the id
/// is taken; the existing record is left untouched.
pub async fn create<B: Backend>(
    tx: &mut Transaction<B>,
    manifest_id: &str,
    data: &str,
    applied_at: DateTime<Utc>,
) -> Result<(), ClusterdError> {
    if manifest_id.is_empty() {
        return Err(ClusterdError::InvalidArgument("manifest id must not be empty".into()));
    }
    if manifest_id == LATEST_MANIFEST {
        return Err(ClusterdError::InvalidArgument(format!(
            "\"{LATEST_MANIFEST}\" is reserved and cannot be used as a manifest id"
        )));
    }
    if tx.exists(Table::Manifest, manifest_id).await? {
        return Err(ClusterdError::already_exists("manifest"));
    }
    let applied_at_ns = applied_at.timestamp_nanos_opt().ok_or_else(|| {
        ClusterdError::InvalidArgument(format!("applied time {applied_at} is out of range"))
    })?;
    let row = ManifestRow {
        row_id: tx.next_row_id(Table::Manifest).await?,
        applied_at_ns,
        data: data.to_string(),
    };
    tx.put(Table::Manifest, manifest_id, encode(&row)?);
    Ok(())
}

pub async fn delete<B: Backend>(
    tx: &mut Transaction<B>,
    manifest_id: &str,
) -> Result<(), ClusterdError> {
    if !tx.delete(Table::Manifest, manifest_id).await? {
        return Err(not_found(manifest_id));
    }
    Ok(())
}
