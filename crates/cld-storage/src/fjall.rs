use std::path::Path;
use std::sync::Arc;

use cld_types::ClusterdError;

use crate::keys::Table;
use crate::traits::Backend;
use crate::types::WriteSet;

fn fjall_err(e: fjall::Error) -> ClusterdError {
    ClusterdError::Storage(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> ClusterdError {
    ClusterdError::Storage(format!("storage task failed: {e}"))
}

// ---------------------------------------------------------------------------
// FjallStore: shared handle wrapping one keyspace per table
// ---------------------------------------------------------------------------

/// Shared storage handle.
///
/// All keyspaces live in a single fjall `Database` so that a transaction's
/// write batch spanning several tables commits atomically.
pub struct FjallStore {
    /// The underlying fjall database.
    pub db: fjall::Database,
    /// Configuration entries, Terraform state and locks: `key_utf8` → raw value
    pub config: fjall::Keyspace,
    /// Node registry: `name_utf8` → bincode(NodeRow)
    pub nodes: fjall::Keyspace,
    /// Manifest log: `manifest_id_utf8` → bincode(ManifestRow)
    pub manifest: fjall::Keyspace,
    /// Juju users: `username_utf8` → bincode(JujuUserRow)
    pub jujuuser: fjall::Keyspace,
    /// Row-id sequences: `seq/<table>` → bincode(u64)
    pub meta: fjall::Keyspace,
}

impl FjallStore {
    /// Open (or create) a `FjallStore` at `path`.
    pub fn open(path: &Path) -> Result<Arc<Self>, ClusterdError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let open = |table: Table| {
            db.keyspace(table.name(), fjall::KeyspaceCreateOptions::default)
                .map_err(fjall_err)
        };
        let config = open(Table::Config)?;
        let nodes = open(Table::Nodes)?;
        let manifest = open(Table::Manifest)?;
        let jujuuser = open(Table::JujuUser)?;
        let meta = open(Table::Meta)?;
        Ok(Arc::new(FjallStore { db, config, nodes, manifest, jujuuser, meta }))
    }

    pub fn keyspace(&self, table: Table) -> &fjall::Keyspace {
        match table {
            Table::Config => &self.config,
            Table::Nodes => &self.nodes,
            Table::Manifest => &self.manifest,
            Table::JujuUser => &self.jujuuser,
            Table::Meta => &self.meta,
        }
    }
}

// ---------------------------------------------------------------------------
// FjallBackend
// ---------------------------------------------------------------------------

/// `Backend` backed by fjall.
///
/// All blocking I/O is wrapped in `tokio::task::spawn_blocking`.
pub struct FjallBackend(pub Arc<FjallStore>);

impl FjallBackend {
    pub fn open(path: &Path) -> Result<Self, ClusterdError> {
        Ok(FjallBackend(FjallStore::open(path)?))
    }
}

impl Backend for FjallBackend {
    async fn read(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, ClusterdError> {
        let store = self.0.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, ClusterdError> {
            Ok(store
                .keyspace(table)
                .get(key.as_bytes())
                .map_err(fjall_err)?
                .map(|b| b.to_vec()))
        })
        .await
        .map_err(join_err)?
    }

    async fn scan(
        &self,
        table: Table,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, ClusterdError> {
        let store = self.0.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<(String, Vec<u8>)>, ClusterdError> {
            store
                .keyspace(table)
                .prefix(prefix.as_bytes())
                .map(|g| {
                    g.into_inner().map_err(fjall_err).and_then(|(k, v)| {
                        let key = String::from_utf8(k.to_vec()).map_err(|e| {
                            ClusterdError::Storage(format!(
                                "non UTF-8 key in {}: {e}",
                                table.name()
                            ))
                        })?;
                        Ok((key, v.to_vec()))
                    })
                })
                .collect()
        })
        .await
        .map_err(join_err)?
    }

    async fn apply(&self, writes: WriteSet) -> Result<(), ClusterdError> {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ClusterdError> {
            let mut batch = store.db.batch();
            for (table, key, value) in writes.into_writes() {
                let keyspace = store.keyspace(table);
                match value {
                    Some(v) => {
                        batch.insert(keyspace, key.into_bytes(), v);
                    }
                    None => {
                        batch.remove(keyspace, key.into_bytes());
                    }
                }
            }
            batch.commit().map_err(fjall_err)
        })
        .await
        .map_err(join_err)?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
