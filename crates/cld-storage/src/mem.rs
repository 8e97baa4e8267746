use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use cld_types::ClusterdError;

use crate::keys::Table;
use crate::traits::Backend;
use crate::types::WriteSet;

type Rows = BTreeMap<String, Vec<u8>>;

/// In-memory `Backend` backed by one `BTreeMap` per table.
///
/// Intended for tests and throwaway nodes; not persisted across restarts.
pub struct MemBackend {
    inner: Arc<RwLock<HashMap<Table, Rows>>>,
}

impl MemBackend {
    pub fn new() -> Self {
        MemBackend {
            inner: Arc::new(RwLock::new(
                Table::ALL.iter().map(|t| (*t, Rows::new())).collect(),
            )),
        }
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemBackend {
    async fn read(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, ClusterdError> {
        let g = self.inner.read().await;
        Ok(g.get(&table).and_then(|rows| rows.get(key)).cloned())
    }

    async fn scan(
        &self,
        table: Table,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, ClusterdError> {
        let g = self.inner.read().await;
        let Some(rows) = g.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn apply(&self, writes: WriteSet) -> Result<(), ClusterdError> {
        let mut g = self.inner.write().await;
        for (table, key, value) in writes.into_writes() {
            let rows = g.entry(table).or_default();
            match value {
                Some(v) => {
                    rows.insert(key, v);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }
}
