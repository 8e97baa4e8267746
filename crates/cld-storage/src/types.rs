use std::collections::BTreeMap;

use crate::keys::Table;

/// Writes staged by a transaction, applied atomically on commit.
///
/// `None` marks a delete. Later writes to the same key replace earlier ones,
/// so the set always holds the final intended value per key.
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    writes: BTreeMap<(Table, String), Option<Vec<u8>>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: &str, value: Vec<u8>) {
        self.writes.insert((table, key.to_string()), Some(value));
    }

    pub fn delete(&mut self, table: Table, key: &str) {
        self.writes.insert((table, key.to_string()), None);
    }

    /// `Some(None)` means the key was deleted inside the transaction;
    /// `None` means the transaction never touched it.
    pub fn get(&self, table: Table, key: &str) -> Option<Option<&[u8]>> {
        self.writes
            .get(&(table, key.to_string()))
            .map(|v| v.as_deref())
    }

    /// Overlay staged writes for `table` onto committed `(key, value)` rows
    /// matching `prefix`. The result stays ordered by key.
    pub fn overlay(
        &self,
        table: Table,
        prefix: &str,
        committed: Vec<(String, Vec<u8>)>,
    ) -> Vec<(String, Vec<u8>)> {
        let mut merged: BTreeMap<String, Vec<u8>> = committed.into_iter().collect();
        for ((t, key), value) in self.writes.range((table, prefix.to_string())..) {
            if *t != table || !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> impl Iterator<Item = (Table, String, Option<Vec<u8>>)> {
        self.writes.into_iter().map(|((table, key), value)| (table, key, value))
    }
}
