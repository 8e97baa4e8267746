use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use cld_types::ClusterdError;

use crate::codec::{decode, encode};
use crate::keys::{sequence_key, Table};
use crate::traits::Backend;
use crate::types::WriteSet;

/// Transactional front of a [`Backend`].
///
/// Transactions are fully serialized: [`Store::begin`] waits for the single
/// writer slot and the returned [`Transaction`] holds it until it commits,
/// rolls back, or is dropped. A transaction therefore sees committed state
/// plus its own staged writes, and no other transaction can interleave
/// between its reads and its commit.
pub struct Store<B> {
    backend: Arc<B>,
    writer: Arc<Mutex<()>>,
    next_txn: AtomicU64,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B) -> Self {
        Store {
            backend: Arc::new(backend),
            writer: Arc::new(Mutex::new(())),
            next_txn: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Acquire the writer slot and open a transaction.
    pub async fn begin(&self) -> Transaction<B> {
        let slot = self.writer.clone().lock_owned().await;
        let id = self.next_txn.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(txn = id, "transaction started");
        Transaction {
            backend: self.backend.clone(),
            writes: WriteSet::new(),
            id,
            finished: false,
            _slot: slot,
        }
    }
}

/// An open transaction. Commit with [`Transaction::commit`]; every other exit
/// path (explicit rollback, early return, panic unwinding) discards the
/// staged writes.
pub struct Transaction<B: Backend> {
    backend: Arc<B>,
    writes: WriteSet,
    id: u64,
    finished: bool,
    _slot: OwnedMutexGuard<()>,
}

impl<B: Backend> Transaction<B> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, ClusterdError> {
        if let Some(staged) = self.writes.get(table, key) {
            return Ok(staged.map(<[u8]>::to_vec));
        }
        self.backend.read(table, key).await
    }

    pub async fn exists(&self, table: Table, key: &str) -> Result<bool, ClusterdError> {
        Ok(self.get(table, key).await?.is_some())
    }

    /// Rows of `table` whose key starts with `prefix`, ordered by key.
    pub async fn scan_prefix(
        &self,
        table: Table,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, ClusterdError> {
        let committed = self.backend.scan(table, prefix).await?;
        Ok(self.writes.overlay(table, prefix, committed))
    }

    pub fn put(&mut self, table: Table, key: &str, value: Vec<u8>) {
        self.writes.put(table, key, value);
    }

    /// Stage a delete. Returns whether the key existed; deleting an absent
    /// key is not an error.
    pub async fn delete(&mut self, table: Table, key: &str) -> Result<bool, ClusterdError> {
        let found = self.exists(table, key).await?;
        if found {
            self.writes.delete(table, key);
        }
        Ok(found)
    }

    /// Next row id for `table`. Ids start at 1 and only grow; the counter is
    /// part of the transaction, so a rolled-back transaction does not burn ids.
    pub async fn next_row_id(&mut self, table: Table) -> Result<u64, ClusterdError> {
        let key = sequence_key(table);
        let last = match self.get(Table::Meta, &key).await? {
            Some(bytes) => decode::<u64>(&bytes)?,
            None => 0,
        };
        let next = last + 1;
        self.writes.put(Table::Meta, &key, encode(&next)?);
        Ok(next)
    }

    /// Atomically apply the staged writes and release the writer slot.
    pub async fn commit(mut self) -> Result<(), ClusterdError> {
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        let staged = writes.len();
        if !writes.is_empty() {
            self.backend.apply(writes).await?;
        }
        tracing::trace!(txn = self.id, staged, "transaction committed");
        Ok(())
    }

    /// Discard the staged writes and release the writer slot.
    pub fn rollback(mut self) {
        self.finished = true;
        tracing::trace!(txn = self.id, staged = self.writes.len(), "transaction rolled back");
    }
}

impl<B: Backend> Drop for Transaction<B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                txn = self.id,
                staged = self.writes.len(),
                "transaction dropped before commit, rolling back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mem::MemBackend;

    #[tokio::test]
    async fn staged_writes_visible_inside_transaction_only() {
        let store = Store::new(MemBackend::new());

        let mut tx = store.begin().await;
        tx.put(Table::Config, "k", b"v".to_vec());
        assert_eq!(tx.get(Table::Config, "k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.backend().read(Table::Config, "k").await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert_eq!(
            store.backend().read(Table::Config, "k").await.unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let store = Store::new(MemBackend::new());

        let mut tx = store.begin().await;
        tx.put(Table::Config, "a", b"1".to_vec());
        tx.rollback();

        {
            let mut tx = store.begin().await;
            tx.put(Table::Config, "b", b"2".to_vec());
            // dropped without commit
        }

        let tx = store.begin().await;
        assert!(tx.get(Table::Config, "a").await.unwrap().is_none());
        assert!(tx.get(Table::Config, "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = Store::new(MemBackend::new());
        let mut tx = store.begin().await;
        tx.put(Table::Config, "k", b"v".to_vec());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await;
        assert!(tx.delete(Table::Config, "k").await.unwrap());
        assert!(!tx.delete(Table::Config, "k").await.unwrap());
        assert!(!tx.delete(Table::Config, "never").await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.backend().read(Table::Config, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn row_ids_grow_and_survive_commit_only() {
        let store = Store::new(MemBackend::new());

        let mut tx = store.begin().await;
        assert_eq!(tx.next_row_id(Table::Manifest).await.unwrap(), 1);
        assert_eq!(tx.next_row_id(Table::Manifest).await.unwrap(), 2);
        assert_eq!(tx.next_row_id(Table::Nodes).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await;
        assert_eq!(tx.next_row_id(Table::Manifest).await.unwrap(), 3);
        tx.rollback();

        let mut tx = store.begin().await;
        assert_eq!(tx.next_row_id(Table::Manifest).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn transactions_are_serialized() {
        let store = Arc::new(Store::new(MemBackend::new()));

        let tx = store.begin().await;
        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await;
                tx.put(Table::Config, "second", Vec::new());
                tx.commit().await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        drop(tx);

        contender.await.unwrap();
        assert!(store.backend().read(Table::Config, "second").await.unwrap().is_some());
    }
}
