use std::future::Future;

use cld_types::ClusterdError;

use crate::keys::Table;
use crate::types::WriteSet;

/// Committed-state access for a storage engine.
///
/// Methods use RPITIT (`-> impl Future + Send`) so generic callers can await
/// across thread boundaries. Isolation and atomicity are provided by
/// [`crate::Store`] on top of these three primitives: a backend only has to
/// serve committed reads and apply a whole [`WriteSet`] atomically.
pub trait Backend: Send + Sync + 'static {
    /// Read the committed value of `key`, or `None` if absent.
    fn read(&self, table: Table, key: &str)
        -> impl Future<Output = Result<Option<Vec<u8>>, ClusterdError>> + Send;

    /// All committed rows of `table` whose key starts with `prefix`,
    /// ordered by key. An empty prefix returns the whole table.
    fn scan(&self, table: Table, prefix: &str)
        -> impl Future<Output = Result<Vec<(String, Vec<u8>)>, ClusterdError>> + Send;

    /// Apply every write in `writes` as one atomic unit.
    fn apply(&self, writes: WriteSet)
        -> impl Future<Output = Result<(), ClusterdError>> + Send;
}
