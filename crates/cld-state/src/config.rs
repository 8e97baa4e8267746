use cld_storage::{Backend, Table, Transaction};
use cld_types::ClusterdError;

/// Entity name reported when a config key is missing. Terraform state and
/// locks live in the config table and report it too.
pub const CONFIG_ITEM: &str = "ConfigItem";

fn decode_value(key: &str, bytes: Vec<u8>) -> Result<String, ClusterdError> {
    String::from_utf8(bytes)
        .map_err(|e| ClusterdError::Storage(format!("config item \"{key}\" is not UTF-8: {e}")))
}

/// Value of `key`, or `None` if absent.
pub async fn try_get<B: Backend>(
    tx: &Transaction<B>,
    key: &str,
) -> Result<Option<String>, ClusterdError> {
    match tx.get(Table::Config, key).await? {
        Some(bytes) => decode_value(key, bytes).map(Some),
        None => Ok(None),
    }
}

pub async fn get<B: Backend>(tx: &Transaction<B>, key: &str) -> Result<String, ClusterdError> {
    try_get(tx, key)
        .await?
        .ok_or_else(|| ClusterdError::NotFound(CONFIG_ITEM.into()))
}

/// Keys ordered by key. `None` lists every key.
pub async fn list_keys<B: Backend>(
    tx: &Transaction<B>,
    prefix: Option<&str>,
) -> Result<Vec<String>, ClusterdError> {
    let rows = tx.scan_prefix(Table::Config, prefix.unwrap_or("")).await?;
    Ok(rows.into_iter().map(|(key, _)| key).collect())
}

/// Insert a new entry; fails with Conflict if `key` exists.
pub async fn create<B: Backend>(
    tx: &mut Transaction<B>,
    key: &str,
    value: &str,
) -> Result<(), ClusterdError> {
    if tx.exists(Table::Config, key).await? {
        return Err(ClusterdError::already_exists("config"));
    }
    tx.put(Table::Config, key, value.as_bytes().to_vec());
    Ok(())
}

/// Update `key` if present, else create it. Last writer wins.
pub fn upsert<B: Backend>(tx: &mut Transaction<B>, key: &str, value: &str) {
    tx.put(Table::Config, key, value.as_bytes().to_vec());
}

/// Remove `key`. Removing an absent key is a no-op.
pub async fn delete<B: Backend>(tx: &mut Transaction<B>, key: &str) -> Result<(), ClusterdError> {
    tx.delete(Table::Config, key).await?;
    Ok(())
}
