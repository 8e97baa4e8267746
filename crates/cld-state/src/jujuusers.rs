use serde::{Deserialize, Serialize};

use cld_storage::codec::{decode, encode};
use cld_storage::{Backend, Table, Transaction};
use cld_types::{ClusterdError, JujuUser};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JujuUserRow {
    token: String,
}

pub async fn list<B: Backend>(tx: &Transaction<B>) -> Result<Vec<JujuUser>, ClusterdError> {
    tx.scan_prefix(Table::JujuUser, "")
        .await?
        .into_iter()
        .map(|(username, bytes)| -> Result<JujuUser, ClusterdError> {
            let row: JujuUserRow = decode(&bytes)?;
            Ok(JujuUser { username, token: row.token })
        })
        .collect()
}

pub async fn get<B: Backend>(
    tx: &Transaction<B>,
    username: &str,
) -> Result<JujuUser, ClusterdError> {
    match tx.get(Table::JujuUser, username).await? {
        Some(bytes) => {
            let row: JujuUserRow = decode(&bytes)?;
            Ok(JujuUser { username: username.to_string(), token: row.token })
        }
        None => Err(ClusterdError::NotFound("JujuUser".into())),
    }
}

pub async fn create<B: Backend>(
    tx: &mut Transaction<B>,
    username: &str,
    token: &str,
) -> Result<(), ClusterdError> {
    if username.is_empty() {
        return Err(ClusterdError::InvalidArgument("username must not be empty".into()));
    }
    if tx.exists(Table::JujuUser, username).await? {
        return Err(ClusterdError::already_exists("jujuuser"));
    }
    tx.put(Table::JujuUser, username, encode(&JujuUserRow { token: token.to_string() })?);
    Ok(())
}

pub async fn delete<B: Backend>(
    tx: &mut Transaction<B>,
    username: &str,
) -> Result<(), ClusterdError> {
    if !tx.delete(Table::JujuUser, username).await? {
        return Err(ClusterdError::NotFound("JujuUser".into()));
    }
    Ok(())
}
