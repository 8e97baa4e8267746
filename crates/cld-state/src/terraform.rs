use cld_storage::{Backend, Transaction};
use cld_types::{ClusterdError, Lock};

use crate::config::{self, CONFIG_ITEM};

/// Each plan has one state blob and at most one lock, both kept in the
/// config table under these prefixes. Every read-compare-write below runs
/// against a single [`Transaction`], so two lockers can never both observe
/// an unlocked plan.
pub const STATE_PREFIX: &str = "tfstate-";
pub const LOCK_PREFIX: &str = "tflock-";

fn state_key(plan: &str) -> String {
    format!("{STATE_PREFIX}{plan}")
}

fn lock_key(plan: &str) -> String {
    format!("{LOCK_PREFIX}{plan}")
}

/// Parse a lock sent by a Terraform client.
pub fn decode_lock(raw: &str) -> Result<Lock, ClusterdError> {
    serde_json::from_str(raw)
        .map_err(|e| ClusterdError::InvalidArgument(format!("invalid lock body: {e}")))
}

fn encode_lock(lock: &Lock) -> Result<String, ClusterdError> {
    serde_json::to_string(lock)
        .map_err(|e| ClusterdError::Internal(format!("failed to encode lock: {e}")))
}

async fn stored_lock<B: Backend>(
    tx: &Transaction<B>,
    plan: &str,
) -> Result<Option<Lock>, ClusterdError> {
    match config::try_get(tx, &lock_key(plan)).await? {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
            ClusterdError::Internal(format!("stored lock for plan \"{plan}\" is corrupt: {e}"))
        }),
        None => Ok(None),
    }
}

async fn plans_with_prefix<B: Backend>(
    tx: &Transaction<B>,
    prefix: &str,
) -> Result<Vec<String>, ClusterdError> {
    Ok(config::list_keys(tx, Some(prefix))
        .await?
        .into_iter()
        .map(|key| key[prefix.len()..].to_string())
        .collect())
}

/// Names of plans that have a stored state.
pub async fn list_states<B: Backend>(tx: &Transaction<B>) -> Result<Vec<String>, ClusterdError> {
    plans_with_prefix(tx, STATE_PREFIX).await
}

pub async fn get_state<B: Backend>(
    tx: &Transaction<B>,
    plan: &str,
) -> Result<String, ClusterdError> {
    config::try_get(tx, &state_key(plan))
        .await?
        .ok_or_else(|| ClusterdError::NotFound(CONFIG_ITEM.into()))
}

/// Replace the state of `plan`. The caller must hold the plan's lock:
/// when no lock is stored, or the stored ID differs from `lock_id`, this
/// returns Conflict carrying the stored lock (an empty one if none) and the
/// state is left unchanged.
pub async fn put_state<B: Backend>(
    tx: &mut Transaction<B>,
    plan: &str,
    lock_id: &str,
    state: &str,
) -> Result<(), ClusterdError> {
    let current = stored_lock(tx, plan).await?;
    match current {
        Some(lock) if lock.id == lock_id => {
            config::upsert(tx, &state_key(plan), state);
            tracing::debug!(plan, lock_id, bytes = state.len(), "terraform state updated");
            Ok(())
        }
        other => {
            let lock = other.unwrap_or_default();
            tracing::warn!(plan, lock_id, held_by = %lock.id, "terraform state write refused");
            Err(ClusterdError::lock_conflict(lock))
        }
    }
}

/// Remove the state of `plan` without consulting the lock.
pub async fn delete_state<B: Backend>(
    tx: &mut Transaction<B>,
    plan: &str,
) -> Result<(), ClusterdError> {
    let key = state_key(plan);
    if config::try_get(tx, &key).await?.is_none() {
        return Err(ClusterdError::NotFound(CONFIG_ITEM.into()));
    }
    config::delete(tx, &key).await?;
    tracing::info!(plan, "terraform state deleted");
    Ok(())
}

/// Names of plans that are currently locked.
pub async fn list_locks<B: Backend>(tx: &Transaction<B>) -> Result<Vec<String>, ClusterdError> {
    plans_with_prefix(tx, LOCK_PREFIX).await
}

pub async fn get_lock<B: Backend>(tx: &Transaction<B>, plan: &str) -> Result<Lock, ClusterdError> {
    stored_lock(tx, plan)
        .await?
        .ok_or_else(|| ClusterdError::NotFound(CONFIG_ITEM.into()))
}

/// Acquire the lock on `plan`.
///
/// * unlocked: `requested` is stored as is.
/// * locked by the same `(ID, Operation, Who)`: [`ClusterdError::Locked`].
/// * locked by anyone else: [`ClusterdError::Conflict`].
///
/// Both refusals carry the stored lock.
pub async fn lock<B: Backend>(
    tx: &mut Transaction<B>,
    plan: &str,
    requested: &Lock,
) -> Result<(), ClusterdError> {
    match stored_lock(tx, plan).await? {
        None => {
            config::upsert(tx, &lock_key(plan), &encode_lock(requested)?);
            tracing::info!(
                plan,
                lock_id = %requested.id,
                who = %requested.who,
                operation = %requested.operation,
                "terraform lock acquired"
            );
            Ok(())
        }
        Some(held) if held.same_holder(requested) => {
            tracing::debug!(plan, lock_id = %held.id, "terraform lock already held by requester");
            Err(ClusterdError::Locked { message: "already locked with same ID".into(), lock: held })
        }
        Some(held) => {
            tracing::info!(
                plan,
                lock_id = %requested.id,
                held_by = %held.id,
                who = %held.who,
                "terraform lock refused"
            );
            Err(ClusterdError::lock_conflict(held))
        }
    }
}

/// Release the lock on `plan`.
///
/// Unlocking a plan that holds no lock succeeds whatever the request. A
/// lock held under a different `(ID, Operation, Who)` is not released and
/// yields Conflict with the stored lock.
pub async fn unlock<B: Backend>(
    tx: &mut Transaction<B>,
    plan: &str,
    requested: &Lock,
) -> Result<(), ClusterdError> {
    match stored_lock(tx, plan).await? {
        None => {
            tracing::debug!(plan, lock_id = %requested.id, "terraform unlock of unlocked plan");
            Ok(())
        }
        Some(held) if held.same_holder(requested) => {
            config::delete(tx, &lock_key(plan)).await?;
            tracing::info!(plan, lock_id = %held.id, "terraform lock released");
            Ok(())
        }
        Some(held) => {
            tracing::info!(
                plan,
                lock_id = %requested.id,
                held_by = %held.id,
                "terraform unlock refused"
            );
            Err(ClusterdError::lock_conflict(held))
        }
    }
}
