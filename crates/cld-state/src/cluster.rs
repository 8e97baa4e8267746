use chrono::Utc;

use cld_storage::{Backend, Store, Transaction};
use cld_types::{ClusterdError, JujuUser, Lock, Manifest, MemberName, Node};

use crate::{config, jujuusers, manifests, nodes, terraform};

// ---------------------------------------------------------------------------
// Cluster: one transaction per public operation
// ---------------------------------------------------------------------------

/// Entry point used by the API layer.
///
/// Every method opens a transaction, runs one component function against it,
/// and commits on `Ok` or rolls back on `Err`. Writes made by a failed
/// operation are never visible.
pub struct Cluster<B: Backend> {
    store: Store<B>,
    member: MemberName,
}

async fn finish<B: Backend, T>(
    tx: Transaction<B>,
    result: Result<T, ClusterdError>,
) -> Result<T, ClusterdError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback();
            Err(err)
        }
    }
}

impl<B: Backend> Cluster<B> {
    /// `member` is the local member name, recorded as owner on node writes.
    pub fn new(backend: B, member: impl Into<MemberName>) -> Self {
        Cluster { store: Store::new(backend), member: member.into() }
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // config
    // -----------------------------------------------------------------------

    pub async fn get_config(&self, key: &str) -> Result<String, ClusterdError> {
        let tx = self.store.begin().await;
        let result = config::get(&tx, key).await;
        finish(tx, result).await
    }

    pub async fn list_config_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, ClusterdError> {
        let tx = self.store.begin().await;
        let result = config::list_keys(&tx, prefix).await;
        finish(tx, result).await
    }

    pub async fn put_config(&self, key: &str, value: &str) -> Result<(), ClusterdError> {
        if key.is_empty() {
            return Err(ClusterdError::InvalidArgument("config key must not be empty".into()));
        }
        let mut tx = self.store.begin().await;
        config::upsert(&mut tx, key, value);
        tracing::debug!(key, "config item written");
        finish(tx, Ok(())).await
    }

    /// Unlike [`config::delete`], an absent key is reported as NotFound.
    pub async fn delete_config(&self, key: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = match config::get(&tx, key).await {
            Ok(_) => config::delete(&mut tx, key).await,
            Err(err) => Err(err),
        };
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // nodes
    // -----------------------------------------------------------------------

    pub async fn list_nodes(&self, roles: &[String]) -> Result<Vec<Node>, ClusterdError> {
        let tx = self.store.begin().await;
        let result = nodes::list(&tx, roles).await;
        finish(tx, result).await
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, ClusterdError> {
        let tx = self.store.begin().await;
        let result = nodes::get(&tx, name).await;
        finish(tx, result).await
    }

    pub async fn add_node(
        &self,
        name: &str,
        roles: &[String],
        machine_id: i64,
        system_id: &str,
    ) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = nodes::create(&mut tx, &self.member, name, roles, machine_id, system_id).await;
        if result.is_ok() {
            tracing::info!(node = name, member = %self.member, ?roles, "node registered");
        }
        finish(tx, result).await
    }

    pub async fn update_node(
        &self,
        name: &str,
        roles: &[String],
        machine_id: i64,
        system_id: &str,
    ) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = nodes::update(&mut tx, &self.member, name, roles, machine_id, system_id).await;
        finish(tx, result).await
    }

    pub async fn delete_node(&self, name: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = nodes::delete(&mut tx, name).await;
        if result.is_ok() {
            tracing::info!(node = name, "node removed");
        }
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // manifests
    // -----------------------------------------------------------------------

    pub async fn list_manifests(&self) -> Result<Vec<Manifest>, ClusterdError> {
        let tx = self.store.begin().await;
        let result = manifests::list(&tx).await;
        finish(tx, result).await
    }

    /// `manifest_id` may be [`cld_types::LATEST_MANIFEST`].
    pub async fn get_manifest(&self, manifest_id: &str) -> Result<Manifest, ClusterdError> {
        let tx = self.store.begin().await;
        let result = manifests::get(&tx, manifest_id).await;
        finish(tx, result).await
    }

    /// Record a manifest applied now.
    pub async fn add_manifest(&self, manifest_id: &str, data: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = manifests::create(&mut tx, manifest_id, data, Utc::now()).await;
        if result.is_ok() {
            tracing::info!(manifest_id, bytes = data.len(), "manifest recorded");
        }
        finish(tx, result).await
    }

    pub async fn delete_manifest(&self, manifest_id: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = manifests::delete(&mut tx, manifest_id).await;
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // juju users
    // -----------------------------------------------------------------------

    pub async fn list_juju_users(&self) -> Result<Vec<JujuUser>, ClusterdError> {
        let tx = self.store.begin().await;
        let result = jujuusers::list(&tx).await;
        finish(tx, result).await
    }

    pub async fn get_juju_user(&self, username: &str) -> Result<JujuUser, ClusterdError> {
        let tx = self.store.begin().await;
        let result = jujuusers::get(&tx, username).await;
        finish(tx, result).await
    }

    pub async fn add_juju_user(&self, username: &str, token: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = jujuusers::create(&mut tx, username, token).await;
        if result.is_ok() {
            tracing::info!(username, "juju user added");
        }
        finish(tx, result).await
    }

    pub async fn delete_juju_user(&self, username: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = jujuusers::delete(&mut tx, username).await;
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // terraform
    // -----------------------------------------------------------------------

    pub async fn list_terraform_states(&self) -> Result<Vec<String>, ClusterdError> {
        let tx = self.store.begin().await;
        let result = terraform::list_states(&tx).await;
        finish(tx, result).await
    }

    pub async fn get_terraform_state(&self, plan: &str) -> Result<String, ClusterdError> {
        let tx = self.store.begin().await;
        let result = terraform::get_state(&tx, plan).await;
        finish(tx, result).await
    }

    pub async fn put_terraform_state(
        &self,
        plan: &str,
        lock_id: &str,
        state: &str,
    ) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = terraform::put_state(&mut tx, plan, lock_id, state).await;
        finish(tx, result).await
    }

    pub async fn delete_terraform_state(&self, plan: &str) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = terraform::delete_state(&mut tx, plan).await;
        finish(tx, result).await
    }

    pub async fn list_terraform_locks(&self) -> Result<Vec<String>, ClusterdError> {
        let tx = self.store.begin().await;
        let result = terraform::list_locks(&tx).await;
        finish(tx, result).await
    }

    pub async fn get_terraform_lock(&self, plan: &str) -> Result<Lock, ClusterdError> {
        let tx = self.store.begin().await;
        let result = terraform::get_lock(&tx, plan).await;
        finish(tx, result).await
    }

    pub async fn lock_terraform_plan(&self, plan: &str, requested: &Lock) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = terraform::lock(&mut tx, plan, requested).await;
        finish(tx, result).await
    }

    pub async fn unlock_terraform_plan(
        &self,
        plan: &str,
        requested: &Lock,
    ) -> Result<(), ClusterdError> {
        let mut tx = self.store.begin().await;
        let result = terraform::unlock(&mut tx, plan, requested).await;
        finish(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use cld_storage::fjall::FjallBackend;
    use cld_storage::mem::MemBackend;
    use cld_types::{ErrorKind, LATEST_MANIFEST};

    use super::*;

    fn mem_cluster() -> Cluster<MemBackend> {
        Cluster::new(MemBackend::new(), "member-1")
    }

    fn new_lock(who: &str) -> Lock {
        Lock {
            id: uuid::Uuid::new_v4().to_string(),
            operation: "OperationTypeApply".into(),
            who: who.into(),
            version: "1.5.7".into(),
            created: Some(Utc::now().fixed_offset()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn delete_config_reports_missing_key() {
        let cluster = mem_cluster();
        cluster.put_config("k", "v").await.unwrap();
        cluster.delete_config("k").await.unwrap();
        let err = cluster.delete_config("k").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn put_config_rejects_empty_key() {
        let cluster = mem_cluster();
        let err = cluster.put_config("", "v").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn nodes_are_owned_by_local_member() {
        let cluster = mem_cluster();
        cluster.add_node("n1", &["control".into()], 4, "sys").await.unwrap();
        assert_eq!(cluster.get_node("n1").await.unwrap().member, "member-1");

        let err = cluster.add_node("n1", &[], 5, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(cluster.get_node("n1").await.unwrap().machine_id, 4);
    }

    #[tokio::test]
    async fn failed_operation_leaves_no_writes_and_releases_store() {
        let cluster = mem_cluster();
        cluster.add_manifest("m1", "v1").await.unwrap();
        let err = cluster.add_manifest("m1", "v2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // A rolled-back manifest insert does not consume a row id, and the
        // next operation is not blocked by the failed one.
        cluster.add_manifest("m2", "v3").await.unwrap();
        let tx = cluster.store().begin().await;
        assert_eq!(manifests::get(&tx, "m1").await.unwrap().data, "v1");
        drop(tx);

        assert_eq!(cluster.get_manifest(LATEST_MANIFEST).await.unwrap().manifest_id, "m2");
    }

    #[tokio::test]
    async fn terraform_apply_cycle() {
        let cluster = mem_cluster();
        let lock = new_lock("alice@host");

        cluster.lock_terraform_plan("openstack", &lock).await.unwrap();
        cluster.put_terraform_state("openstack", &lock.id, r#"{"serial":1}"#).await.unwrap();
        cluster.put_terraform_state("openstack", &lock.id, r#"{"serial":2}"#).await.unwrap();
        cluster.unlock_terraform_plan("openstack", &lock).await.unwrap();

        assert_eq!(cluster.get_terraform_state("openstack").await.unwrap(), r#"{"serial":2}"#);
        assert_eq!(cluster.list_terraform_states().await.unwrap(), vec!["openstack"]);
        assert!(cluster.list_terraform_locks().await.unwrap().is_empty());

        let other = new_lock("bob@host");
        cluster.lock_terraform_plan("openstack", &other).await.unwrap();
        assert_eq!(cluster.get_terraform_lock("openstack").await.unwrap(), other);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_lockers_exactly_one_wins() {
        let cluster = Arc::new(mem_cluster());
        let (send, mut recv) = mpsc::unbounded_channel();
        for n in 0..64 {
            let send = send.clone();
            let cluster = cluster.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(rand::random::<u64>() % 20))
                    .await;
                let lock = new_lock(&format!("worker-{n}@host"));
                let result = cluster.lock_terraform_plan("shared", &lock).await;
                let _ = send.send((lock, result));
            });
        }
        drop(send);

        let mut winners = Vec::new();
        let mut conflicts = Vec::new();
        while let Some((lock, result)) = recv.recv().await {
            match result {
                Ok(()) => winners.push(lock),
                Err(err) => {
                    assert_eq!(err.kind(), ErrorKind::Conflict);
                    conflicts.push(err.lock().cloned());
                }
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts.len(), 63);
        // Every loser was shown the winner's lock.
        assert!(conflicts.iter().all(|l| l.as_ref() == Some(&winners[0])));
        assert_eq!(cluster.get_terraform_lock("shared").await.unwrap(), winners[0]);
    }

    #[tokio::test]
    async fn terraform_state_survives_restart_on_fjall() {
        let dir = tempfile::tempdir().unwrap();
        let lock = new_lock("alice@host");
        {
            let cluster = Cluster::new(FjallBackend::open(dir.path()).unwrap(), "member-1");
            cluster.lock_terraform_plan("plan", &lock).await.unwrap();
            cluster.put_terraform_state("plan", &lock.id, "{}").await.unwrap();
            cluster.add_node("n1", &["compute".into()], 1, "s1").await.unwrap();
        }

        let cluster = Cluster::new(FjallBackend::open(dir.path()).unwrap(), "member-2");
        assert_eq!(cluster.get_terraform_state("plan").await.unwrap(), "{}");
        assert_eq!(cluster.get_terraform_lock("plan").await.unwrap(), lock);
        assert_eq!(cluster.get_node("n1").await.unwrap().member, "member-1");

        let err = cluster.lock_terraform_plan("plan", &new_lock("bob@host")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
