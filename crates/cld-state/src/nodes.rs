use serde::{Deserialize, Serialize};

use cld_storage::codec::{decode, encode};
use cld_storage::{Backend, Table, Transaction};
use cld_types::{ClusterdError, Node, UNSET_MACHINE_ID};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRow {
    member: String,
    /// Sorted JSON array, e.g. `["compute","control"]`.
    role: String,
    machine_id: i64,
    system_id: String,
}

fn not_found() -> ClusterdError {
    ClusterdError::NotFound("Node".into())
}

/// Roles are a set: stored sorted and deduplicated so that two writes of the
/// same set produce byte-identical rows.
fn roles_to_str(roles: &[String]) -> Result<String, ClusterdError> {
    let mut sorted = roles.to_vec();
    sorted.sort();
    sorted.dedup();
    serde_json::to_string(&sorted)
        .map_err(|e| ClusterdError::Internal(format!("failed to encode roles: {e}")))
}

fn roles_from_str(role: &str) -> Result<Vec<String>, ClusterdError> {
    let mut roles: Vec<String> = serde_json::from_str(role)
        .map_err(|e| ClusterdError::Internal(format!("failed to decode roles: {e}")))?;
    roles.sort();
    Ok(roles)
}

fn row_to_node(name: String, row: NodeRow) -> Result<Node, ClusterdError> {
    Ok(Node {
        name,
        roles: roles_from_str(&row.role)?,
        machine_id: row.machine_id,
        system_id: row.system_id,
        member: row.member,
    })
}

/// Containment test against the stored role string.
///
/// A requested role matches when it appears anywhere in the JSON-encoded
/// role list, so `"compute"` also matches `"compute-extra"`. Clients written
/// against the existing API rely on this, so it is kept as is.
fn has_roles(row: &NodeRow, wanted: &[String]) -> bool {
    wanted.iter().all(|r| row.role.contains(r.as_str()))
}

async fn read_row<B: Backend>(
    tx: &Transaction<B>,
    name: &str,
) -> Result<NodeRow, ClusterdError> {
    match tx.get(Table::Nodes, name).await? {
        Some(bytes) => decode(&bytes),
        None => Err(not_found()),
    }
}

/// All nodes carrying every role in `roles` (all nodes when empty), ordered
/// by name.
pub async fn list<B: Backend>(
    tx: &Transaction<B>,
    roles: &[String],
) -> Result<Vec<Node>, ClusterdError> {
    let mut nodes = Vec::new();
    for (name, bytes) in tx.scan_prefix(Table::Nodes, "").await? {
        let row: NodeRow = decode(&bytes)?;
        if has_roles(&row, roles) {
            nodes.push(row_to_node(name, row)?);
        }
    }
    Ok(nodes)
}

pub async fn get<B: Backend>(tx: &Transaction<B>, name: &str) -> Result<Node, ClusterdError> {
    let row = read_row(tx, name).await?;
    row_to_node(name.to_string(), row)
}

/// Register a node owned by `member`.
pub async fn create<B: Backend>(
    tx: &mut Transaction<B>,
    member: &str,
    name: &str,
    roles: &[String],
    machine_id: i64,
    system_id: &str,
) -> Result<(), ClusterdError> {
    if name.is_empty() {
        return Err(ClusterdError::InvalidArgument("node name must not be empty".into()));
    }
    if tx.exists(Table::Nodes, name).await? {
        return Err(ClusterdError::already_exists("node"));
    }
    let row = NodeRow {
        member: member.to_string(),
        role: roles_to_str(roles)?,
        machine_id,
        system_id: system_id.to_string(),
    };
    tx.put(Table::Nodes, name, encode(&row)?);
    Ok(())
}

/// Partial update. Empty `roles`, [`UNSET_MACHINE_ID`] and an empty
/// `system_id` keep the stored values. Ownership moves to `member`.
pub async fn update<B: Backend>(
    tx: &mut Transaction<B>,
    member: &str,
    name: &str,
    roles: &[String],
    machine_id: i64,
    system_id: &str,
) -> Result<(), ClusterdError> {
    let current = read_row(tx, name).await?;
    let row = NodeRow {
        member: member.to_string(),
        role: if roles.is_empty() { current.role } else { roles_to_str(roles)? },
        machine_id: if machine_id == UNSET_MACHINE_ID { current.machine_id } else { machine_id },
        system_id: if system_id.is_empty() { current.system_id } else { system_id.to_string() },
    };
    tx.put(Table::Nodes, name, encode(&row)?);
    Ok(())
}

pub async fn delete<B: Backend>(tx: &mut Transaction<B>, name: &str) -> Result<(), ClusterdError> {
    if !tx.delete(Table::Nodes, name).await? {
        return Err(not_found());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cld_storage::mem::MemBackend;
    use cld_storage::Store;
    use cld_types::ErrorKind;

    use super::*;

    fn roles(list: &[&str]) -> Vec<String> {
        list.iter().map(|r| r.to_string()).collect()
    }

    async fn seeded() -> Store<MemBackend> {
        let store = Store::new(MemBackend::new());
        let mut tx = store.begin().await;
        create(&mut tx, "m1", "node-1", &roles(&["control", "compute"]), 1, "sys-1")
            .await
            .unwrap();
        create(&mut tx, "m1", "node-2", &roles(&["compute-extra"]), 2, "sys-2")
            .await
            .unwrap();
        create(&mut tx, "m2", "node-3", &roles(&["storage"]), 3, "").await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[tokio::test]
    async fn create_sorts_roles_and_records_owner() {
        let store = seeded().await;
        let tx = store.begin().await;
        let node = get(&tx, "node-1").await.unwrap();
        assert_eq!(node.roles, vec!["compute", "control"]);
        assert_eq!(node.machine_id, 1);
        assert_eq!(node.system_id, "sys-1");
        assert_eq!(node.member, "m1");
    }

    #[test]
    fn same_role_set_in_any_order_stores_identical_row() {
        let a = roles_to_str(&roles(&["b", "a"])).unwrap();
        let b = roles_to_str(&roles(&["a", "b"])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, r#"["a","b"]"#);
    }

    #[tokio::test]
    async fn duplicate_roles_are_stored_once() {
        let store = Store::new(MemBackend::new());
        let mut tx = store.begin().await;
        create(&mut tx, "m1", "n1", &roles(&["compute", "control", "compute"]), 1, "")
            .await
            .unwrap();
        assert_eq!(get(&tx, "n1").await.unwrap().roles, vec!["compute", "control"]);

        update(&mut tx, "m1", "n1", &roles(&["storage", "storage"]), UNSET_MACHINE_ID, "")
            .await
            .unwrap();
        assert_eq!(get(&tx, "n1").await.unwrap().roles, vec!["storage"]);
    }

    #[tokio::test]
    async fn create_duplicate_is_conflict() {
        let store = seeded().await;
        let mut tx = store.begin().await;
        let err = create(&mut tx, "m2", "node-1", &roles(&["storage"]), 9, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(get(&tx, "node-1").await.unwrap().member, "m1");
    }

    #[tokio::test]
    async fn list_without_filter_returns_all_by_name() {
        let store = seeded().await;
        let tx = store.begin().await;
        let all = list(&tx, &[]).await.unwrap();
        assert_eq!(names(&all), vec!["node-1", "node-2", "node-3"]);
    }

    // Role filtering is containment on the stored JSON string, not set
    // membership: asking for "compute" also returns a "compute-extra" node.
    #[tokio::test]
    async fn role_filter_matches_substrings() {
        let store = seeded().await;
        let tx = store.begin().await;

        let compute = list(&tx, &roles(&["compute"])).await.unwrap();
        assert_eq!(names(&compute), vec!["node-1", "node-2"]);

        let both = list(&tx, &roles(&["compute", "control"])).await.unwrap();
        assert_eq!(names(&both), vec!["node-1"]);

        let none = list(&tx, &roles(&["network"])).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let store = seeded().await;
        let mut tx = store.begin().await;
        update(&mut tx, "m2", "node-1", &[], UNSET_MACHINE_ID, "").await.unwrap();
        let node = get(&tx, "node-1").await.unwrap();
        assert_eq!(node.roles, vec!["compute", "control"]);
        assert_eq!(node.machine_id, 1);
        assert_eq!(node.system_id, "sys-1");
        assert_eq!(node.member, "m2");

        update(&mut tx, "m2", "node-1", &roles(&["storage", "compute"]), 7, "sys-7")
            .await
            .unwrap();
        let node = get(&tx, "node-1").await.unwrap();
        assert_eq!(node.roles, vec!["compute", "storage"]);
        assert_eq!(node.machine_id, 7);
        assert_eq!(node.system_id, "sys-7");
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let store = seeded().await;
        let mut tx = store.begin().await;
        let err = update(&mut tx, "m1", "ghost", &[], UNSET_MACHINE_ID, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        delete(&mut tx, "node-3").await.unwrap();
        let err = delete(&mut tx, "node-3").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let store = Store::new(MemBackend::new());
        let mut tx = store.begin().await;
        let err = create(&mut tx, "m1", "", &[], 1, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
