/// Logical tables. Each maps to one fjall keyspace (or one in-memory map);
/// keys inside a table are the entity's unique key as UTF-8, so iteration
/// order is key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Generic configuration entries, including Terraform state and locks.
    Config,
    Nodes,
    Manifest,
    JujuUser,
    /// Internal bookkeeping (row-id sequences).
    Meta,
}

impl Table {
    pub const ALL: [Table; 5] =
        [Table::Config, Table::Nodes, Table::Manifest, Table::JujuUser, Table::Meta];

    /// Keyspace name used by the persistent backend.
    pub fn name(self) -> &'static str {
        match self {
            Table::Config => "config",
            Table::Nodes => "nodes",
            Table::Manifest => "manifest",
            Table::JujuUser => "jujuuser",
            Table::Meta => "meta",
        }
    }
}

/// `meta` key holding the last row id handed out for `table`.
pub fn sequence_key(table: Table) -> String {
    format!("seq/{}", table.name())
}
