pub mod cluster;
pub mod config;
pub mod jujuusers;
pub mod manifests;
pub mod nodes;
pub mod terraform;

pub use cluster::Cluster;
