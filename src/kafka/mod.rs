pub(crate) mod protocol;
pub mod cluster;
pub mod connection;
pub mod records;
pub mod tls;

#[cfg(test)]
pub(crate) mod testing;

pub use cluster::{ClusterConfig, KafkaCluster};
