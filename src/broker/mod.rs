//! Capability interface onto a broker cluster.
//!
//! Commands only ever talk to the cluster through [`Broker`] and
//! [`PartitionFetcher`], so the network client in [`crate::kafka`] and the
//! in-memory [`MemoryBroker`] are interchangeable.

pub mod memory;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::Error;

pub use memory::MemoryBroker;

/// A record read from a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Broker-side log positions that can be looked up for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPosition {
    /// First offset still retained by the broker.
    Oldest,
    /// High-water mark: one past the last written message.
    Newest,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Names of every topic in the cluster, internal topics included.
    async fn topics(&self) -> anyhow::Result<Vec<String>>;

    /// Partition ids of `topic`. An unknown topic yields an empty list.
    async fn partitions(&self, topic: &str) -> anyhow::Result<Vec<i32>>;

    async fn offset(&self, topic: &str, partition: i32, position: LogPosition) -> anyhow::Result<i64>;

    /// Opens a fetch session dedicated to one partition.
    async fn fetcher(&self, topic: &str, partition: i32) -> anyhow::Result<Box<dyn PartitionFetcher>>;

    /// Sends a single record and returns the offset assigned to it.
    async fn produce(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        value: Option<Bytes>,
    ) -> anyhow::Result<i64>;

    async fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) -> anyhow::Result<()>;

    /// Committed offset of `group`, `None` when the group never committed.
    async fn committed(&self, group: &str, topic: &str, partition: i32) -> anyhow::Result<Option<i64>>;

    async fn create_topic(&self, name: &str, detail: &TopicDetail, validate_only: bool) -> anyhow::Result<()>;

    async fn delete_topic(&self, name: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PartitionFetcher: Send {
    /// Returns the messages available at or after `offset`, waiting at most
    /// `max_wait` for new ones. An empty result means nothing arrived.
    async fn fetch(&mut self, offset: i64, max_wait: Duration) -> anyhow::Result<Vec<Message>>;
}

/// Settings of a topic to create, in the layout of a sarama `TopicDetail`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TopicDetail {
    #[serde(alias = "num_partitions", alias = "numPartitions")]
    pub num_partitions: i32,
    #[serde(alias = "replication_factor", alias = "replicationFactor")]
    pub replication_factor: i16,
    #[serde(default, alias = "replica_assignment", alias = "replicaAssignment")]
    pub replica_assignment: Option<IndexMap<i32, Vec<i32>>>,
    #[serde(default, alias = "config_entries", alias = "configEntries")]
    pub config_entries: Option<IndexMap<String, Option<String>>>,
}

impl TopicDetail {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let buf = std::fs::read(path).map_err(|e| Error::TopicDetail {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        serde_json::from_slice(&buf).map_err(|e| Error::TopicDetail {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}
