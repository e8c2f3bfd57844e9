use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use log::debug;
use tokio::sync::Notify;

use super::{Broker, LogPosition, Message, PartitionFetcher, TopicDetail};

/// Broker cluster kept entirely in process memory.
///
/// Offsets, group commits and topic administration behave like a single
/// Kafka broker. Produce, fetch and commit failures can be injected, and
/// committed-offset lookups can be slowed down.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    appended: Notify,
}

#[derive(Default)]
struct State {
    topics: BTreeMap<String, Vec<Vec<Message>>>,
    // (group, topic, partition) -> offset
    commits: HashMap<(String, String, i32), i64>,
    failing_produces: HashSet<(String, i32)>,
    failing_fetches: HashSet<(String, i32)>,
    failing_commits: bool,
    lookup_delay: Option<Duration>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(self, name: &str, partitions: i32) -> Self {
        self.state()
            .topics
            .insert(name.to_string(), (0..partitions).map(|_| Vec::new()).collect());
        self
    }

    /// Rejects every append to `topic`/`partition`.
    pub fn fail_produces(&self, topic: &str, partition: i32) {
        self.state().failing_produces.insert((topic.to_string(), partition));
    }

    /// Makes every fetch of `topic`/`partition` fail.
    pub fn fail_fetches(&self, topic: &str, partition: i32) {
        self.state().failing_fetches.insert((topic.to_string(), partition));
    }

    pub fn fail_commits(&self) {
        self.state().failing_commits = true;
    }

    /// Holds every committed-offset lookup back by `delay`.
    pub fn delay_lookups(&self, delay: Duration) {
        self.state().lookup_delay = Some(delay);
    }

    /// Messages currently stored in one partition.
    pub fn messages(&self, topic: &str, partition: i32) -> Vec<Message> {
        self.state()
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .cloned()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state()
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves no partial writes behind.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn partition(&self, topic: &str, partition: i32) -> Result<&Vec<Message>> {
        self.topics
            .get(topic)
            .ok_or_else(|| anyhow!("unknown topic {}", topic))?
            .get(partition as usize)
            .ok_or_else(|| anyhow!("unknown partition {} of topic {}", partition, topic))
    }

    fn partition_mut(&mut self, topic: &str, partition: i32) -> Result<&mut Vec<Message>> {
        self.topics
            .get_mut(topic)
            .ok_or_else(|| anyhow!("unknown topic {}", topic))?
            .get_mut(partition as usize)
            .ok_or_else(|| anyhow!("unknown partition {} of topic {}", partition, topic))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn topics(&self) -> Result<Vec<String>> {
        Ok(self.state().topics.keys().cloned().collect())
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        Ok(self
            .state()
            .topics
            .get(topic)
            .map(|partitions| (0..partitions.len() as i32).collect())
            .unwrap_or_default())
    }

    async fn offset(&self, topic: &str, partition: i32, position: LogPosition) -> Result<i64> {
        let state = self.state();
        let log = state.partition(topic, partition)?;
        Ok(match position {
            LogPosition::Oldest => 0,
            LogPosition::Newest => log.len() as i64,
        })
    }

    async fn fetcher(&self, topic: &str, partition: i32) -> Result<Box<dyn PartitionFetcher>> {
        self.state().partition(topic, partition)?;
        Ok(Box::new(MemoryFetcher {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            partition,
        }))
    }

    async fn produce(&self, topic: &str, partition: i32, key: Option<Bytes>, value: Option<Bytes>) -> Result<i64> {
        let offset = {
            let mut state = self.state();
            if state.failing_produces.contains(&(topic.to_string(), partition)) {
                bail!("not enough replicas for {}/{}", topic, partition);
            }
            let log = state.partition_mut(topic, partition)?;
            let offset = log.len() as i64;
            log.push(Message {
                key,
                value,
                partition,
                offset,
                timestamp: Some(Utc::now()),
            });
            offset
        };
        debug!("Appended offset {} to {}/{}", offset, topic, partition);
        self.shared.appended.notify_waiters();
        Ok(offset)
    }

    async fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let mut state = self.state();
        if state.failing_commits {
            bail!("coordinator not available");
        }
        state.partition(topic, partition)?;
        state
            .commits
            .insert((group.to_string(), topic.to_string(), partition), offset);
        Ok(())
    }

    async fn committed(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>> {
        let delay = self.state().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        state.partition(topic, partition)?;
        Ok(state
            .commits
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied())
    }

    async fn create_topic(&self, name: &str, detail: &TopicDetail, validate_only: bool) -> Result<()> {
        let mut state = self.state();
        if state.topics.contains_key(name) {
            bail!("topic {} already exists", name);
        }
        if detail.num_partitions <= 0 {
            bail!("invalid partition count {}", detail.num_partitions);
        }
        if !validate_only {
            state.topics.insert(
                name.to_string(),
                (0..detail.num_partitions).map(|_| Vec::new()).collect(),
            );
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.topics.remove(name).is_none() {
            bail!("unknown topic {}", name);
        }
        state.commits.retain(|(_, topic, _), _| topic != name);
        Ok(())
    }
}

struct MemoryFetcher {
    shared: Arc<Shared>,
    topic: String,
    partition: i32,
}

impl MemoryFetcher {
    fn read_from(&self, offset: i64) -> Result<Vec<Message>> {
        let state = self.shared.state();
        if state.failing_fetches.contains(&(self.topic.clone(), self.partition)) {
            bail!("fetch of {}/{} failed", self.topic, self.partition);
        }
        let log = state.partition(&self.topic, self.partition)?;
        if offset < 0 || offset > log.len() as i64 {
            bail!(
                "offset {} out of range for {}/{} (high-water mark {})",
                offset,
                self.topic,
                self.partition,
                log.len()
            );
        }
        Ok(log[offset as usize..].to_vec())
    }
}

#[async_trait]
impl PartitionFetcher for MemoryFetcher {
    async fn fetch(&mut self, offset: i64, max_wait: Duration) -> Result<Vec<Message>> {
        // Registered before reading so an append in between still wakes us.
        let appended = self.shared.appended.notified();
        let messages = self.read_from(offset)?;
        if !messages.is_empty() {
            return Ok(messages);
        }
        let _ = tokio::time::timeout(max_wait, appended).await;
        self.read_from(offset)
    }
}
