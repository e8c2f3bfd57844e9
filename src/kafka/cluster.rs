use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use kafka_protocol::error::{ParseResponseErrorCode, ResponseError};
use kafka_protocol::messages::create_topics_request::{
    CreatableReplicaAssignment, CreatableTopic, CreateableTopicConfig,
};
use kafka_protocol::messages::fetch_request::{FetchPartition, FetchTopic};
use kafka_protocol::messages::list_offsets_request::{ListOffsetsPartition, ListOffsetsTopic};
use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::offset_commit_request::{OffsetCommitRequestPartition, OffsetCommitRequestTopic};
use kafka_protocol::messages::offset_fetch_request::OffsetFetchRequestTopic;
use kafka_protocol::messages::produce_request::{PartitionProduceData, TopicProduceData};
use kafka_protocol::messages::*;
use kafka_protocol::protocol::StrBytes;
use log::{debug, info, warn};
use rustls::ClientConfig;
use tokio::sync::{Mutex, RwLock};

use super::connection::Connection;
use super::protocol::check_error;
use super::records::{decode_messages, encode_record};
use crate::broker::{Broker, LogPosition, Message, PartitionFetcher, TopicDetail};

const METADATA_VERSION: i16 = 4;
const PRODUCE_VERSION: i16 = 3;
const FETCH_VERSION: i16 = 4;
const LIST_OFFSETS_VERSION: i16 = 1;
const FIND_COORDINATOR_VERSION: i16 = 1;
const OFFSET_COMMIT_VERSION: i16 = 2;
const OFFSET_FETCH_VERSION: i16 = 3;
const CREATE_TOPICS_VERSION: i16 = 2;
const DELETE_TOPICS_VERSION: i16 = 1;

const ACKS_ALL: i16 = -1;
const PRODUCE_TIMEOUT_MS: i32 = 10_000;
const ADMIN_TIMEOUT_MS: i32 = 30_000;
const FETCH_MAX_BYTES: i32 = 1_048_576; // 1MB
const EARLIEST_TIMESTAMP: i64 = -2;
const LATEST_TIMESTAMP: i64 = -1;

/// How to reach the cluster.
#[derive(Clone)]
pub struct ClusterConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub tls: Option<Arc<ClientConfig>>,
}

type SharedConnection = Arc<Mutex<Connection>>;

/// [`Broker`] backed by a Kafka cluster.
///
/// Metadata and coordinator lookups go through the bootstrap connection;
/// partition, group and admin requests are routed to the leader,
/// coordinator or controller over pooled per-broker connections.
pub struct KafkaCluster {
    config: ClusterConfig,
    bootstrap: Mutex<Connection>,
    brokers: RwLock<HashMap<i32, String>>, // node id -> host:port
    controller_id: RwLock<Option<i32>>,
    leaders: RwLock<HashMap<String, BTreeMap<i32, i32>>>, // topic -> (partition -> leader)
    coordinators: RwLock<HashMap<String, i32>>,           // group -> node id
    connections: Mutex<HashMap<i32, SharedConnection>>,
}

fn topic_name(name: &str) -> TopicName {
    TopicName(StrBytes::from_string(name.to_string()))
}

fn group_id(name: &str) -> GroupId {
    GroupId(StrBytes::from_string(name.to_string()))
}

impl KafkaCluster {
    /// Connects to the first reachable bootstrap broker.
    pub async fn connect(config: ClusterConfig) -> Result<Self> {
        let mut last_error = None;
        for addr in &config.brokers {
            match Connection::connect(addr, &config.client_id, config.tls.as_ref()).await {
                Ok(bootstrap) => {
                    info!("Bootstrapped from {}", bootstrap.addr());
                    return Ok(Self {
                        config,
                        bootstrap: Mutex::new(bootstrap),
                        brokers: RwLock::new(HashMap::new()),
                        controller_id: RwLock::new(None),
                        leaders: RwLock::new(HashMap::new()),
                        coordinators: RwLock::new(HashMap::new()),
                        connections: Mutex::new(HashMap::new()),
                    });
                }
                Err(e) => {
                    warn!("Failed to reach broker {}: {:#}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("no brokers configured")))
    }

    /// Queries cluster metadata. `None` asks for every topic, an empty list
    /// for brokers and controller only.
    async fn metadata(&self, topics: Option<Vec<&str>>) -> Result<MetadataResponse> {
        let request = MetadataRequest::default()
            .with_topics(topics.map(|names| {
                names
                    .into_iter()
                    .map(|name| MetadataRequestTopic::default().with_name(Some(topic_name(name))))
                    .collect()
            }))
            .with_allow_auto_topic_creation(false);

        let response = self
            .bootstrap
            .lock()
            .await
            .send(ApiKey::Metadata, METADATA_VERSION, RequestKind::Metadata(request))
            .await?;
        let metadata = if let ResponseKind::Metadata(metadata) = response {
            metadata
        } else {
            bail!("Expected Metadata response");
        };

        {
            let mut brokers = self.brokers.write().await;
            for broker in &metadata.brokers {
                brokers.insert(broker.node_id.0, format!("{}:{}", broker.host, broker.port));
            }
        }
        *self.controller_id.write().await = Some(metadata.controller_id.0);

        let mut leaders = self.leaders.write().await;
        for topic in &metadata.topics {
            let Some(name) = &topic.name else { continue };
            if topic.error_code != 0 {
                leaders.remove(&name.0.to_string());
                continue;
            }
            let partitions = topic
                .partitions
                .iter()
                .map(|p| (p.partition_index, p.leader_id.0))
                .collect();
            leaders.insert(name.0.to_string(), partitions);
        }
        drop(leaders);

        debug!(
            "Metadata: {} brokers, {} topics, controller {}",
            metadata.brokers.len(),
            metadata.topics.len(),
            metadata.controller_id.0
        );
        Ok(metadata)
    }

    async fn broker_addr(&self, node_id: i32) -> Result<String> {
        if let Some(addr) = self.brokers.read().await.get(&node_id) {
            return Ok(addr.clone());
        }
        self.metadata(Some(Vec::new())).await?;
        self.brokers
            .read()
            .await
            .get(&node_id)
            .cloned()
            .ok_or_else(|| anyhow!("broker {} is not part of the cluster", node_id))
    }

    async fn broker_connection(&self, node_id: i32) -> Result<SharedConnection> {
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.get(&node_id) {
            return Ok(connection.clone());
        }
        let addr = self.broker_addr(node_id).await?;
        let connection = Connection::connect(&addr, &self.config.client_id, self.config.tls.as_ref()).await?;
        let connection = Arc::new(Mutex::new(connection));
        connections.insert(node_id, connection.clone());
        Ok(connection)
    }

    async fn leader(&self, topic: &str, partition: i32) -> Result<i32> {
        let cached = self
            .leaders
            .read()
            .await
            .get(topic)
            .and_then(|partitions| partitions.get(&partition).copied());
        let leader = match cached {
            Some(leader) => leader,
            None => {
                self.metadata(Some(vec![topic])).await?;
                self.leaders
                    .read()
                    .await
                    .get(topic)
                    .and_then(|partitions| partitions.get(&partition).copied())
                    .ok_or_else(|| anyhow!("unknown partition {}/{}", topic, partition))?
            }
        };
        if leader < 0 {
            bail!("no leader available for {}/{}", topic, partition);
        }
        Ok(leader)
    }

    async fn leader_connection(&self, topic: &str, partition: i32) -> Result<SharedConnection> {
        let leader = self.leader(topic, partition).await?;
        self.broker_connection(leader).await
    }

    async fn coordinator_connection(&self, group: &str) -> Result<SharedConnection> {
        let cached = self.coordinators.read().await.get(group).copied();
        let node_id = match cached {
            Some(node_id) => node_id,
            None => {
                let request = FindCoordinatorRequest::default()
                    .with_key(StrBytes::from_string(group.to_string()))
                    .with_key_type(0);
                let response = self
                    .bootstrap
                    .lock()
                    .await
                    .send(ApiKey::FindCoordinator, FIND_COORDINATOR_VERSION, RequestKind::FindCoordinator(request))
                    .await?;
                let coordinator = if let ResponseKind::FindCoordinator(coordinator) = response {
                    coordinator
                } else {
                    bail!("Expected FindCoordinator response");
                };
                check_error(coordinator.error_code, &format!("find coordinator for group {}", group))?;

                let node_id = coordinator.node_id.0;
                debug!("Coordinator of group {} is {}:{} (node {})", group, coordinator.host, coordinator.port, node_id);
                self.brokers
                    .write()
                    .await
                    .insert(node_id, format!("{}:{}", coordinator.host, coordinator.port));
                self.coordinators.write().await.insert(group.to_string(), node_id);
                node_id
            }
        };
        self.broker_connection(node_id).await
    }

    async fn controller_connection(&self) -> Result<SharedConnection> {
        self.metadata(Some(Vec::new())).await?;
        let controller_id = (*self.controller_id.read().await)
            .filter(|id| *id >= 0)
            .ok_or_else(|| anyhow!("cluster reported no controller"))?;
        self.broker_connection(controller_id).await
    }
}

#[async_trait]
impl Broker for KafkaCluster {
    async fn topics(&self) -> Result<Vec<String>> {
        let metadata = self.metadata(None).await?;
        Ok(metadata
            .topics
            .iter()
            .filter(|topic| topic.error_code == 0)
            .filter_map(|topic| topic.name.as_ref().map(|name| name.0.to_string()))
            .collect())
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        let metadata = self.metadata(Some(vec![topic])).await?;
        let Some(found) = metadata
            .topics
            .iter()
            .find(|t| t.name.as_ref().is_some_and(|name| name.0.to_string() == topic))
        else {
            return Ok(Vec::new());
        };
        if found.error_code.err() == Some(ResponseError::UnknownTopicOrPartition) {
            return Ok(Vec::new());
        }
        check_error(found.error_code, &format!("metadata for topic {}", topic))?;
        Ok(found.partitions.iter().map(|p| p.partition_index).collect())
    }

    async fn offset(&self, topic: &str, partition: i32, position: LogPosition) -> Result<i64> {
        let timestamp = match position {
            LogPosition::Oldest => EARLIEST_TIMESTAMP,
            LogPosition::Newest => LATEST_TIMESTAMP,
        };
        let request = ListOffsetsRequest::default()
            .with_replica_id(BrokerId(-1))
            .with_topics(vec![ListOffsetsTopic::default()
                .with_name(topic_name(topic))
                .with_partitions(vec![ListOffsetsPartition::default()
                    .with_partition_index(partition)
                    .with_timestamp(timestamp)])]);

        let connection = self.leader_connection(topic, partition).await?;
        let response = connection
            .lock()
            .await
            .send(ApiKey::ListOffsets, LIST_OFFSETS_VERSION, RequestKind::ListOffsets(request))
            .await?;
        let offsets = if let ResponseKind::ListOffsets(offsets) = response {
            offsets
        } else {
            bail!("Expected ListOffsets response");
        };

        let found = offsets
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition_index == partition)
            .ok_or_else(|| anyhow!("no offset returned for {}/{}", topic, partition))?;
        check_error(found.error_code, &format!("list offsets {}/{}", topic, partition))?;
        Ok(found.offset)
    }

    async fn fetcher(&self, topic: &str, partition: i32) -> Result<Box<dyn PartitionFetcher>> {
        let leader = self.leader(topic, partition).await?;
        let addr = self.broker_addr(leader).await?;
        // Long-polling fetches get a connection of their own
        let connection = Connection::connect(&addr, &self.config.client_id, self.config.tls.as_ref()).await?;
        Ok(Box::new(KafkaFetcher {
            connection,
            topic: topic.to_string(),
            partition,
        }))
    }

    async fn produce(&self, topic: &str, partition: i32, key: Option<Bytes>, value: Option<Bytes>) -> Result<i64> {
        let records = encode_record(key, value, Utc::now())?;
        let request = ProduceRequest::default()
            .with_acks(ACKS_ALL)
            .with_timeout_ms(PRODUCE_TIMEOUT_MS)
            .with_topic_data(vec![TopicProduceData::default()
                .with_name(topic_name(topic))
                .with_partition_data(vec![PartitionProduceData::default()
                    .with_index(partition)
                    .with_records(Some(records))])]);

        let connection = self.leader_connection(topic, partition).await?;
        let response = connection
            .lock()
            .await
            .send(ApiKey::Produce, PRODUCE_VERSION, RequestKind::Produce(request))
            .await?;
        let produced = if let ResponseKind::Produce(produced) = response {
            produced
        } else {
            bail!("Expected Produce response");
        };

        let found = produced
            .responses
            .iter()
            .flat_map(|t| t.partition_responses.iter())
            .find(|p| p.index == partition)
            .ok_or_else(|| anyhow!("no produce result for {}/{}", topic, partition))?;
        check_error(found.error_code, &format!("produce to {}/{}", topic, partition))?;
        Ok(found.base_offset)
    }

    async fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) -> Result<()> {
        // Generation -1 and an empty member id commit on behalf of no member
        let request = OffsetCommitRequest::default()
            .with_group_id(group_id(group))
            .with_topics(vec![OffsetCommitRequestTopic::default()
                .with_name(topic_name(topic))
                .with_partitions(vec![OffsetCommitRequestPartition::default()
                    .with_partition_index(partition)
                    .with_committed_offset(offset)])]);

        let connection = self.coordinator_connection(group).await?;
        let response = connection
            .lock()
            .await
            .send(ApiKey::OffsetCommit, OFFSET_COMMIT_VERSION, RequestKind::OffsetCommit(request))
            .await?;
        let committed = if let ResponseKind::OffsetCommit(committed) = response {
            committed
        } else {
            bail!("Expected OffsetCommit response");
        };

        let found = committed
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition_index == partition)
            .ok_or_else(|| anyhow!("no commit result for {}/{}", topic, partition))?;
        check_error(found.error_code, &format!("commit {} for {}/{}", group, topic, partition))
    }

    async fn committed(&self, group: &str, topic: &str, partition: i32) -> Result<Option<i64>> {
        let request = OffsetFetchRequest::default()
            .with_group_id(group_id(group))
            .with_topics(Some(vec![OffsetFetchRequestTopic::default()
                .with_name(topic_name(topic))
                .with_partition_indexes(vec![partition])]));

        let connection = self.coordinator_connection(group).await?;
        let response = connection
            .lock()
            .await
            .send(ApiKey::OffsetFetch, OFFSET_FETCH_VERSION, RequestKind::OffsetFetch(request))
            .await?;
        let fetched = if let ResponseKind::OffsetFetch(fetched) = response {
            fetched
        } else {
            bail!("Expected OffsetFetch response");
        };
        check_error(fetched.error_code, &format!("offset fetch for group {}", group))?;

        let found = fetched
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition_index == partition)
            .ok_or_else(|| anyhow!("no committed offset returned for {}/{}", topic, partition))?;
        check_error(found.error_code, &format!("offset fetch {} for {}/{}", group, topic, partition))?;
        Ok((found.committed_offset >= 0).then_some(found.committed_offset))
    }

    async fn create_topic(&self, name: &str, detail: &TopicDetail, validate_only: bool) -> Result<()> {
        let configs = detail
            .config_entries
            .iter()
            .flatten()
            .map(|(key, value)| {
                CreateableTopicConfig::default()
                    .with_name(StrBytes::from_string(key.clone()))
                    .with_value(value.clone().map(StrBytes::from_string))
            })
            .collect();

        // Explicit assignments exclude a partition count and replication factor
        let mut topic = CreatableTopic::default().with_name(topic_name(name)).with_configs(configs);
        topic = match &detail.replica_assignment {
            Some(assignment) => topic
                .with_num_partitions(-1)
                .with_replication_factor(-1)
                .with_assignments(
                    assignment
                        .iter()
                        .map(|(partition, brokers)| {
                            CreatableReplicaAssignment::default()
                                .with_partition_index(*partition)
                                .with_broker_ids(brokers.iter().map(|id| BrokerId(*id)).collect())
                        })
                        .collect(),
                ),
            None => topic
                .with_num_partitions(detail.num_partitions)
                .with_replication_factor(detail.replication_factor),
        };

        let request = CreateTopicsRequest::default()
            .with_topics(vec![topic])
            .with_timeout_ms(ADMIN_TIMEOUT_MS)
            .with_validate_only(validate_only);

        let connection = self.controller_connection().await?;
        let response = connection
            .lock()
            .await
            .send(ApiKey::CreateTopics, CREATE_TOPICS_VERSION, RequestKind::CreateTopics(request))
            .await?;
        let created = if let ResponseKind::CreateTopics(created) = response {
            created
        } else {
            bail!("Expected CreateTopics response");
        };

        for result in &created.topics {
            let context = match &result.error_message {
                Some(message) => format!("create topic {} ({})", name, message),
                None => format!("create topic {}", name),
            };
            check_error(result.error_code, &context)?;
        }
        self.leaders.write().await.remove(name);
        info!("Created topic {} (validate_only={})", name, validate_only);
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        let request = DeleteTopicsRequest::default()
            .with_topic_names(vec![topic_name(name)])
            .with_timeout_ms(ADMIN_TIMEOUT_MS);

        let connection = self.controller_connection().await?;
        let response = connection
            .lock()
            .await
            .send(ApiKey::DeleteTopics, DELETE_TOPICS_VERSION, RequestKind::DeleteTopics(request))
            .await?;
        let deleted = if let ResponseKind::DeleteTopics(deleted) = response {
            deleted
        } else {
            bail!("Expected DeleteTopics response");
        };

        for result in &deleted.responses {
            check_error(result.error_code, &format!("delete topic {}", name))?;
        }
        self.leaders.write().await.remove(name);
        info!("Deleted topic {}", name);
        Ok(())
    }
}

/// Fetch session of one partition over a dedicated leader connection.
struct KafkaFetcher {
    connection: Connection,
    topic: String,
    partition: i32,
}

#[async_trait]
impl PartitionFetcher for KafkaFetcher {
    async fn fetch(&mut self, offset: i64, max_wait: Duration) -> Result<Vec<Message>> {
        let request = FetchRequest::default()
            .with_replica_id(BrokerId(-1))
            .with_max_wait_ms(max_wait.as_millis().min(i32::MAX as u128) as i32)
            .with_min_bytes(1)
            .with_max_bytes(FETCH_MAX_BYTES)
            .with_isolation_level(0)
            .with_topics(vec![FetchTopic::default()
                .with_topic(topic_name(&self.topic))
                .with_partitions(vec![FetchPartition::default()
                    .with_partition(self.partition)
                    .with_fetch_offset(offset)
                    .with_partition_max_bytes(FETCH_MAX_BYTES)])]);

        let response = self
            .connection
            .send(ApiKey::Fetch, FETCH_VERSION, RequestKind::Fetch(request))
            .await?;
        let fetched = if let ResponseKind::Fetch(fetched) = response {
            fetched
        } else {
            bail!("Expected Fetch response");
        };

        let Some(data) = fetched
            .responses
            .into_iter()
            .flat_map(|t| t.partitions.into_iter())
            .find(|p| p.partition_index == self.partition)
        else {
            return Ok(Vec::new());
        };
        check_error(data.error_code, &format!("fetch {}/{} at offset {}", self.topic, self.partition, offset))?;

        match data.records {
            Some(records) => decode_messages(records, self.partition, offset),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use kafka_protocol::messages::list_offsets_response::{ListOffsetsPartitionResponse, ListOffsetsTopicResponse};
    use kafka_protocol::messages::metadata_response::{
        MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
    };
    use kafka_protocol::messages::offset_fetch_response::{OffsetFetchResponsePartition, OffsetFetchResponseTopic};
    use kafka_protocol::messages::produce_response::{PartitionProduceResponse, TopicProduceResponse};

    use super::*;
    use crate::kafka::testing::MockKafka;

    const TOPIC: &str = "kt-test";

    /// One broker leading both partitions of `kt-test` and coordinating
    /// every group. Partition 1 has a commit at 5, partition 0 has none.
    fn respond(port: i32, api_key: ApiKey, request: RequestKind) -> ResponseKind {
        match (api_key, request) {
            (ApiKey::Metadata, RequestKind::Metadata(request)) => {
                let topics = request
                    .topics
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|topic| topic.name)
                    .map(|name| {
                        if name.0.as_str() == TOPIC {
                            MetadataResponseTopic::default().with_name(Some(name)).with_partitions(
                                (0..2)
                                    .map(|index| {
                                        MetadataResponsePartition::default()
                                            .with_partition_index(index)
                                            .with_leader_id(BrokerId(0))
                                    })
                                    .collect(),
                            )
                        } else {
                            MetadataResponseTopic::default()
                                .with_name(Some(name))
                                .with_error_code(ResponseError::UnknownTopicOrPartition.code())
                        }
                    })
                    .collect();
                ResponseKind::Metadata(
                    MetadataResponse::default()
                        .with_brokers(vec![MetadataResponseBroker::default()
                            .with_node_id(BrokerId(0))
                            .with_host(StrBytes::from_static_str("127.0.0.1"))
                            .with_port(port)])
                        .with_controller_id(BrokerId(0))
                        .with_topics(topics),
                )
            }
            (ApiKey::FindCoordinator, _) => ResponseKind::FindCoordinator(
                FindCoordinatorResponse::default()
                    .with_node_id(BrokerId(0))
                    .with_host(StrBytes::from_static_str("127.0.0.1"))
                    .with_port(port),
            ),
            (ApiKey::OffsetFetch, RequestKind::OffsetFetch(request)) => {
                let topics = request
                    .topics
                    .unwrap_or_default()
                    .into_iter()
                    .map(|topic| {
                        let partitions = topic
                            .partition_indexes
                            .iter()
                            .map(|index| {
                                OffsetFetchResponsePartition::default()
                                    .with_partition_index(*index)
                                    .with_committed_offset(if *index == 1 { 5 } else { -1 })
                            })
                            .collect();
                        OffsetFetchResponseTopic::default().with_name(topic.name).with_partitions(partitions)
                    })
                    .collect();
                ResponseKind::OffsetFetch(OffsetFetchResponse::default().with_topics(topics))
            }
            (ApiKey::ListOffsets, RequestKind::ListOffsets(request)) => {
                let topics = request
                    .topics
                    .into_iter()
                    .map(|topic| {
                        let partitions = topic
                            .partitions
                            .iter()
                            .map(|partition| {
                                let offset = if partition.timestamp == EARLIEST_TIMESTAMP { 3 } else { 10 };
                                ListOffsetsPartitionResponse::default()
                                    .with_partition_index(partition.partition_index)
                                    .with_offset(offset)
                            })
                            .collect();
                        ListOffsetsTopicResponse::default().with_name(topic.name).with_partitions(partitions)
                    })
                    .collect();
                ResponseKind::ListOffsets(ListOffsetsResponse::default().with_topics(topics))
            }
            (ApiKey::Produce, RequestKind::Produce(request)) => {
                let responses = request
                    .topic_data
                    .into_iter()
                    .map(|topic| {
                        let partitions = topic
                            .partition_data
                            .iter()
                            .map(|partition| {
                                PartitionProduceResponse::default()
                                    .with_index(partition.index)
                                    .with_base_offset(42)
                            })
                            .collect();
                        TopicProduceResponse::default()
                            .with_name(topic.name)
                            .with_partition_responses(partitions)
                    })
                    .collect();
                ResponseKind::Produce(ProduceResponse::default().with_responses(responses))
            }
            (api_key, _) => panic!("unexpected {:?} request", api_key),
        }
    }

    async fn cluster() -> KafkaCluster {
        let mock = MockKafka::bind().await;
        let port = mock.port();
        let addr = mock.serve(move |api_key, request| respond(port, api_key, request));

        KafkaCluster::connect(ClusterConfig {
            brokers: vec![addr],
            client_id: "kt-test".into(),
            tls: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn partitions_of_known_and_unknown_topics() {
        let cluster = cluster().await;
        assert_eq!(cluster.partitions(TOPIC).await.unwrap(), vec![0, 1]);
        assert!(cluster.partitions("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_commit_reads_as_none() {
        let cluster = cluster().await;
        assert_eq!(cluster.committed("g", TOPIC, 0).await.unwrap(), None);
        assert_eq!(cluster.committed("g", TOPIC, 1).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn produce_returns_base_offset() {
        let cluster = cluster().await;
        let offset = cluster.produce(TOPIC, 1, None, Some(Bytes::from("v"))).await.unwrap();
        assert_eq!(offset, 42);
    }

    #[tokio::test]
    async fn log_positions_map_to_list_offsets() {
        let cluster = cluster().await;
        assert_eq!(cluster.offset(TOPIC, 0, LogPosition::Oldest).await.unwrap(), 3);
        assert_eq!(cluster.offset(TOPIC, 0, LogPosition::Newest).await.unwrap(), 10);
    }
}
