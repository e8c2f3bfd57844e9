use log::debug;
use tokio::io::AsyncWrite;

use crate::broker::{Broker, LogPosition};
use crate::config::{GroupConfig, GroupMode};
use crate::error::{Error, Result};
use crate::output::{write_diagnostic, write_record, GroupOffsetsView, PartitionOffset};
use crate::resolver::resolve_partitions;

/// Offset reported for partitions the group never committed to.
const NO_COMMIT: i64 = -1;

/// Lists or resets the committed offsets of a consumer group.
pub async fn run<W, E>(broker: &dyn Broker, config: &GroupConfig, out: &mut W, err: &mut E) -> Result<()>
where
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let partitions = resolve_partitions(broker, &config.topic, config.partitions.as_deref()).await?;
    match config.mode {
        GroupMode::List => list(broker, config, &partitions, out, err).await,
        GroupMode::Reset(offset) => reset(broker, config, &partitions, offset, out).await,
    }
}

async fn list<W, E>(broker: &dyn Broker, config: &GroupConfig, partitions: &[i32], out: &mut W, err: &mut E) -> Result<()>
where
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    write_diagnostic(err, &format!("found partitions={:?} for topic={}", partitions, config.topic)).await?;
    let Some(group) = &config.group else {
        return Ok(());
    };

    let mut offsets = Vec::with_capacity(partitions.len());
    for &partition in partitions {
        let high_water_mark = broker
            .offset(&config.topic, partition, LogPosition::Newest)
            .await
            .map_err(|source| Error::Resolution {
                topic: config.topic.clone(),
                source,
            })?;
        let offset = committed(broker, group, &config.topic, partition).await?;
        if offset >= 0 {
            debug!(
                "group={} partition={} offset={} high_water_mark={} lag={}",
                group,
                partition,
                offset,
                high_water_mark,
                high_water_mark - offset
            );
        } else {
            debug!("group={} partition={} has no commit, high_water_mark={}", group, partition, high_water_mark);
        }
        offsets.push(PartitionOffset { partition, offset });
    }

    write_view(out, group, &config.topic, offsets).await
}

/// Commits `offset` for every partition as is. Whether it lies within the
/// partition's log is left to the broker on the next fetch.
async fn reset<W>(broker: &dyn Broker, config: &GroupConfig, partitions: &[i32], offset: i64, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(group) = &config.group else {
        return Err(Error::Argument("group is required to reset offsets".to_string()));
    };

    for &partition in partitions {
        broker
            .commit(group, &config.topic, partition, offset)
            .await
            .map_err(|source| Error::Commit {
                group: group.clone(),
                partition,
                source,
            })?;
        debug!("Reset group={} partition={} to offset={}", group, partition, offset);
    }

    let mut offsets = Vec::with_capacity(partitions.len());
    for &partition in partitions {
        let offset = committed(broker, group, &config.topic, partition).await?;
        offsets.push(PartitionOffset { partition, offset });
    }
    write_view(out, group, &config.topic, offsets).await
}

async fn committed(broker: &dyn Broker, group: &str, topic: &str, partition: i32) -> Result<i64> {
    let offset = broker
        .committed(group, topic, partition)
        .await
        .map_err(|source| Error::Resolution {
            topic: topic.to_string(),
            source: source.context(format!("failed to fetch offset of group {} for partition {}", group, partition)),
        })?;
    Ok(offset.unwrap_or(NO_COMMIT))
}

async fn write_view<W>(out: &mut W, group: &str, topic: &str, offsets: Vec<PartitionOffset>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let view = GroupOffsetsView {
        name: group.to_string(),
        topic: topic.to_string(),
        offsets,
    };
    write_record(out, &view).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use bytes::Bytes;

    fn config(group: Option<&str>, mode: GroupMode, partitions: Option<Vec<i32>>) -> GroupConfig {
        GroupConfig {
            topic: "kt-test".to_string(),
            group: group.map(str::to_string),
            mode,
            partitions,
        }
    }

    async fn run_group(broker: &MemoryBroker, config: &GroupConfig) -> (Result<()>, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = run(broker, config, &mut out, &mut err).await;
        (result, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[tokio::test]
    async fn list_without_group_only_reports_partitions() {
        let broker = MemoryBroker::new().with_topic("kt-test", 2);
        let (result, out, err) = run_group(&broker, &config(None, GroupMode::List, None)).await;
        result.unwrap();
        assert!(out.is_empty());
        assert_eq!(err, "found partitions=[0, 1] for topic=kt-test\n");
    }

    #[tokio::test]
    async fn list_reports_missing_commits_as_minus_one() {
        let broker = MemoryBroker::new().with_topic("kt-test", 2);
        broker.commit("hans", "kt-test", 1, 4).await.unwrap();

        let (result, out, _) = run_group(&broker, &config(Some("hans"), GroupMode::List, None)).await;
        result.unwrap();
        let view: GroupOffsetsView = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(
            view,
            GroupOffsetsView {
                name: "hans".into(),
                topic: "kt-test".into(),
                offsets: vec![
                    PartitionOffset { partition: 0, offset: -1 },
                    PartitionOffset { partition: 1, offset: 4 },
                ],
            }
        );
    }

    #[tokio::test]
    async fn reset_then_list_round_trip() {
        let broker = MemoryBroker::new().with_topic("kt-test", 2);
        for value in ["a", "b"] {
            broker.produce("kt-test", 0, None, Some(Bytes::from(value))).await.unwrap();
        }

        let (result, out, _) = run_group(&broker, &config(Some("hans"), GroupMode::Reset(1), Some(vec![0]))).await;
        result.unwrap();
        assert_eq!(out, "{\"name\":\"hans\",\"topic\":\"kt-test\",\"offsets\":[{\"partition\":0,\"offset\":1}]}\n");

        let (result, out, _) = run_group(&broker, &config(Some("hans"), GroupMode::List, Some(vec![0]))).await;
        result.unwrap();
        let view: GroupOffsetsView = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(view.offsets, vec![PartitionOffset { partition: 0, offset: 1 }]);
    }

    #[tokio::test]
    async fn reset_beyond_log_end_is_accepted() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        let (result, _, _) = run_group(&broker, &config(Some("hans"), GroupMode::Reset(1000), None)).await;
        result.unwrap();
        assert_eq!(broker.committed("hans", "kt-test", 0).await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn reset_commit_failure_is_fatal() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        broker.fail_commits();
        let (result, out, _) = run_group(&broker, &config(Some("hans"), GroupMode::Reset(0), None)).await;
        assert!(matches!(result, Err(Error::Commit { partition: 0, .. })));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn unknown_filtered_partition_fails() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        let (result, _, _) = run_group(&broker, &config(Some("hans"), GroupMode::List, Some(vec![3]))).await;
        assert!(matches!(result, Err(Error::Resolution { .. })));
    }
}
