use std::collections::BTreeMap;

use bytes::Bytes;
use log::{debug, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

use crate::broker::Broker;
use crate::config::ProduceConfig;
use crate::error::{Error, Result};
use crate::output::{write_record, ProduceSummary};
use crate::resolver::resolve_partitions;

/// One input line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProduceRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub partition: Option<i32>,
}

/// Picks the partition of each record: the requested one when the topic has
/// it, otherwise the next partition in ascending round-robin order.
struct Partitioner {
    partitions: Vec<i32>,
    default: Option<i32>,
    next: usize,
}

impl Partitioner {
    fn new(partitions: Vec<i32>, default: Option<i32>) -> Self {
        let default = default.filter(|p| {
            let valid = partitions.binary_search(p).is_ok();
            if !valid {
                warn!("Ignoring default partition={} not in partitions={:?}", p, partitions);
            }
            valid
        });
        Self {
            partitions,
            default,
            next: 0,
        }
    }

    fn assign(&mut self, requested: Option<i32>) -> i32 {
        match requested {
            Some(p) if self.partitions.binary_search(&p).is_ok() => return p,
            Some(p) => warn!("Requested partition={} does not exist, ignoring it", p),
            None => {}
        }
        if let Some(p) = self.default {
            return p;
        }
        let p = self.partitions[self.next % self.partitions.len()];
        self.next = self.next.wrapping_add(1);
        p
    }
}

/// Sends every record of `input` to `config.topic` and writes one summary per
/// partition written to, ascending by partition, once the input is exhausted.
///
/// Records are sent one at a time. The first malformed line or failed send
/// aborts the run and no summaries are written.
pub async fn run<R, W>(broker: &dyn Broker, config: &ProduceConfig, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let partitions = resolve_partitions(broker, &config.topic, None).await?;
    let mut partitioner = Partitioner::new(partitions, config.partition);
    let mut summaries: BTreeMap<i32, ProduceSummary> = BTreeMap::new();

    let mut lines = input.lines();
    let mut line_number = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(source) => return Err(Error::Input { line: line_number + 1, source }),
        };
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let request: ProduceRequest =
            serde_json::from_str(&line).map_err(|source| Error::Parse { line: line_number, source })?;
        let partition = partitioner.assign(request.partition);
        let offset = broker
            .produce(
                &config.topic,
                partition,
                request.key.map(Bytes::from),
                request.value.map(Bytes::from),
            )
            .await
            .map_err(|source| Error::Produce { line: line_number, source })?;
        debug!("Produced line={} to partition={} offset={}", line_number, partition, offset);

        summaries
            .entry(partition)
            .and_modify(|summary| summary.count += 1)
            .or_insert(ProduceSummary {
                partition,
                count: 1,
                start_offset: offset,
            });
    }

    for summary in summaries.values() {
        write_record(out, summary).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;

    fn config(partition: Option<i32>) -> ProduceConfig {
        ProduceConfig {
            topic: "kt-test".to_string(),
            partition,
        }
    }

    fn summaries(out: Vec<u8>) -> Vec<ProduceSummary> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn single_record_summary() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        let input = r#"{"value":"hello, ab123","key":"xy9","partition":0}"#;

        let mut out = Vec::new();
        run(&broker, &config(None), input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"partition\":0,\"count\":1,\"startOffset\":0}\n"
        );
        let stored = broker.messages("kt-test", 0);
        assert_eq!(stored[0].key, Some(Bytes::from("xy9")));
        assert_eq!(stored[0].value, Some(Bytes::from("hello, ab123")));
    }

    #[tokio::test]
    async fn records_without_partition_are_spread_round_robin() {
        let broker = MemoryBroker::new().with_topic("kt-test", 3);
        let input = "{\"value\":\"a\"}\n{\"value\":\"b\"}\n\n{\"value\":\"c\"}\n{\"value\":\"d\"}\n";

        let mut out = Vec::new();
        run(&broker, &config(None), input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(
            summaries(out),
            vec![
                ProduceSummary { partition: 0, count: 2, start_offset: 0 },
                ProduceSummary { partition: 1, count: 1, start_offset: 0 },
                ProduceSummary { partition: 2, count: 1, start_offset: 0 },
            ]
        );
        assert_eq!(broker.messages("kt-test", 0)[1].value, Some(Bytes::from("d")));
    }

    #[tokio::test]
    async fn default_partition_applies_to_records_without_one() {
        let broker = MemoryBroker::new().with_topic("kt-test", 3);
        let input = "{\"value\":\"a\"}\n{\"value\":\"b\",\"partition\":1}\n{\"value\":\"c\",\"partition\":9}\n";

        let mut out = Vec::new();
        run(&broker, &config(Some(2)), input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(
            summaries(out),
            vec![
                ProduceSummary { partition: 1, count: 1, start_offset: 0 },
                ProduceSummary { partition: 2, count: 2, start_offset: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn start_offset_is_offset_of_first_record() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        broker.produce("kt-test", 0, None, Some(Bytes::from("earlier"))).await.unwrap();

        let mut out = Vec::new();
        let input = "{\"value\":\"a\"}\n{\"value\":\"b\"}\n";
        run(&broker, &config(None), input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(summaries(out), vec![ProduceSummary { partition: 0, count: 2, start_offset: 1 }]);
    }

    #[tokio::test]
    async fn malformed_line_aborts_without_summary() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        let input = "{\"value\":\"a\"}\n\nnot json\n{\"value\":\"b\"}\n";

        let mut out = Vec::new();
        let err = run(&broker, &config(None), input.as_bytes(), &mut out).await.unwrap_err();

        assert!(matches!(err, Error::Parse { line: 3, .. }), "{}", err);
        assert!(out.is_empty());
        assert_eq!(broker.messages("kt-test", 0).len(), 1);
    }

    #[tokio::test]
    async fn unknown_topic_fails_before_reading_input() {
        let broker = MemoryBroker::new();
        let mut out = Vec::new();
        let err = run(&broker, &config(None), "{}".as_bytes(), &mut out).await.unwrap_err();
        assert!(matches!(err, Error::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn failed_send_aborts_with_line_number() {
        let broker = MemoryBroker::new().with_topic("kt-test", 2);
        broker.fail_produces("kt-test", 1);
        let input = "{\"value\":\"a\"}\n{\"value\":\"b\"}\n{\"value\":\"c\"}\n";

        let mut out = Vec::new();
        let err = run(&broker, &config(None), input.as_bytes(), &mut out).await.unwrap_err();

        assert!(matches!(err, Error::Produce { line: 2, .. }), "{}", err);
        assert!(out.is_empty());
        assert_eq!(broker.messages("kt-test", 0).len(), 1);
        assert!(broker.messages("kt-test", 1).is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_reports_its_line() {
        let broker = MemoryBroker::new().with_topic("kt-test", 1);
        let input: &[u8] = b"{\"value\":\"a\"}\n\xff\xfe\n{\"value\":\"b\"}\n";

        let mut out = Vec::new();
        let err = run(&broker, &config(None), input, &mut out).await.unwrap_err();

        assert!(matches!(err, Error::Input { line: 2, .. }), "{}", err);
        assert!(out.is_empty());
        assert_eq!(broker.messages("kt-test", 0).len(), 1);
    }
}
