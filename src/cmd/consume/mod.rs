//! Fans out one reader task per partition and merges their messages into a
//! single output stream.

mod reader;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::ConsumeConfig;
use crate::error::{Error, Result};
use crate::output::{write_diagnostic, write_record, MessageRecord};
use crate::resolver::resolve_partitions;

use reader::{Event, Reader, Termination};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Consumes `config.topic` until every partition went idle or `cancel` fires.
///
/// Messages are written to `out` as they arrive. With a consumer group the
/// offset after the last written message of each partition is committed when
/// the session ends, also after cancellation. Reader failures are reported on
/// `err` and turn into [`Error::Fetch`] once the commit is done.
pub async fn run<W, E>(
    broker: Arc<dyn Broker>,
    config: ConsumeConfig,
    cancel: CancellationToken,
    out: &mut W,
    err: &mut E,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let partitions = resolve_partitions(broker.as_ref(), &config.topic, config.partitions.as_deref()).await?;
    let config = Arc::new(config);

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let handles: Vec<_> = partitions
        .iter()
        .map(|&partition| {
            let reader = Reader::new(broker.clone(), config.clone(), partition, events_tx.clone(), cancel.clone());
            tokio::spawn(reader.run())
        })
        .collect();
    drop(events_tx);
    info!("Consuming topic={} partitions={:?}", config.topic, partitions);

    // partition -> offset of the next message not yet written
    let mut positions: BTreeMap<i32, i64> = BTreeMap::new();
    let mut write_error = None;
    while let Some(event) = events_rx.recv().await {
        match event {
            Event::Started { partition, offset } => {
                positions.insert(partition, offset);
            }
            Event::Message(_) if write_error.is_some() => {}
            Event::Message(message) => match write_record(out, &MessageRecord::from(&message)).await {
                Ok(()) => {
                    positions.insert(message.partition, message.offset + 1);
                }
                Err(e) => {
                    error!("Failed to write message, stopping consumption: {}", e);
                    write_error = Some(e);
                    cancel.cancel();
                }
            },
        }
    }

    let mut failed = Vec::new();
    let mut diagnostics = Vec::new();
    for (partition, outcome) in partitions.iter().zip(join_all(handles).await) {
        match outcome {
            Ok(Ok(Termination::Drained)) => debug!("Partition={} drained", partition),
            Ok(Ok(Termination::Cancelled)) => debug!("Partition={} cancelled", partition),
            Ok(Err(e)) => {
                failed.push(*partition);
                diagnostics.push(format!("failed to consume partition={} of topic={}: {:#}", partition, config.topic, e));
            }
            Err(e) => {
                failed.push(*partition);
                diagnostics.push(format!("reader of partition={} of topic={} aborted: {}", partition, config.topic, e));
            }
        }
    }

    if let Some(group) = &config.group {
        for (&partition, &offset) in &positions {
            match broker.commit(group, &config.topic, partition, offset).await {
                Ok(()) => debug!("Committed offset={} for group={} partition={}", offset, group, partition),
                Err(source) => {
                    let e = Error::Commit {
                        group: group.clone(),
                        partition,
                        source,
                    };
                    warn!("{}", e);
                    diagnostics.push(e.to_string());
                }
            }
        }
    }

    for line in &diagnostics {
        write_diagnostic(err, line).await?;
    }
    if let Some(e) = write_error {
        return Err(e.into());
    }
    if !failed.is_empty() {
        return Err(Error::Fetch {
            topic: config.topic.clone(),
            partitions: failed,
        });
    }
    Ok(())
}
