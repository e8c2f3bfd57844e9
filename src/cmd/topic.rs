use tokio::io::AsyncWrite;

use crate::broker::Broker;
use crate::config::TopicConfig;
use crate::error::{Error, Result};
use crate::output::{write_record, TopicRecord};
use crate::resolver::resolve_partitions;

/// Writes one record per topic, sorted by name.
pub async fn run<W>(broker: &dyn Broker, config: &TopicConfig, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut topics = broker.topics().await.map_err(Error::Admin)?;
    topics.sort_unstable();
    topics.dedup();
    if let Some(filter) = &config.filter {
        topics.retain(|name| name == filter);
    }

    for name in topics {
        let partitions = if config.partitions {
            Some(resolve_partitions(broker, &name, None).await?)
        } else {
            None
        };
        write_record(out, &TopicRecord { name, partitions }).await?;
    }
    Ok(())
}
