use log::debug;

use crate::broker::Broker;
use crate::error::Error;

/// Resolves the partitions of `topic`, ascending and without duplicates.
///
/// An empty partition set is reported as [`Error::TopicNotFound`]. With a
/// `filter`, only the listed partitions are returned and each of them must
/// exist.
pub async fn resolve_partitions(broker: &dyn Broker, topic: &str, filter: Option<&[i32]>) -> Result<Vec<i32>, Error> {
    let mut partitions = broker.partitions(topic).await.map_err(|source| Error::Resolution {
        topic: topic.to_string(),
        source,
    })?;
    partitions.sort_unstable();
    partitions.dedup();
    if partitions.is_empty() {
        return Err(Error::TopicNotFound(topic.to_string()));
    }

    let Some(filter) = filter else {
        debug!("Resolved partitions={:?} for topic={}", partitions, topic);
        return Ok(partitions);
    };

    let mut selected = filter.to_vec();
    selected.sort_unstable();
    selected.dedup();
    if let Some(missing) = selected.iter().find(|p| partitions.binary_search(p).is_err()) {
        return Err(Error::Resolution {
            topic: topic.to_string(),
            source: anyhow::anyhow!("partition {} not found", missing),
        });
    }
    if selected.is_empty() {
        return Err(Error::Argument("partition filter selects no partitions".to_string()));
    }
    debug!("Resolved partitions={:?} for topic={}", selected, topic);
    Ok(selected)
}
