use log::info;

use crate::broker::Broker;
use crate::config::AdminConfig;
use crate::error::{Error, Result};

/// Forwards a create or delete request to the cluster.
pub async fn run(broker: &dyn Broker, config: &AdminConfig) -> Result<()> {
    match config {
        AdminConfig::Create {
            name,
            detail,
            validate_only,
        } => {
            broker
                .create_topic(name, detail, *validate_only)
                .await
                .map_err(|e| Error::Admin(e.context(format!("failed to create topic {}", name))))?;
            info!("Created topic={} validate_only={}", name, validate_only);
        }
        AdminConfig::Delete { name } => {
            broker
                .delete_topic(name)
                .await
                .map_err(|e| Error::Admin(e.context(format!("failed to delete topic {}", name))))?;
            info!("Deleted topic={}", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBroker, TopicDetail};

    fn create(name: &str, partitions: i32, validate_only: bool) -> AdminConfig {
        AdminConfig::Create {
            name: name.to_string(),
            detail: TopicDetail {
                num_partitions: partitions,
                replication_factor: 1,
                ..Default::default()
            },
            validate_only,
        }
    }

    #[tokio::test]
    async fn create_and_delete() {
        let broker = MemoryBroker::new();
        run(&broker, &create("fresh", 2, false)).await.unwrap();
        assert_eq!(broker.partitions("fresh").await.unwrap(), vec![0, 1]);

        run(&broker, &AdminConfig::Delete { name: "fresh".into() }).await.unwrap();
        assert!(broker.partitions("fresh").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validate_only_creates_nothing() {
        let broker = MemoryBroker::new();
        run(&broker, &create("fresh", 2, true)).await.unwrap();
        assert!(broker.topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broker_rejection_is_an_admin_error() {
        let broker = MemoryBroker::new().with_topic("taken", 1);
        let err = run(&broker, &create("taken", 1, false)).await.unwrap_err();
        assert!(matches!(err, Error::Admin(_)));
        assert!(std::error::Error::source(&err).is_some());

        let err = run(&broker, &AdminConfig::Delete { name: "missing".into() }).await.unwrap_err();
        assert!(matches!(err, Error::Admin(_)));
    }
}
