use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, LogPosition, Message};
use crate::config::{ConsumeConfig, StartOffset};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a reader hands to the coordinator.
#[derive(Debug)]
pub(crate) enum Event {
    /// The reader resolved where it starts; sent before any message.
    Started { partition: i32, offset: i64 },
    Message(Message),
}

/// Why a reader stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    /// No message arrived within the idle timeout.
    Drained,
    Cancelled,
}

/// Consumes a single partition and forwards its messages in offset order.
pub(crate) struct Reader {
    broker: Arc<dyn Broker>,
    config: Arc<ConsumeConfig>,
    partition: i32,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl Reader {
    pub(crate) fn new(
        broker: Arc<dyn Broker>,
        config: Arc<ConsumeConfig>,
        partition: i32,
        events: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            broker,
            config,
            partition,
            events,
            cancel,
        }
    }

    pub(crate) async fn run(self) -> Result<Termination> {
        let topic = &self.config.topic;
        // Not raced against cancellation: dropping a request half way leaves
        // the broker connection out of step.
        let mut next_offset = self.start_offset().await?;
        if self.cancel.is_cancelled() {
            return Ok(Termination::Cancelled);
        }
        let mut fetcher = self.broker.fetcher(topic, self.partition).await?;
        debug!("Reading partition={} of topic={} from offset={}", self.partition, topic, next_offset);

        if !self.send(Event::Started { partition: self.partition, offset: next_offset }).await {
            return Ok(Termination::Cancelled);
        }

        let idle_timeout = self.config.timeout;
        let poll_interval = idle_timeout.map_or(MAX_POLL_INTERVAL, |t| t.min(MAX_POLL_INTERVAL));
        let mut last_activity = Instant::now();
        loop {
            let messages = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Termination::Cancelled),
                fetched = fetcher.fetch(next_offset, poll_interval) => {
                    fetched.with_context(|| format!("fetch from offset {} failed", next_offset))?
                }
            };

            if messages.is_empty() {
                if idle_timeout.is_some_and(|timeout| last_activity.elapsed() >= timeout) {
                    debug!("Partition={} idle, stopping at offset={}", self.partition, next_offset);
                    return Ok(Termination::Drained);
                }
                continue;
            }

            for message in messages {
                if message.offset < next_offset {
                    continue;
                }
                next_offset = message.offset + 1;
                if !self.send(Event::Message(message)).await {
                    return Ok(Termination::Cancelled);
                }
            }
            last_activity = Instant::now();
        }
    }

    /// Explicit offset first, then the group's committed offset, then the
    /// configured sentinel.
    async fn start_offset(&self) -> Result<i64> {
        let topic = &self.config.topic;
        if let Some(StartOffset::Absolute(offset)) = self.config.offset {
            return Ok(offset);
        }
        if let Some(group) = &self.config.group {
            let committed = self
                .broker
                .committed(group, topic, self.partition)
                .await
                .context("failed to fetch committed offset")?;
            if let Some(offset) = committed.filter(|offset| *offset >= 0) {
                return Ok(offset);
            }
        }

        match self.config.fallback_offset() {
            StartOffset::Absolute(offset) => Ok(offset),
            StartOffset::Oldest => self.broker.offset(topic, self.partition, LogPosition::Oldest).await,
            StartOffset::Newest => {
                let oldest = self.broker.offset(topic, self.partition, LogPosition::Oldest).await?;
                let high_water_mark = self.broker.offset(topic, self.partition, LogPosition::Newest).await?;
                Ok(if high_water_mark > oldest {
                    high_water_mark - 1
                } else {
                    high_water_mark
                })
            }
        }
    }

    /// `false` once the session is over and nothing more should be sent.
    async fn send(&self, event: Event) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}
