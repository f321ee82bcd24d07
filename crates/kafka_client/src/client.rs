//! Thin wrapper around rdkafka's `StreamConsumer`.
//!
//! The gateway never commits ahead of processing: auto-commit is disabled
//! and offsets are committed explicitly after each record has been handed
//! to the hub. Every gateway instance joins its own consumer group so all
//! instances observe the full stream.

use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::info;
use uuid::Uuid;

/// A decoded upstream record.
#[derive(Debug, Clone)]
pub struct Record {
    /// Bus topic the record was fetched from.
    pub topic: String,
    /// Record key, if any.
    pub key: Option<String>,
    /// Raw record value.
    pub payload: Vec<u8>,
    /// Source partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

/// Generate a unique per-instance consumer group name.
pub fn consumer_group_name() -> String {
    format!("rango-{}", Uuid::new_v4())
}

/// Wrapper around the upstream bus consumer.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// Create a consumer for `topic` against the given seed brokers and
    /// join `group`. Auto-commit is disabled.
    pub fn connect(brokers: &str, group: &str, topic: &str) -> Result<Self> {
        info!("Creating consumer for '{}' in group '{}'", topic, group);

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .create()
            .context("failed to create consumer")?;

        consumer
            .subscribe(&[topic])
            .context("failed to subscribe to upstream topic")?;

        Ok(Self { consumer })
    }

    /// Await the next record from the bus.
    pub async fn fetch(&self) -> Result<Record> {
        let msg = self.consumer.recv().await.context("fetch failed")?;
        Ok(Record {
            topic: msg.topic().to_string(),
            key: msg
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: msg.partition(),
            offset: msg.offset(),
        })
    }

    /// Commit a record's offset. Called after the record has been handed
    /// to the hub.
    pub fn commit(&self, record: &Record) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &record.topic,
                record.partition,
                Offset::Offset(record.offset + 1),
            )
            .context("invalid offset")?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .context("commit failed")?;
        Ok(())
    }
}
