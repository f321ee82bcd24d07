//! Kafka consumer wrapper used by the gateway's ingest loop.

mod client;

pub use client::{consumer_group_name, KafkaConsumer, Record};
