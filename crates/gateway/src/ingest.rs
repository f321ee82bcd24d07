//! Upstream ingest: Kafka → hub fan-out.
//!
//! Pulls records from the bus consumer, hands each one to the hub, then
//! commits the offset. The commit acknowledges handoff, not delivery, so a
//! crash between handoff and commit replays the record and clients may see
//! a duplicate.

use std::sync::Arc;
use std::time::Duration;

use kafka_client::KafkaConsumer;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::Hub;

/// Ingest tuning knobs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Initial retry delay after a fetch error.
    pub backoff_base: Duration,
    /// Upper bound on the retry delay.
    pub backoff_cap: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(5),
        }
    }
}

/// Double a retry delay, saturating at the cap.
fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

/// Drives the upstream consumer and feeds the hub.
pub struct Ingest {
    hub: Arc<Hub>,
    consumer: KafkaConsumer,
    config: IngestConfig,
}

impl Ingest {
    pub fn new(hub: Arc<Hub>, consumer: KafkaConsumer, config: IngestConfig) -> Self {
        Self {
            hub,
            consumer,
            config,
        }
    }

    /// Run the pull loop until shutdown. Fetch errors are retried with
    /// exponential backoff; per-record faults never stop the loop.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!("Ingest loop started");
        let mut delay = self.config.backoff_base;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Ingest received shutdown signal");
                    break;
                }

                fetched = self.consumer.fetch() => match fetched {
                    Ok(record) => {
                        delay = self.config.backoff_base;
                        counter!("gateway_records_received_total").increment(1);

                        // All records arrive on one exchange topic; the
                        // record key carries the routing address.
                        let topic = record
                            .key
                            .as_deref()
                            .filter(|k| !k.is_empty())
                            .unwrap_or(&record.topic);
                        self.hub.broadcast(topic, &record.payload);

                        if let Err(e) = self.consumer.commit(&record) {
                            counter!("gateway_commit_errors_total").increment(1);
                            warn!("Offset commit failed: {:?}", e);
                        } else {
                            debug!(
                                "Committed {}/{}@{}",
                                record.topic, record.partition, record.offset
                            );
                        }
                    }
                    Err(e) => {
                        counter!("gateway_fetch_errors_total").increment(1);
                        warn!("Fetch error: {:?}, retrying in {:?}", e, delay);
                        tokio::time::sleep(delay).await;
                        delay = next_backoff(delay, self.config.backoff_cap);
                    }
                },
            }
        }

        info!("Ingest loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let cap = Duration::from_secs(5);
        let mut d = Duration::from_millis(250);
        let mut seen = Vec::new();
        for _ in 0..6 {
            d = next_backoff(d, cap);
            seen.push(d);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }
}
