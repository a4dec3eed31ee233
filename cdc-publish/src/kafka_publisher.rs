use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cdc_common::{CResult, ChangeEvent, Metrics, ReError};
use cdc_config::BrokerSpec;
use dashmap::DashMap;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, warn};

use crate::publisher::Publisher;

const DEFAULT_IN_FLIGHT_WINDOW: usize = 256;
const DEFAULT_RETRY_DEADLINE: Duration = Duration::from_secs(60);
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// `rdkafka`-backed `Publisher`. Bounds in-flight sends with a semaphore
/// (spec §4.5 backpressure) and serializes sends for the same message key
/// behind a per-key mutex so acknowledgement order matches send order.
pub struct KafkaPublisher {
    producer: FutureProducer,
    broker: BrokerSpec,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    in_flight: Arc<Semaphore>,
    retry_deadline: Duration,
    metrics: Arc<Metrics>,
}

impl KafkaPublisher {
    pub fn new(broker: BrokerSpec, metrics: Arc<Metrics>) -> CResult<Self> {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", broker.brokers.join(","));
        client_config.set("message.timeout.ms", SEND_TIMEOUT.as_millis().to_string());
        apply_security(&mut client_config, &broker);
        for (key, value) in &broker.producer_properties {
            client_config.set(key, value);
        }

        let producer: FutureProducer =
            client_config.create().map_err(|e| ReError::BrokerUnavailable(format!("cannot construct Kafka producer: {e}")))?;

        Ok(KafkaPublisher {
            producer,
            broker,
            key_locks: DashMap::new(),
            in_flight: Arc::new(Semaphore::new(DEFAULT_IN_FLIGHT_WINDOW)),
            retry_deadline: DEFAULT_RETRY_DEADLINE,
            metrics,
        })
    }

    pub fn with_in_flight_window(mut self, window: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(window));
        self
    }

    pub fn with_retry_deadline(mut self, deadline: Duration) -> Self {
        self.retry_deadline = deadline;
        self
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

fn apply_security(client_config: &mut ClientConfig, broker: &BrokerSpec) {
    let Some(security) = &broker.security else { return };

    use cdc_config::{SaslMechanism, SecurityProtocol};
    let protocol = match security.protocol {
        SecurityProtocol::Ssl => "ssl",
        SecurityProtocol::SaslSsl => "sasl_ssl",
        SecurityProtocol::SaslPlaintext => "sasl_plaintext",
    };
    client_config.set("security.protocol", protocol);

    if let Some(mechanism) = security.mechanism {
        let mechanism = match mechanism {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        };
        client_config.set("sasl.mechanism", mechanism);
    }
    if let Some(username) = &security.username {
        client_config.set("sasl.username", username);
    }
    if let Some(password) = &security.password {
        client_config.set("sasl.password", password);
    }
    if let Some(truststore) = &security.truststore {
        client_config.set("ssl.truststore.location", &truststore.path);
        client_config.set("ssl.truststore.password", &truststore.password);
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, event: &ChangeEvent, key_columns: &[String]) -> CResult<()> {
        let topic = self.broker.resolve_topic(&event.table.database, &event.table.table);
        let key = event
            .after
            .as_ref()
            .or(event.before.as_ref())
            .map(|row| row.stable_key(key_columns))
            .unwrap_or_default();

        let body = serde_json::to_vec(event).map_err(|e| ReError::SerializationError(format!("cannot serialize change event: {e}")))?;

        let _permit = self.in_flight.acquire().await.map_err(|e| ReError::Bug(format!("publisher semaphore closed: {e}")))?;
        let key_lock = self.key_lock(&key);
        let _key_guard = key_lock.lock().await;

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let record = FutureRecord::to(&topic).payload(&body).key(&key);
            match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
                Ok(_delivery) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.metrics.record_published(latency_ms);
                    return Ok(());
                }
                Err((kafka_error, _owned_message)) => {
                    if started.elapsed() >= self.retry_deadline {
                        self.metrics.record_failed();
                        error!(topic = %topic, error = %kafka_error, "publish retry deadline exceeded; event counted as failed");
                        return Err(ReError::BrokerUnavailable(format!("deadline exceeded publishing to {topic}: {kafka_error}")));
                    }
                    warn!(topic = %topic, error = %kafka_error, backoff_ms = backoff.as_millis(), "retrying publish");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
