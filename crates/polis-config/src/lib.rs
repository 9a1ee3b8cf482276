//! Daemon configuration, built once at startup from environment variables.
//!
//! Every knob lives on a config value that is constructed in `main` and passed
//! down; nothing in the workspace reads the environment after startup.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const ENV_KAFKA_BOOTSTRAP: &str = "POLIS_KAFKA_BOOTSTRAP";
pub const ENV_KAFKA_TOPIC: &str = "POLIS_KAFKA_TOPIC";
pub const ENV_KAFKA_DLQ_TOPIC: &str = "POLIS_KAFKA_DLQ_TOPIC";

pub const ENV_OUTBOX_BATCH_SIZE: &str = "POLIS_OUTBOX_BATCH_SIZE";
pub const ENV_OUTBOX_MAX_ATTEMPTS: &str = "POLIS_OUTBOX_MAX_ATTEMPTS";
pub const ENV_OUTBOX_LOCK_TTL_SEC: &str = "POLIS_OUTBOX_LOCK_TTL_SEC";
pub const ENV_OUTBOX_PUBLISH_TIMEOUT_SEC: &str = "POLIS_OUTBOX_PUBLISH_TIMEOUT_SEC";
pub const ENV_OUTBOX_IDLE_SLEEP_SEC: &str = "POLIS_OUTBOX_IDLE_SLEEP_SEC";

pub const ENV_CONSUMER_GROUP: &str = "POLIS_CONSUMER_GROUP";
pub const ENV_CONSUMER_MAX_ATTEMPTS: &str = "POLIS_CONSUMER_MAX_ATTEMPTS";
pub const ENV_CONSUMER_BACKOFF_SEC: &str = "POLIS_CONSUMER_BACKOFF_SEC";
pub const ENV_CONSUMER_METRICS_EVERY_SEC: &str = "POLIS_CONSUMER_METRICS_EVERY_SEC";

/// Broker endpoints and topic names shared by relay and consumer.
#[derive(Debug, Clone, Serialize)]
pub struct KafkaConfig {
    pub bootstrap: String,
    pub topic: String,
    pub dlq_topic: String,
}

impl KafkaConfig {
    pub fn from_env() -> Result<Self> {
        let bootstrap = env_string(ENV_KAFKA_BOOTSTRAP, "localhost:19092");
        let topic = env_string(ENV_KAFKA_TOPIC, "game-events");
        let dlq_topic = env_string(ENV_KAFKA_DLQ_TOPIC, &format!("{topic}.dlq"));
        Ok(Self {
            bootstrap,
            topic,
            dlq_topic,
        })
    }

    /// Cheap broker liveness probe for readiness checks: can we open a TCP
    /// connection to the first bootstrap endpoint. Says nothing about the
    /// protocol, which is fine for a `--check` exit code.
    pub fn tcp_ping(&self, timeout: Duration) -> bool {
        use std::net::{TcpStream, ToSocketAddrs};

        let Some(endpoint) = self.bootstrap.split(',').next() else {
            return false;
        };
        let Ok(mut addrs) = endpoint.to_socket_addrs() else {
            return false;
        };
        let Some(addr) = addrs.next() else {
            return false;
        };
        TcpStream::connect_timeout(&addr, timeout).is_ok()
    }
}

/// Relay (outbox publisher) runtime knobs.
#[derive(Debug, Clone, Serialize)]
pub struct RelayConfig {
    pub kafka: KafkaConfig,
    /// Rows reserved per polling cycle.
    pub batch_size: i64,
    /// Publish attempts before the DLQ path takes over.
    pub max_attempts: i32,
    /// Lease duration; expired leases are reclaimed by any relay.
    pub lock_ttl_secs: i64,
    pub publish_timeout_secs: f64,
    pub idle_sleep_secs: f64,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            kafka: KafkaConfig::from_env()?,
            batch_size: env_parse(ENV_OUTBOX_BATCH_SIZE, 50)?,
            max_attempts: env_parse(ENV_OUTBOX_MAX_ATTEMPTS, 10)?,
            lock_ttl_secs: env_parse(ENV_OUTBOX_LOCK_TTL_SEC, 30)?,
            publish_timeout_secs: env_parse(ENV_OUTBOX_PUBLISH_TIMEOUT_SEC, 10.0)?,
            idle_sleep_secs: env_parse(ENV_OUTBOX_IDLE_SLEEP_SEC, 0.5)?,
        })
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.publish_timeout_secs)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.idle_sleep_secs)
    }

    pub fn fingerprint(&self) -> String {
        config_fingerprint(self)
    }
}

/// Consumer runtime knobs.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerConfig {
    pub kafka: KafkaConfig,
    pub group_id: String,
    /// Processing attempts per record before the consumer DLQ path.
    pub max_attempts: u32,
    /// Base retry delay; doubles per attempt, capped at ~2s.
    pub base_backoff_secs: f64,
    pub metrics_every_secs: f64,
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            kafka: KafkaConfig::from_env()?,
            group_id: env_string(ENV_CONSUMER_GROUP, "game-consumer-v1"),
            max_attempts: env_parse(ENV_CONSUMER_MAX_ATTEMPTS, 5)?,
            base_backoff_secs: env_parse(ENV_CONSUMER_BACKOFF_SEC, 0.2)?,
            metrics_every_secs: env_parse(ENV_CONSUMER_METRICS_EVERY_SEC, 10.0)?,
        })
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.base_backoff_secs)
    }

    pub fn metrics_every(&self) -> Duration {
        Duration::from_secs_f64(self.metrics_every_secs)
    }

    pub fn fingerprint(&self) -> String {
        config_fingerprint(self)
    }
}

/// Identity stamped on outbox leases: `<host>:<pid>`.
///
/// Not a hardware id; just enough to tell relay instances apart in
/// `lock_owner` and in logs.
pub fn worker_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{host}:{}", std::process::id())
}

fn env_string(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: {v:?}")),
        _ => Ok(default),
    }
}

/// Short sha256 over canonical (sorted-keys, compact) JSON of a config value.
/// Logged at daemon startup so operators can tell two configurations apart.
pub fn config_fingerprint<T: Serialize>(cfg: &T) -> String {
    let raw = serde_json::to_value(cfg).expect("config serialization must not fail");
    let canonical = serde_json::to_string(&sort_keys(&raw)).expect("json stringify must not fail");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
