//! Wire envelope published to the main topic and, augmented, to the DLQ.
//!
//! The envelope is the external contract; field names and the RFC3339/Z
//! timestamp format must stay stable across deployments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub schema_version: u32,
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub aggregate: AggregateRef,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    /// Present only on messages routed to the dead-letter topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlq: Option<DlqInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqInfo {
    pub failed_at: DateTime<Utc>,
    pub attempts: i32,
    pub error: String,
}

impl EventEnvelope {
    /// Structural validation before any publish attempt. An envelope failing
    /// this never goes to the main topic; it takes the DLQ path directly.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_id.is_nil() {
            return Err("missing event_id".to_string());
        }
        if self.event_type.trim().is_empty() {
            return Err("missing type".to_string());
        }
        if self.aggregate.id.is_nil() {
            return Err("missing aggregate.id".to_string());
        }
        Ok(())
    }

    /// Partition key: per-aggregate ordering depends on every event of one
    /// session landing on the same partition.
    pub fn partition_key(&self) -> String {
        self.aggregate.id.to_string()
    }

    pub fn with_dlq(mut self, attempts: i32, error: &str) -> Self {
        self.dlq = Some(DlqInfo {
            failed_at: Utc::now(),
            attempts,
            error: error.to_string(),
        });
        self
    }
}

/// Broker coordinates of a record, carried into the consumer DLQ message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
}

/// Message written to the consumer-side DLQ after processing retries are
/// exhausted. Carries everything needed to replay or diagnose by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerDlqMessage {
    pub dlq_version: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub attempt: u32,
    pub error: String,
    pub src: SourceRef,
    pub message: Option<Value>,
}
