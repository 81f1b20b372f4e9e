use amq_protocol_types::ShortString;
use lapin::BasicProperties;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

use crate::publishers::PublisherError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message to be published via [`Publisher`](super::Publisher).
///
/// Envelopes are immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    queue_name: String,
    payload: Vec<u8>,
    content_type: String,
}

impl MessageEnvelope {
    /// Build an envelope carrying `payload` as raw bytes.
    pub fn new(
        queue_name: impl Into<String>,
        payload: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Result<Self, PublisherError> {
        let queue_name = queue_name.into();
        if queue_name.trim().is_empty() {
            return Err(PublisherError::EmptyQueueName);
        }
        Ok(Self {
            queue_name,
            payload,
            content_type: content_type.into(),
        })
    }

    /// Serialize `payload` as JSON.
    pub fn json<T: Serialize + ?Sized>(
        queue_name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, PublisherError> {
        let payload = serde_json::to_vec(payload).map_err(PublisherError::Serialization)?;
        Self::new(queue_name, payload, JSON_CONTENT_TYPE)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// AMQP properties for this message: content type, persistent delivery, a fresh
    /// message id and the current timestamp.
    pub fn properties(&self) -> BasicProperties {
        // Delivery mode: Non-persistent (1) or persistent (2).
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(self.content_type.clone()))
            .with_delivery_mode(2)
            .with_message_id(Uuid::new_v4().to_string().into());

        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => properties.with_timestamp(now.as_secs()),
            Err(_) => {
                warn!("System time is before 1970");
                properties
            }
        }
    }
}
