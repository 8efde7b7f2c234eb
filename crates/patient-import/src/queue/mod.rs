//! Message queues between pipeline stages.

mod client;
mod memory;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use client::{OutgoingMessage, QueueClient, QueueClientError, ReceivedMessage, SqsQueueClient};
pub use memory::InMemoryQueueClient;

use crate::error::QueueError;

/// Serializes `payload` to JSON and enqueues it.
pub async fn send_json<T: Serialize>(
    client: &dyn QueueClient,
    queue_url: &str,
    payload: &T,
) -> Result<Option<String>, QueueError> {
    let body = encode_body(queue_url, payload)?;
    client
        .send_message(queue_url, &OutgoingMessage::new(body))
        .await
        .map_err(|e| QueueError::Send {
            queue_url: queue_url.to_string(),
            message: e.to_string(),
        })
}

pub fn encode_body<T: Serialize>(queue_url: &str, payload: &T) -> Result<String, QueueError> {
    serde_json::to_string(payload).map_err(|e| QueueError::InvalidBody {
        queue_url: queue_url.to_string(),
        message: e.to_string(),
    })
}

pub fn decode_body<T: DeserializeOwned>(queue_url: &str, message: &ReceivedMessage) -> Result<T, QueueError> {
    serde_json::from_str(&message.body).map_err(|e| QueueError::InvalidBody {
        queue_url: queue_url.to_string(),
        message: e.to_string(),
    })
}
