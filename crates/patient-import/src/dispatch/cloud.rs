use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::PatientCreateDispatcher;
use crate::error::DispatchError;
use crate::queue::{OutgoingMessage, QueueClient};
use crate::types::PatientCreateRequest;

/// SHA-256 hex digest of a serialized payload.
pub fn deduplication_id(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Enqueues create requests on the FIFO create queue.
///
/// Messages are grouped by customer and deduplicated by payload hash.
#[derive(Clone)]
pub struct CloudCreateDispatcher {
    queue: Arc<dyn QueueClient>,
    queue_url: String,
}

impl CloudCreateDispatcher {
    pub fn new(queue: Arc<dyn QueueClient>, queue_url: impl Into<String>) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl PatientCreateDispatcher for CloudCreateDispatcher {
    async fn process_patient_create(&self, request: PatientCreateRequest) -> Result<(), DispatchError> {
        let row_number = request.row_number;
        let body = serde_json::to_string(&request).map_err(|e| DispatchError::Serialization {
            row_number,
            message: e.to_string(),
        })?;
        let dedup_id = deduplication_id(&body);
        let message = OutgoingMessage::new(body).with_fifo(request.cx_id.clone(), dedup_id);

        let message_id = self
            .queue
            .send_message(&self.queue_url, &message)
            .await
            .map_err(|e| DispatchError::Enqueue {
                row_number,
                message: e.to_string(),
            })?;

        debug!(
            cx_id = %request.cx_id,
            job_id = %request.job_id,
            row_number,
            message_id = ?message_id,
            "create request enqueued"
        );
        Ok(())
    }
}
