//! The parse stage.
//!
//! [`ParseOrchestrator`] is the throttle and failure containment core of the
//! pipeline. Rows are dispatched in chunks of [`ThrottleSettings::chunk_size`],
//! concurrently within a chunk, with a fixed [`ThrottleSettings::chunk_delay`]
//! between chunks. A row whose dispatch fails is recorded as failed right away
//! and never aborts the job.

mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

pub use orchestrator::{ParseOrchestrator, ParseOutcome};

use crate::error::ImportResult;
use crate::queue::{QueueClient, send_json};
use crate::types::ParseRequest;

/// Default number of rows dispatched concurrently.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// Default pause between chunks.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Static rate limit for row dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

/// Starts the parse stage of a job.
#[async_trait]
pub trait ParseHandler: Send + Sync {
    async fn process_job_parse(&self, request: ParseRequest) -> ImportResult<()>;
}

/// Runs the parse stage in process.
pub struct ParseHandlerLocal {
    orchestrator: Arc<ParseOrchestrator>,
}

impl ParseHandlerLocal {
    pub fn new(orchestrator: Arc<ParseOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ParseHandler for ParseHandlerLocal {
    async fn process_job_parse(&self, request: ParseRequest) -> ImportResult<()> {
        self.orchestrator.run(&request).await.map(|_| ())
    }
}

/// Enqueues the parse request for a worker.
pub struct ParseHandlerCloud {
    queue: Arc<dyn QueueClient>,
    queue_url: String,
}

impl ParseHandlerCloud {
    pub fn new(queue: Arc<dyn QueueClient>, queue_url: impl Into<String>) -> Self {
        Self {
            queue,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl ParseHandler for ParseHandlerCloud {
    async fn process_job_parse(&self, request: ParseRequest) -> ImportResult<()> {
        let message_id = send_json(self.queue.as_ref(), &self.queue_url, &request).await?;
        info!(
            cx_id = %request.cx_id,
            job_id = %request.job_id,
            message_id = ?message_id,
            "parse request enqueued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueueClient;

    #[test]
    fn test_default_throttle() {
        let throttle = ThrottleSettings::default();
        assert_eq!(throttle.chunk_size, 5);
        assert_eq!(throttle.chunk_delay, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_cloud_handler_enqueues() {
        let queue = InMemoryQueueClient::new();
        let handler = ParseHandlerCloud::new(Arc::new(queue.clone()), "parse-queue");
        handler
            .process_job_parse(ParseRequest::new("cx", "job"))
            .await
            .unwrap();

        let sent = queue.sent("parse-queue");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].group_id.is_none());
        let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(body["cxId"], "cx");
        assert_eq!(body["forceStatusUpdate"], false);
    }
}
