//! Queue workers running one stage each.
//!
//! A worker long-polls its stage queue, decodes each message into the stage
//! request and runs the stage in process. Parse and create messages are only
//! deleted on success, so failures are redelivered. Result messages are always
//! deleted: the result stage marks the job failed itself.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::dispatch::PatientCreateProcessor;
use crate::error::{ImportError, ImportResult, QueueError};
use crate::parse::ParseOrchestrator;
use crate::queue::{QueueClient, ReceivedMessage, decode_body};
use crate::result::ResultOrchestrator;
use crate::types::{ParseRequest, PatientCreateRequest, ResultRequest};

/// The stage a worker consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStage {
    Parse,
    Create,
    Result,
}

impl fmt::Display for WorkerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Create => write!(f, "create"),
            Self::Result => write!(f, "result"),
        }
    }
}

impl FromStr for WorkerStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parse" => Ok(Self::Parse),
            "create" => Ok(Self::Create),
            "result" => Ok(Self::Result),
            other => Err(format!("unknown worker stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub max_messages: i32,
    pub wait_seconds: i32,
    /// Pause after a failed receive.
    pub error_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_seconds: 20,
            error_backoff: Duration::from_secs(1),
        }
    }
}

enum StageRunner {
    Parse(Arc<ParseOrchestrator>),
    Create(PatientCreateProcessor),
    Result(Arc<ResultOrchestrator>),
}

impl StageRunner {
    fn stage(&self) -> WorkerStage {
        match self {
            Self::Parse(_) => WorkerStage::Parse,
            Self::Create(_) => WorkerStage::Create,
            Self::Result(_) => WorkerStage::Result,
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Processed and deleted.
    Completed,
    /// Left on the queue for redelivery.
    Retained,
    /// Undecodable or finished with a swallowed failure; deleted.
    Discarded,
}

pub struct QueueWorker {
    queue: Arc<dyn QueueClient>,
    queue_url: String,
    runner: StageRunner,
    settings: WorkerSettings,
}

impl QueueWorker {
    pub fn parse(
        queue: Arc<dyn QueueClient>,
        queue_url: String,
        orchestrator: Arc<ParseOrchestrator>,
        settings: WorkerSettings,
    ) -> Self {
        Self::with_runner(queue, queue_url, StageRunner::Parse(orchestrator), settings)
    }

    pub fn create(
        queue: Arc<dyn QueueClient>,
        queue_url: String,
        processor: PatientCreateProcessor,
        settings: WorkerSettings,
    ) -> Self {
        Self::with_runner(queue, queue_url, StageRunner::Create(processor), settings)
    }

    pub fn result(
        queue: Arc<dyn QueueClient>,
        queue_url: String,
        orchestrator: Arc<ResultOrchestrator>,
        settings: WorkerSettings,
    ) -> Self {
        Self::with_runner(queue, queue_url, StageRunner::Result(orchestrator), settings)
    }

    fn with_runner(
        queue: Arc<dyn QueueClient>,
        queue_url: String,
        runner: StageRunner,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            queue_url,
            runner,
            settings,
        }
    }

    pub fn stage(&self) -> WorkerStage {
        self.runner.stage()
    }

    /// Receives one batch and processes its messages in order.
    pub async fn poll_once(&self) -> Result<Vec<MessageOutcome>, QueueError> {
        let messages = self
            .queue
            .receive_messages(
                &self.queue_url,
                self.settings.max_messages,
                self.settings.wait_seconds,
            )
            .await
            .map_err(|e| QueueError::Receive {
                queue_url: self.queue_url.clone(),
                message: e.to_string(),
            })?;

        let mut outcomes = Vec::with_capacity(messages.len());
        for message in &messages {
            outcomes.push(self.handle(message).await);
        }
        Ok(outcomes)
    }

    /// Polls until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(stage = %self.stage(), queue_url = %self.queue_url, "worker started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                polled = self.poll_once() => {
                    if let Err(err) = polled {
                        warn!(stage = %self.stage(), error = %err, "poll failed");
                        tokio::time::sleep(self.settings.error_backoff).await;
                    }
                }
            }
        }

        info!(stage = %self.stage(), "worker stopped");
    }

    /// Processes one message. A message whose delete fails stays in flight and
    /// is reported as [`MessageOutcome::Retained`].
    async fn handle(&self, message: &ReceivedMessage) -> MessageOutcome {
        let mut outcome = match self.process(message).await {
            Ok(()) => MessageOutcome::Completed,
            Err(ImportError::Queue(QueueError::InvalidBody { message: reason, .. })) => {
                error!(
                    stage = %self.stage(),
                    message_id = ?message.message_id,
                    error = %reason,
                    "discarding undecodable message"
                );
                MessageOutcome::Discarded
            }
            Err(err) if self.stage() == WorkerStage::Result => {
                error!(stage = %self.stage(), error = %err, "result stage failed");
                MessageOutcome::Discarded
            }
            Err(err) => {
                warn!(
                    stage = %self.stage(),
                    message_id = ?message.message_id,
                    error = %err,
                    "stage failed, leaving message for redelivery"
                );
                MessageOutcome::Retained
            }
        };

        if outcome != MessageOutcome::Retained {
            if let Err(err) = self
                .queue
                .delete_message(&self.queue_url, &message.receipt_handle)
                .await
            {
                let err = QueueError::Delete {
                    queue_url: self.queue_url.clone(),
                    message: err.to_string(),
                };
                error!(
                    stage = %self.stage(),
                    message_id = ?message.message_id,
                    error = %err,
                    "failed to delete handled message"
                );
                outcome = MessageOutcome::Retained;
            }
        }
        debug!(stage = %self.stage(), outcome = ?outcome, "message handled");
        outcome
    }

    async fn process(&self, message: &ReceivedMessage) -> ImportResult<()> {
        match &self.runner {
            StageRunner::Parse(orchestrator) => {
                let request: ParseRequest = decode_body(&self.queue_url, message)?;
                orchestrator.run(&request).await.map(|_| ())
            }
            StageRunner::Create(processor) => {
                let request: PatientCreateRequest = decode_body(&self.queue_url, message)?;
                Ok(processor.process(&request).await?)
            }
            StageRunner::Result(orchestrator) => {
                let request: ResultRequest = decode_body(&self.queue_url, message)?;
                orchestrator.run(&request).await.map(|_| ())
            }
        }
    }
}
