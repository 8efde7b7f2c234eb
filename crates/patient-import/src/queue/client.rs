use aws_config::SdkConfig;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::ProvideErrorMetadata;
use async_trait::async_trait;

/// A message to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    /// FIFO ordering scope.
    pub group_id: Option<String>,
    /// FIFO deduplication key.
    pub deduplication_id: Option<String>,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            group_id: None,
            deduplication_id: None,
        }
    }

    pub fn with_fifo(mut self, group_id: impl Into<String>, deduplication_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self.deduplication_id = Some(deduplication_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: Option<String>,
    pub receipt_handle: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueClientError {
    NotFound(String),
    Throttled(String),
    Unavailable(String),
    InvalidInput(String),
    Internal(String),
}

impl std::fmt::Display for QueueClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "queue not found: {msg}"),
            Self::Throttled(msg) => write!(f, "throttled: {msg}"),
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

/// Minimal message queue surface used by the pipeline.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Enqueues a message and returns its id when the transport assigns one.
    async fn send_message(
        &self,
        queue_url: &str,
        message: &OutgoingMessage,
    ) -> Result<Option<String>, QueueClientError>;

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueClientError>;

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), QueueClientError>;
}

#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: Client,
}

impl SqsQueueClient {
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn send_message(
        &self,
        queue_url: &str,
        message: &OutgoingMessage,
    ) -> Result<Option<String>, QueueClientError> {
        let mut req = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(&message.body);

        if let Some(group_id) = &message.group_id {
            req = req.message_group_id(group_id);
        }
        if let Some(deduplication_id) = &message.deduplication_id {
            req = req.message_deduplication_id(deduplication_id);
        }

        let out = req.send().await.map_err(map_sdk_error)?;
        Ok(out.message_id().map(str::to_string))
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueClientError> {
        let out = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(out
            .messages()
            .iter()
            .filter_map(|m| {
                Some(ReceivedMessage {
                    message_id: m.message_id().map(str::to_string),
                    receipt_handle: m.receipt_handle()?.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), QueueClientError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}

fn map_sdk_error<E>(err: aws_sdk_sqs::error::SdkError<E>) -> QueueClientError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let fallback = format!("{err:?}");

    match err {
        aws_sdk_sqs::error::SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or("Unknown");
            let message = service_err
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.clone());
            match code {
                "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
                    QueueClientError::NotFound(message)
                }
                "ThrottlingException" | "RequestThrottled" => QueueClientError::Throttled(message),
                "InvalidParameterValue" | "MissingParameter" | "InvalidMessageContents" => {
                    QueueClientError::InvalidInput(message)
                }
                _ => QueueClientError::Internal(message),
            }
        }
        aws_sdk_sqs::error::SdkError::TimeoutError(_) => QueueClientError::Unavailable(fallback),
        aws_sdk_sqs::error::SdkError::DispatchFailure(_) => QueueClientError::Unavailable(fallback),
        _ => QueueClientError::Internal(fallback),
    }
}
