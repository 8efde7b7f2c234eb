use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;

#[derive(Debug, Clone)]
pub struct ListObjectsResult {
    pub keys: Vec<String>,
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectClientError {
    NotFound,
    Throttled(String),
    Unavailable(String),
    InvalidInput(String),
    Internal(String),
}

impl std::fmt::Display for ObjectClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Throttled(msg) => write!(f, "throttled: {msg}"),
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

/// Minimal object store surface used by the pipeline.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str)
    -> Result<Option<Vec<u8>>, ObjectClientError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectClientError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: Option<i32>,
    ) -> Result<ListObjectsResult, ObjectClientError>;
}

#[derive(Debug, Clone)]
pub struct AwsS3Client {
    client: Client,
}

impl AwsS3Client {
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Builds a client for an S3-compatible endpoint (for example, MinIO).
    pub fn with_endpoint(config: &SdkConfig, endpoint_url: &str) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(s3_config),
        }
    }

    pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        loader.load().await
    }
}

#[async_trait]
impl ObjectClient for AwsS3Client {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ObjectClientError> {
        match self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => {
                let bytes = out
                    .body
                    .collect()
                    .await
                    .map_err(|e| {
                        ObjectClientError::Internal(format!("failed to collect object body: {e}"))
                    })?
                    .into_bytes()
                    .to_vec();
                Ok(Some(bytes))
            }
            Err(err) => match map_sdk_error(err) {
                ObjectClientError::NotFound => Ok(None),
                mapped => Err(mapped),
            },
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectClientError> {
        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body));

        if let Some(content_type) = content_type {
            req = req.content_type(content_type);
        }

        req.send().await.map_err(map_sdk_error)?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: Option<i32>,
    ) -> Result<ListObjectsResult, ObjectClientError> {
        let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);

        if let Some(token) = continuation {
            req = req.continuation_token(token);
        }
        if let Some(max_keys) = max_keys {
            req = req.max_keys(max_keys);
        }

        let out = req.send().await.map_err(map_sdk_error)?;
        let keys = out
            .contents()
            .iter()
            .filter_map(|item| item.key().map(str::to_string))
            .collect();

        Ok(ListObjectsResult {
            keys,
            next_continuation_token: out.next_continuation_token().map(|s| s.to_string()),
        })
    }
}

fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> ObjectClientError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let fallback = format!("{err:?}");

    match err {
        aws_sdk_s3::error::SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or("Unknown");
            let message = service_err
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.clone());
            match code {
                "NoSuchKey" | "NotFound" | "NoSuchBucket" => ObjectClientError::NotFound,
                "SlowDown" | "Throttling" | "ThrottlingException" => {
                    ObjectClientError::Throttled(message)
                }
                "InvalidBucketName" | "InvalidArgument" => ObjectClientError::InvalidInput(message),
                _ => ObjectClientError::Internal(message),
            }
        }
        aws_sdk_s3::error::SdkError::TimeoutError(_) => ObjectClientError::Unavailable(fallback),
        aws_sdk_s3::error::SdkError::DispatchFailure(_) => {
            ObjectClientError::Unavailable(fallback)
        }
        _ => ObjectClientError::Internal(fallback),
    }
}
