use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::client::{ListObjectsResult, ObjectClient, ObjectClientError};

/// Object client backed by a local directory, one subdirectory per bucket.
///
/// Used for development runs without an S3 endpoint.
#[derive(Debug, Clone)]
pub struct LocalDirClient {
    root: PathBuf,
}

impl LocalDirClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectClientError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes || bucket.is_empty() || bucket.contains(['/', '\\']) {
            return Err(ObjectClientError::InvalidInput(format!(
                "invalid object location {bucket}/{key}"
            )));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

fn map_io_error(err: std::io::Error) -> ObjectClientError {
    match err.kind() {
        ErrorKind::NotFound => ObjectClientError::NotFound,
        _ => ObjectClientError::Internal(err.to_string()),
    }
}

#[async_trait]
impl ObjectClient for LocalDirClient {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ObjectClientError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(map_io_error(err)),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), ObjectClientError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(map_io_error)?;
        }
        tokio::fs::write(&path, body).await.map_err(map_io_error)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: Option<i32>,
    ) -> Result<ListObjectsResult, ObjectClientError> {
        let bucket_root = self.root.join(bucket);
        let prefix = prefix.to_string();
        let mut keys = tokio::task::spawn_blocking(move || collect_keys(&bucket_root, &prefix))
            .await
            .map_err(|e| ObjectClientError::Internal(format!("listing task failed: {e}")))??;
        keys.sort();

        let start = continuation
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0)
            .min(keys.len());
        let max = max_keys.unwrap_or(1000).max(1) as usize;
        let end = start.saturating_add(max).min(keys.len());

        let next_continuation_token = if end < keys.len() {
            Some(end.to_string())
        } else {
            None
        };
        keys.truncate(end);
        keys.drain(..start);

        Ok(ListObjectsResult {
            keys,
            next_continuation_token,
        })
    }
}

/// Walks `bucket_root` and returns `/`-separated keys starting with `prefix`.
fn collect_keys(bucket_root: &Path, prefix: &str) -> Result<Vec<String>, ObjectClientError> {
    if !bucket_root.is_dir() {
        return Ok(Vec::new());
    }

    let mut keys = Vec::new();
    for entry in WalkDir::new(bucket_root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            // Removed while listing.
            Err(err) if err.io_error().map(std::io::Error::kind) == Some(ErrorKind::NotFound) => {
                continue;
            }
            Err(err) => return Err(ObjectClientError::Internal(err.to_string())),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(bucket_root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if key.starts_with(prefix) {
            keys.push(key);
        }
    }

    Ok(keys)
}
