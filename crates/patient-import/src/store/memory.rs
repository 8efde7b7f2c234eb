use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::client::{ListObjectsResult, ObjectClient, ObjectClientError};

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<(String, String), Vec<u8>>,
    put_count: u64,
    fail_put_after: Option<u64>,
    fail_put_key_containing: Option<String>,
    fail_gets: bool,
}

/// Object client that keeps everything in process memory.
///
/// Used for dry local runs and tests. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct InMemoryClient {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every put after the first `put_count` fails.
    pub fn set_fail_put_after(&self, put_count: u64) {
        self.lock().fail_put_after = Some(put_count);
    }

    /// Puts to keys containing `fragment` fail.
    pub fn set_fail_put_key_containing(&self, fragment: impl Into<String>) {
        self.lock().fail_put_key_containing = Some(fragment.into());
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.lock().fail_gets = fail;
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectClient for InMemoryClient {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ObjectClientError> {
        let state = self.lock();
        if state.fail_gets {
            return Err(ObjectClientError::Unavailable("forced get failure".to_string()));
        }
        Ok(state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), ObjectClientError> {
        let mut state = self.lock();
        state.put_count += 1;
        if let Some(fail_after) = state.fail_put_after {
            if state.put_count > fail_after {
                return Err(ObjectClientError::Internal("forced put failure".to_string()));
            }
        }
        if let Some(fragment) = &state.fail_put_key_containing {
            if key.contains(fragment.as_str()) {
                return Err(ObjectClientError::Internal("forced put failure".to_string()));
            }
        }
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: Option<i32>,
    ) -> Result<ListObjectsResult, ObjectClientError> {
        let state = self.lock();
        let keys: Vec<String> = state
            .objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect();

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

        Ok(ListObjectsResult {
            keys: keys[start..end].to_vec(),
            next_continuation_token,
        })
    }
}
