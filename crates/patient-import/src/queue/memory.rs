use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::client::{OutgoingMessage, QueueClient, QueueClientError, ReceivedMessage};

#[derive(Debug, Default)]
struct QueueState {
    ready: HashMap<String, VecDeque<(String, OutgoingMessage)>>,
    in_flight: HashMap<String, (String, String, OutgoingMessage)>,
    sent: Vec<(String, OutgoingMessage)>,
    next_id: u64,
    fail_sends: bool,
    failing_deletes: usize,
}

/// Queue client that keeps messages in process memory.
///
/// Received messages stay in flight until deleted or returned with
/// [`InMemoryQueueClient::release_in_flight`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueClient {
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Fails the next `count` deletes, leaving those messages in flight.
    pub fn fail_next_deletes(&self, count: usize) {
        self.lock().failing_deletes = count;
    }

    /// Every message ever sent to `queue_url`, in send order.
    pub fn sent(&self, queue_url: &str) -> Vec<OutgoingMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|(url, _)| url == queue_url)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn ready_count(&self, queue_url: &str) -> usize {
        self.lock().ready.get(queue_url).map_or(0, VecDeque::len)
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Makes undeleted messages visible again.
    pub fn release_in_flight(&self) {
        let mut state = self.lock();
        let in_flight: Vec<_> = state.in_flight.drain().map(|(_, v)| v).collect();
        for (queue_url, id, message) in in_flight {
            state
                .ready
                .entry(queue_url)
                .or_default()
                .push_back((id, message));
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn send_message(
        &self,
        queue_url: &str,
        message: &OutgoingMessage,
    ) -> Result<Option<String>, QueueClientError> {
        let mut state = self.lock();
        if state.fail_sends {
            return Err(QueueClientError::Unavailable("forced send failure".to_string()));
        }
        state.next_id += 1;
        let id = format!("msg-{}", state.next_id);
        state.sent.push((queue_url.to_string(), message.clone()));
        state
            .ready
            .entry(queue_url.to_string())
            .or_default()
            .push_back((id.clone(), message.clone()));
        Ok(Some(id))
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
        _wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueClientError> {
        let mut state = self.lock();
        let mut received = Vec::new();
        for _ in 0..max_messages.max(1) {
            let Some((id, message)) = state.ready.get_mut(queue_url).and_then(VecDeque::pop_front)
            else {
                break;
            };
            state.next_id += 1;
            let receipt_handle = format!("receipt-{}", state.next_id);
            received.push(ReceivedMessage {
                message_id: Some(id.clone()),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
            });
            state
                .in_flight
                .insert(receipt_handle, (queue_url.to_string(), id, message));
        }
        Ok(received)
    }

    async fn delete_message(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), QueueClientError> {
        let mut state = self.lock();
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(QueueClientError::Unavailable("forced delete failure".to_string()));
        }
        match state.in_flight.remove(receipt_handle) {
            Some(_) => Ok(()),
            None => Err(QueueClientError::InvalidInput(format!(
                "unknown receipt handle {receipt_handle}"
            ))),
        }
    }
}
