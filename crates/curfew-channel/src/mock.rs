//! Mock transport for testing

use async_trait::async_trait;
use curfew_api::{InboundEvent, OutboundMessage};
use curfew_util::MessageId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{BotIdentity, ChannelError, ChannelResult, ChatTransport, Polled};

/// In-memory transport that records everything sent through it
pub struct MockTransport {
    handshakes: AtomicU32,
    handshake_failures: Mutex<u32>,
    next_update_id: AtomicI64,
    next_message_id: AtomicI64,
    queue: Mutex<VecDeque<Polled>>,
    poll_failure: Mutex<Option<ChannelError>>,
    last_offset: Mutex<Option<i64>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    answered: Arc<Mutex<Vec<String>>>,

    /// Configure every send to fail with a dropped connection
    pub fail_send: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            handshakes: AtomicU32::new(0),
            handshake_failures: Mutex::new(0),
            next_update_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1000),
            queue: Mutex::new(VecDeque::new()),
            poll_failure: Mutex::new(None),
            last_offset: Mutex::new(None),
            sent: Arc::new(Mutex::new(Vec::new())),
            answered: Arc::new(Mutex::new(Vec::new())),
            fail_send: Arc::new(Mutex::new(false)),
        }
    }

    /// Fail the next `n` handshakes with a refused connection
    pub fn fail_handshakes(&self, n: u32) {
        *self.handshake_failures.lock().unwrap() = n;
    }

    /// Fail the next poll with `error`
    pub fn fail_next_poll(&self, error: ChannelError) {
        *self.poll_failure.lock().unwrap() = Some(error);
    }

    /// Queue an event under the next update id
    pub fn push_event(&self, event: InboundEvent) {
        let update_id = self.next_update_id.fetch_add(1, Ordering::SeqCst);
        self.push_polled(Polled::event(update_id, event));
    }

    /// Queue a raw update; later `push_event` ids continue after it
    pub fn push_polled(&self, polled: Polled) {
        self.next_update_id
            .fetch_max(polled.update_id + 1, Ordering::SeqCst);
        self.queue.lock().unwrap().push_back(polled);
    }

    pub fn handshakes(&self) -> u32 {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Offset passed to the most recent poll
    pub fn last_offset(&self) -> Option<i64> {
        *self.last_offset.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Drain recorded messages
    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Callback ids acknowledged so far
    pub fn answered(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn handshake(&self) -> ChannelResult<BotIdentity> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);

        let mut remaining = self.handshake_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ChannelError::Other("dial tcp: connection refused".into()));
        }

        Ok(BotIdentity {
            id: 1,
            username: "curfew_test_bot".into(),
        })
    }

    async fn poll(&self, offset: i64, timeout: Duration) -> ChannelResult<Vec<Polled>> {
        *self.last_offset.lock().unwrap() = Some(offset);

        if let Some(error) = self.poll_failure.lock().unwrap().take() {
            return Err(error);
        }

        let batch: Vec<Polled> = {
            let mut queue = self.queue.lock().unwrap();
            queue.retain(|p| p.update_id >= offset);
            queue.drain(..).collect()
        };

        if batch.is_empty() {
            tokio::time::sleep(timeout).await;
        }
        Ok(batch)
    }

    async fn send(&self, message: &OutboundMessage) -> ChannelResult<MessageId> {
        if *self.fail_send.lock().unwrap() {
            return Err(ChannelError::Other("connection lost".into()));
        }

        self.sent.lock().unwrap().push(message.clone());
        Ok(message
            .replace
            .unwrap_or_else(|| MessageId::new(self.next_message_id.fetch_add(1, Ordering::SeqCst))))
    }

    async fn answer(&self, callback_id: &str, _text: Option<&str>) -> ChannelResult<()> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}
