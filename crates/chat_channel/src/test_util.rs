use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    message::ChatMessage,
    transport::{Outbound, Transport, TransportError, TransportEvent},
};

type SentLines = Arc<Mutex<Vec<(String, String)>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport. Inbound events are injected through the
/// [`MockHandle`]; once every handle is dropped the event stream ends.
pub struct MockTransport {
    events: UnboundedReceiver<TransportEvent>,
    sent: SentLines,
    joined: Arc<Mutex<Option<String>>>,
}

#[derive(Clone)]
pub struct MockHandle {
    events: UnboundedSender<TransportEvent>,
    sent: SentLines,
    joined: Arc<Mutex<Option<String>>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let (tx, rx) = unbounded_channel();
        let sent: SentLines = Arc::new(Mutex::new(vec![]));
        let joined = Arc::new(Mutex::new(None));
        let transport = Self {
            events: rx,
            sent: sent.clone(),
            joined: joined.clone(),
        };
        (transport, MockHandle { events: tx, sent, joined })
    }
}

impl MockHandle {
    pub fn inject(&self, msg: ChatMessage) {
        let _ = self.events.send(TransportEvent::Message(msg));
    }

    pub fn inject_error(&self, error: &str) {
        let _ = self.events.send(TransportEvent::Error(error.to_string()));
    }

    /// Every `(channel, text)` pair sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    pub fn joined_channel(&self) -> Option<String> {
        lock(&self.joined).clone()
    }

    /// A standalone outbound recording into the same sent list.
    pub fn outbound(&self) -> RecordingOutbound {
        RecordingOutbound { sent: self.sent.clone() }
    }
}

#[derive(Default)]
pub struct RecordingOutbound {
    sent: SentLines,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }

    pub fn handle(&self) -> RecordingOutbound {
        RecordingOutbound { sent: self.sent.clone() }
    }
}

impl Outbound for RecordingOutbound {
    fn send(&mut self, channel: &str, text: &str) -> Result<(), TransportError> {
        lock(&self.sent).push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> String {
        "mock".into()
    }

    async fn connect(&mut self, channel: &str) -> Result<(), TransportError> {
        *lock(&self.joined) = Some(channel.to_string());
        Ok(())
    }

    fn outbound(&self) -> Box<dyn Outbound> {
        Box::new(RecordingOutbound { sent: self.sent.clone() })
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}
