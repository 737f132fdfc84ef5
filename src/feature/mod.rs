// src/feature/mod.rs

use std::sync::{Arc, Mutex, MutexGuard};

use chat_channel::message::ChatMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

pub mod router;

pub use router::{FeatureRouter, extract_trigger};

/// A reply a feature wants the bot to say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureResponse {
    pub message: ChatMessage,
}

impl FeatureResponse {
    pub fn new(message: ChatMessage) -> Self {
        Self { message }
    }
}

/// Handed to every feature in [`Feature::setup`]. Responses travel through
/// it to the processor, which passes them on to the response gate.
#[derive(Debug, Clone)]
pub struct Responder {
    tx: UnboundedSender<FeatureResponse>,
}

impl Responder {
    pub fn new(tx: UnboundedSender<FeatureResponse>) -> Self {
        Self { tx }
    }

    /// A responder plus the receiving end its responses arrive on.
    pub fn channel() -> (Self, UnboundedReceiver<FeatureResponse>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn respond(&self, response: FeatureResponse) {
        if self.tx.send(response).is_err() {
            debug!("response dropped, nobody is listening anymore");
        }
    }
}

/// The capability every bot feature implements.
///
/// `act` runs synchronously inside the dispatch of one message. It may emit
/// at most one response per call, through the responder stored in `setup`,
/// and must not feed messages back into the router.
pub trait Feature: Send {
    /// Used in logs.
    fn name(&self) -> &str;

    /// The command word this feature listens to. `Some("")` means every
    /// message, `None` means the feature is not configured and will never
    /// be called.
    fn trigger(&self) -> Option<&str>;

    /// Called on registration.
    fn setup(&mut self, responder: Responder);

    fn act(&mut self, message: &ChatMessage) -> anyhow::Result<()>;
}

pub type SharedFeature = Arc<Mutex<dyn Feature>>;

pub fn shared<F: Feature + 'static>(feature: F) -> SharedFeature {
    Arc::new(Mutex::new(feature))
}

/// A panicking feature poisons its lock; we keep using it anyway.
pub(crate) fn lock_feature(feature: &SharedFeature) -> MutexGuard<'_, dyn Feature + 'static> {
    feature.lock().unwrap_or_else(|poisoned| {
        warn!("feature lock was poisoned by an earlier panic");
        poisoned.into_inner()
    })
}

/// Who the bot is and where it talks by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub nickname: String,
    pub channel: String,
}

impl BotIdentity {
    pub fn new(nickname: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            channel: channel.into(),
        }
    }

    /// A response to the bot's own channel.
    pub fn response(&self, text: impl Into<String>) -> FeatureResponse {
        FeatureResponse::new(ChatMessage::new(&self.nickname, &self.channel, text))
    }

    /// A response to wherever `message` came from. A whisper has no channel,
    /// so neither has the reply and the gate drops it.
    pub fn reply_to(&self, message: &ChatMessage, text: impl Into<String>) -> FeatureResponse {
        FeatureResponse::new(ChatMessage::new(&self.nickname, &message.channel, text))
    }
}
