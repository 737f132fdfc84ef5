use async_trait::async_trait;
use thiserror::Error;

use crate::{irc::IrcError, message::ChatMessage};

/// Errors a chat transport can return.
#[derive(Error, Debug)]
pub enum TransportError {
    /// `send` or `next_event` before `connect`.
    #[error("transport is not connected")]
    NotConnected,

    /// The connection went away.
    #[error("connection closed")]
    Closed,

    /// The server refused our credentials.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed line: {0}")]
    Malformed(#[from] IrcError),

    #[error("transport error: {0}")]
    Other(String),
}

/// What a transport reports to the bot.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A chat line addressed to a channel we joined, or a whisper.
    Message(ChatMessage),
    /// Something went wrong on the wire. The transport may still be usable.
    Error(String),
}

/// Sending half of a transport. Cheap to obtain, owned by whoever decides
/// when to talk.
pub trait Outbound: Send {
    fn send(&mut self, channel: &str, text: &str) -> Result<(), TransportError>;
}

/// The one trait a chat connection implements.
#[async_trait]
pub trait Transport: Send {
    /// The name of the transport, used in logs.
    fn name(&self) -> String;

    /// Open the connection and join `channel`.
    async fn connect(&mut self, channel: &str) -> Result<(), TransportError>;

    /// A handle to push replies out.
    fn outbound(&self) -> Box<dyn Outbound>;

    /// Wait for the next inbound event. `None` once the connection is gone
    /// for good.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}
