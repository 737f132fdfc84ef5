use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tags::Tags;

/// One chat line, either received from or sent to the chat server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub from: String,
    /// Starts with `#` for channel messages, empty for whispers and system notices.
    pub channel: String,
    pub tags: Option<Tags>,
}

impl ChatMessage {
    pub fn new(from: impl Into<String>, channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            from: from.into(),
            channel: channel.into(),
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn is_whisper(&self) -> bool {
        self.channel.is_empty()
    }

    /// The display name if the server sent one, the login otherwise.
    pub fn sender_name(&self) -> &str {
        match &self.tags {
            Some(tags) if !tags.display_name.is_empty() => &tags.display_name,
            _ => &self.from,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.tags.as_ref().is_some_and(Tags::is_privileged)
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message from '{}' to '{}': {}", self.from, self.channel, self.text)
    }
}
