//! Minimal IRC line codec, enough for a tag-enabled chat server.
//!
//! Line layout: `[@tags ][:prefix ]COMMAND[ params][ :trailing]`

use thiserror::Error;

use crate::{message::ChatMessage, tags::Tags};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrcError {
    #[error("empty line")]
    Empty,
    #[error("line without command: `{0}`")]
    MissingCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcLine {
    /// Raw tag string including the leading `@`.
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    /// Middle params followed by the trailing param, if any.
    pub params: Vec<String>,
}

impl IrcLine {
    pub fn parse(line: &str) -> Result<Self, IrcError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(IrcError::Empty);
        }

        let mut rest = line;
        let mut tags = None;
        let mut prefix = None;

        if rest.starts_with('@') {
            let (t, r) = rest.split_once(' ').unwrap_or((rest, ""));
            tags = Some(t.to_string());
            rest = r.trim_start();
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(p.to_string());
            rest = r.trim_start();
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(IrcError::MissingCommand(line.to_string()));
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, r) = rest.split_once(' ').unwrap_or((rest, ""));
            if !param.is_empty() {
                params.push(param.to_string());
            }
            rest = r;
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split(['!', '@']).next().unwrap_or(p))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Turn a `PRIVMSG` or `WHISPER` into a chat message. Other commands
    /// carry no chat text and yield `None`.
    pub fn into_chat_message(self) -> Option<ChatMessage> {
        let from = self.nick().unwrap_or_default().to_string();
        let channel = match self.command.as_str() {
            "PRIVMSG" => self.param(0)?.to_string(),
            "WHISPER" => String::new(),
            _ => return None,
        };
        if self.params.len() < 2 {
            return None;
        }
        let text = self.trailing().unwrap_or_default().to_string();

        let message = ChatMessage::new(from, channel, text);
        Some(match self.tags.as_deref() {
            Some(raw) => message.with_tags(Tags::parse(raw)),
            None => message,
        })
    }
}

/// Line breaks would let a reply inject extra commands.
fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

pub fn privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}\r\n", sanitize(channel), sanitize(text))
}

pub fn pong(token: &str) -> String {
    format!("PONG :{}\r\n", sanitize(token))
}
