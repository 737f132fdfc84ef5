//! Canned answers: `!discord` → "Join us at ...".

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chat_channel::message::ChatMessage;
use serde::{Deserialize, Serialize};

use crate::feature::{BotIdentity, Feature, Responder};

/// Replaced by the name of whoever asked.
pub const VIEWER_PLACEHOLDER: &str = "{Viewer}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticAnswerEntry {
    pub trigger: String,
    pub answer: String,
}

/// Read a JSON list of `{ "trigger": .., "answer": .. }` objects.
pub fn load_answers(path: &Path) -> Result<Vec<StaticAnswerEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("could not read answers file {}", path.display()))?;
    let entries: Vec<StaticAnswerEntry> = serde_json::from_str(&content)
        .with_context(|| format!("answers file {} is not valid", path.display()))?;
    Ok(entries)
}

/// One canned answer, registered under its own trigger.
pub struct StaticAnswer {
    entry: StaticAnswerEntry,
    identity: BotIdentity,
    responder: Option<Responder>,
}

impl StaticAnswer {
    pub fn new(entry: StaticAnswerEntry, identity: BotIdentity) -> Self {
        Self {
            entry,
            identity,
            responder: None,
        }
    }
}

impl Feature for StaticAnswer {
    fn name(&self) -> &str {
        "static_answer"
    }

    fn trigger(&self) -> Option<&str> {
        let trigger = self.entry.trigger.trim_start_matches('!');
        // an empty trigger here is a config mistake, not "answer everything"
        (!trigger.trim().is_empty()).then_some(trigger)
    }

    fn setup(&mut self, responder: Responder) {
        self.responder = Some(responder);
    }

    fn act(&mut self, message: &ChatMessage) -> anyhow::Result<()> {
        if let Some(responder) = &self.responder {
            let text = self.entry.answer.replace(VIEWER_PLACEHOLDER, message.sender_name());
            responder.respond(self.identity.reply_to(message, text));
        }
        Ok(())
    }
}
