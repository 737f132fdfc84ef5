use chat_channel::message::ChatMessage;

use crate::feature::{BotIdentity, Feature, Responder};

/// Repeats whatever it hears. Handy to check a deployment end to end.
pub struct Loopback {
    identity: BotIdentity,
    trigger: String,
    responder: Option<Responder>,
}

impl Loopback {
    pub fn new(identity: BotIdentity, trigger: impl Into<String>) -> Self {
        Self {
            identity,
            trigger: trigger.into(),
            responder: None,
        }
    }
}

impl Feature for Loopback {
    fn name(&self) -> &str {
        "loopback"
    }

    fn trigger(&self) -> Option<&str> {
        Some(&self.trigger)
    }

    fn setup(&mut self, responder: Responder) {
        self.responder = Some(responder);
    }

    fn act(&mut self, message: &ChatMessage) -> anyhow::Result<()> {
        if let Some(responder) = &self.responder {
            responder.respond(self.identity.reply_to(message, message.text.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_text() {
        let (responder, mut rx) = Responder::channel();
        let mut feature = Loopback::new(BotIdentity::new("wishbot", "#dallas"), "");
        feature.setup(responder);
        feature.act(&ChatMessage::new("bob", "#dallas", "hello there")).unwrap();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.message.text, "hello there");
        assert_eq!(response.message.from, "wishbot");
    }
}
