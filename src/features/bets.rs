//! Betting on real outcomes instead of a virtual currency and a dice roll.
//!
//! The streamer (or a moderator) opens a round, viewers place a guess with
//! `!bet <choice>`, the round is closed and finally resolved with
//! `!bet result <outcome>`.

use chat_channel::message::ChatMessage;
use tracing::{debug, info};

use crate::feature::{BotIdentity, Feature, Responder};

pub const TRIGGER: &str = "bet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BetState {
    #[default]
    Idle,
    Open,
    WaitingForResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bet {
    user: String,
    text: String,
}

pub struct Bets {
    identity: BotIdentity,
    /// Login that may run rounds besides moderators and the broadcaster.
    owner: String,
    state: BetState,
    bets: Vec<Bet>,
    responder: Option<Responder>,
}

impl Bets {
    pub fn new(identity: BotIdentity, owner: impl Into<String>) -> Self {
        Self {
            identity,
            owner: owner.into(),
            state: BetState::Idle,
            bets: vec![],
            responder: None,
        }
    }

    pub fn state(&self) -> BetState {
        self.state
    }

    fn is_admin(&self, message: &ChatMessage) -> bool {
        message.from.eq_ignore_ascii_case(&self.owner) || message.is_privileged()
    }

    fn admin_command(&mut self, command: &str, argument: &str) -> Option<String> {
        match (self.state, command) {
            (BetState::Idle, "open") => {
                self.state = BetState::Open;
                info!("bets are open");
                Some(format!("Place your bet by entering !{TRIGGER} <choice>"))
            }
            (BetState::Open, "close") => {
                self.state = BetState::WaitingForResult;
                info!(bets = self.bets.len(), "bets are closed");
                Some("Bets are closed!".into())
            }
            (BetState::WaitingForResult, "result") => {
                self.state = BetState::Idle;
                let outcome = argument.to_lowercase();
                let winners: Vec<&str> = self
                    .bets
                    .iter()
                    .filter(|b| b.text.to_lowercase() == outcome)
                    .map(|b| b.user.as_str())
                    .collect();
                let answer = if winners.is_empty() {
                    "No winners this time.".to_string()
                } else {
                    format!("Winners: {}", winners.join(", "))
                };
                self.bets.clear();
                Some(answer)
            }
            _ => {
                debug!(state = ?self.state, command, "bet command ignored");
                None
            }
        }
    }

    fn place_bet(&mut self, user: &str, text: &str) {
        if self.state != BetState::Open || text.is_empty() {
            return;
        }
        match self.bets.iter_mut().find(|b| b.user == user) {
            Some(bet) => bet.text = text.to_string(),
            None => self.bets.push(Bet {
                user: user.to_string(),
                text: text.to_string(),
            }),
        }
    }
}

/// Split `!bet result Team Red` into (`result`, `Team Red`), whole payload
/// being `result Team Red`.
fn split_payload(text: &str) -> (&str, &str, &str) {
    let payload = text.split_once(' ').map(|(_, p)| p.trim()).unwrap_or_default();
    let (command, argument) = payload.split_once(' ').unwrap_or((payload, ""));
    (payload, command, argument.trim())
}

impl Feature for Bets {
    fn name(&self) -> &str {
        "bets"
    }

    fn trigger(&self) -> Option<&str> {
        Some(TRIGGER)
    }

    fn setup(&mut self, responder: Responder) {
        self.responder = Some(responder);
    }

    fn act(&mut self, message: &ChatMessage) -> anyhow::Result<()> {
        let (payload, command, argument) = split_payload(&message.text);

        let answer = if self.is_admin(message) {
            self.admin_command(&command.to_lowercase(), argument)
        } else {
            self.place_bet(&message.from, payload);
            None
        };

        if let (Some(text), Some(responder)) = (answer, &self.responder) {
            responder.respond(self.identity.reply_to(message, text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chat_channel::tags::Tags;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::feature::FeatureResponse;

    fn bets() -> (Bets, UnboundedReceiver<FeatureResponse>) {
        let (responder, rx) = Responder::channel();
        let mut bets = Bets::new(BotIdentity::new("wishbot", "#dallas"), "dallas");
        bets.setup(responder);
        (bets, rx)
    }

    fn said(rx: &mut UnboundedReceiver<FeatureResponse>) -> Option<String> {
        rx.try_recv().ok().map(|r| r.message.text)
    }

    fn owner(text: &str) -> ChatMessage {
        ChatMessage::new("Dallas", "#dallas", text)
    }

    fn viewer(name: &str, text: &str) -> ChatMessage {
        ChatMessage::new(name, "#dallas", text)
    }

    #[test]
    fn full_round() {
        let (mut bets, mut rx) = bets();

        bets.act(&owner("!bet open")).unwrap();
        assert_eq!(bets.state(), BetState::Open);
        assert_eq!(said(&mut rx).as_deref(), Some("Place your bet by entering !bet <choice>"));

        bets.act(&viewer("alice", "!bet Team Red")).unwrap();
        bets.act(&viewer("bob", "!bet team blue")).unwrap();
        bets.act(&viewer("bob", "!bet team red")).unwrap();
        bets.act(&viewer("carol", "!bet green")).unwrap();
        assert_eq!(said(&mut rx), None);

        bets.act(&owner("!bet close")).unwrap();
        assert_eq!(said(&mut rx).as_deref(), Some("Bets are closed!"));

        bets.act(&viewer("dave", "!bet team red")).unwrap();

        bets.act(&owner("!bet result team RED")).unwrap();
        assert_eq!(said(&mut rx).as_deref(), Some("Winners: alice, bob"));
        assert_eq!(bets.state(), BetState::Idle);
    }

    #[test]
    fn viewers_cannot_run_rounds() {
        let (mut bets, mut rx) = bets();
        bets.act(&viewer("mallory", "!bet open")).unwrap();
        assert_eq!(bets.state(), BetState::Idle);
        assert_eq!(said(&mut rx), None);
    }

    #[test]
    fn moderators_can_run_rounds() {
        let (mut bets, mut rx) = bets();
        let moderator = viewer("mod", "!BET OPEN").with_tags(Tags::parse("@mod=1"));
        bets.act(&moderator).unwrap();
        assert_eq!(bets.state(), BetState::Open);
        assert!(said(&mut rx).is_some());
    }

    #[test]
    fn commands_out_of_order_are_ignored() {
        let (mut bets, mut rx) = bets();
        bets.act(&owner("!bet close")).unwrap();
        bets.act(&owner("!bet result x")).unwrap();
        assert_eq!(bets.state(), BetState::Idle);
        assert_eq!(said(&mut rx), None);
    }

    #[test]
    fn nobody_right() {
        let (mut bets, mut rx) = bets();
        bets.act(&owner("!bet open")).unwrap();
        bets.act(&viewer("alice", "!bet 3")).unwrap();
        bets.act(&owner("!bet close")).unwrap();
        bets.act(&owner("!bet result 4")).unwrap();
        let _ = said(&mut rx);
        let _ = said(&mut rx);
        assert_eq!(said(&mut rx).as_deref(), Some("No winners this time."));
    }

    #[test]
    fn payload_split() {
        assert_eq!(split_payload("!bet result Team Red"), ("result Team Red", "result", "Team Red"));
        assert_eq!(split_payload("!bet"), ("", "", ""));
        assert_eq!(split_payload("!bet open"), ("open", "open", ""));
    }
}
