//! Outbound rate limiting.
//!
//! Chat servers drop (or ban) bots that talk too much. The gate allows a fixed
//! number of sends per window. Anything above that waits in a queue that is
//! drained in small batches several times per window, so a backlog trickles
//! out instead of bursting the moment a window opens.
//!
//! The gate has no timers of its own. The host calls [`ResponseGate::tick`]
//! with the current time, [`ResponseGate::next_deadline`] says when.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use chat_channel::transport::Outbound;
use tracing::{debug, error, warn};

use crate::feature::FeatureResponse;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_FLUSHES_PER_WINDOW: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    /// Sends allowed per window. Must be positive.
    pub quota: u32,
    pub window: Duration,
    /// How often per window the backlog gets a chance to drain.
    pub flushes_per_window: u32,
}

impl GateSettings {
    pub fn new(quota: u32) -> Self {
        Self {
            quota,
            window: DEFAULT_WINDOW,
            flushes_per_window: DEFAULT_FLUSHES_PER_WINDOW,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        (self.window / self.flushes_per_window.max(1)).max(Duration::from_millis(1))
    }

    /// Most deferred responses a single flush may send.
    pub fn flush_batch(&self) -> u32 {
        self.quota.div_ceil(self.flushes_per_window.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    UnderLimit,
    AtLimit,
}

/// What happened to a submitted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Sent,
    Deferred,
    /// An identical response is already waiting.
    Duplicate,
    /// Nothing to say, or nowhere to say it.
    Dropped,
}

pub struct ResponseGate {
    settings: GateSettings,
    sent_in_window: u32,
    deferred: VecDeque<FeatureResponse>,
    outbound: Box<dyn Outbound>,
    next_reset: Instant,
    next_flush: Instant,
}

impl ResponseGate {
    /// The first window starts at `now`.
    pub fn new(settings: GateSettings, outbound: Box<dyn Outbound>, now: Instant) -> Self {
        Self {
            next_reset: now + settings.window,
            next_flush: now + settings.flush_interval(),
            settings,
            sent_in_window: 0,
            deferred: VecDeque::new(),
            outbound,
        }
    }

    pub fn submit(&mut self, response: FeatureResponse) -> Submission {
        let message = &response.message;
        if message.text.is_empty() || message.channel.is_empty() {
            return Submission::Dropped;
        }

        if self.is_under_limit() {
            self.send(&response);
            return Submission::Sent;
        }

        // channel, sender, tags and text make up the whole message
        if self.deferred.iter().any(|queued| queued.message == response.message) {
            debug!(text = %response.message.text, "identical response already queued");
            return Submission::Duplicate;
        }

        debug!(queued = self.deferred.len() + 1, "message limit reached, deferring response");
        self.deferred.push_back(response);
        Submission::Deferred
    }

    /// Start a new window.
    pub fn reset_window(&mut self) {
        self.sent_in_window = 0;
    }

    /// Send a batch of deferred responses while the quota allows. Returns
    /// the number sent.
    pub fn flush(&mut self) -> usize {
        if self.is_falling_behind() {
            warn!(
                queued = self.deferred.len(),
                "there are too many responses queued, the bot is falling behind"
            );
        }

        let batch = self.settings.flush_batch() as usize;
        let mut sent = 0;
        while sent < batch && self.is_under_limit() {
            let Some(response) = self.deferred.pop_front() else {
                break;
            };
            self.send(&response);
            sent += 1;
        }
        sent
    }

    /// Run every periodic action that is due at `now`. A window reset runs
    /// before a flush due at the same time. Periods missed entirely (the
    /// host stalled) are skipped rather than replayed.
    pub fn tick(&mut self, now: Instant) {
        if self.next_reset <= now {
            self.reset_window();
            self.next_reset = next_after(self.next_reset, self.settings.window, now);
        }
        if self.next_flush <= now {
            self.flush();
            self.next_flush = next_after(self.next_flush, self.settings.flush_interval(), now);
        }
    }

    /// When [`tick`](Self::tick) has work to do next.
    pub fn next_deadline(&self) -> Instant {
        self.next_reset.min(self.next_flush)
    }

    pub fn state(&self) -> GateState {
        if self.is_under_limit() {
            GateState::UnderLimit
        } else {
            GateState::AtLimit
        }
    }

    /// More responses queued than a whole window may send.
    pub fn is_falling_behind(&self) -> bool {
        self.deferred.len() > self.settings.quota as usize
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }

    pub fn sent_in_window(&self) -> u32 {
        self.sent_in_window
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    fn is_under_limit(&self) -> bool {
        self.sent_in_window < self.settings.quota
    }

    fn send(&mut self, response: &FeatureResponse) {
        // counts even if the transport fails, the line may be out already
        self.sent_in_window += 1;
        let message = &response.message;
        if let Err(e) = self.outbound.send(&message.channel, &message.text) {
            error!(channel = %message.channel, "could not send response: {e}");
        }
    }
}

fn next_after(mut deadline: Instant, period: Duration, now: Instant) -> Instant {
    let period = period.max(Duration::from_millis(1));
    while deadline <= now {
        deadline += period;
    }
    deadline
}

#[cfg(test)]
mod tests {
    use chat_channel::{message::ChatMessage, tags::Tags, test_util::RecordingOutbound};

    use super::*;

    fn response(text: &str) -> FeatureResponse {
        FeatureResponse::new(ChatMessage::new("wishbot", "#dallas", text))
    }

    fn gate(quota: u32) -> (ResponseGate, RecordingOutbound, Instant) {
        let outbound = RecordingOutbound::new();
        let now = Instant::now();
        let gate = ResponseGate::new(GateSettings::new(quota), Box::new(outbound.handle()), now);
        (gate, outbound, now)
    }

    fn texts(outbound: &RecordingOutbound) -> Vec<String> {
        outbound.sent().into_iter().map(|(_, text)| text).collect()
    }

    #[test]
    fn settings_derive_cadence_and_batch() {
        let settings = GateSettings::new(20);
        assert_eq!(settings.flush_interval(), Duration::from_secs(10));
        assert_eq!(settings.flush_batch(), 7);
        assert_eq!(GateSettings::new(2).flush_batch(), 1);
        assert_eq!(GateSettings::new(3).flush_batch(), 1);
    }

    #[test]
    fn backlog_beyond_quota_is_falling_behind() {
        let (mut gate, _outbound, start) = gate(2);
        for i in 0..4 {
            gate.submit(response(&format!("r{i}")));
        }
        // two sent, two queued: a window's worth, not more
        assert!(!gate.is_falling_behind());

        gate.submit(response("r4"));
        assert_eq!(gate.pending(), 3);
        assert!(gate.is_falling_behind());

        gate.tick(start + Duration::from_secs(30));
        assert_eq!(gate.pending(), 2);
        assert!(!gate.is_falling_behind());
    }

    #[test]
    fn third_response_waits_for_the_next_window() {
        let (mut gate, outbound, start) = gate(2);

        assert_eq!(gate.submit(response("one")), Submission::Sent);
        assert_eq!(gate.submit(response("two")), Submission::Sent);
        assert_eq!(gate.state(), GateState::AtLimit);
        assert_eq!(gate.submit(response("three")), Submission::Deferred);
        assert_eq!(texts(&outbound), vec!["one", "two"]);

        // flushes inside the window cannot send anything
        gate.tick(start + Duration::from_secs(10));
        gate.tick(start + Duration::from_secs(20));
        assert_eq!(gate.pending(), 1);

        gate.tick(start + Duration::from_secs(30));
        assert_eq!(texts(&outbound), vec!["one", "two", "three"]);
        assert_eq!(gate.pending(), 0);
        assert_eq!(gate.sent_in_window(), 1);
    }

    #[test]
    fn reset_then_flush_by_hand() {
        let (mut gate, outbound, _) = gate(2);
        for text in ["a", "b", "c"] {
            gate.submit(response(text));
        }
        gate.reset_window();
        assert_eq!(gate.state(), GateState::UnderLimit);
        assert_eq!(gate.flush(), 1);
        assert_eq!(texts(&outbound), vec!["a", "b", "c"]);
    }

    #[test]
    fn identical_deferred_responses_collapse() {
        let (mut gate, _outbound, _) = gate(1);
        gate.submit(response("first"));
        assert_eq!(gate.submit(response("again")), Submission::Deferred);
        assert_eq!(gate.submit(response("again")), Submission::Duplicate);
        assert_eq!(gate.pending(), 1);

        // different tags make a different response
        let mut tagged = response("again");
        tagged.message.tags = Some(Tags::parse("@mod=1"));
        assert_eq!(gate.submit(tagged), Submission::Deferred);
        assert_eq!(gate.pending(), 2);
    }

    #[test]
    fn empty_responses_are_never_sent() {
        let (mut gate, outbound, start) = gate(1);
        assert_eq!(gate.submit(response("")), Submission::Dropped);
        let mut nowhere = response("hello");
        nowhere.message.channel.clear();
        assert_eq!(gate.submit(nowhere), Submission::Dropped);

        gate.submit(response("fill"));
        assert_eq!(gate.submit(response("")), Submission::Dropped);
        assert_eq!(gate.pending(), 0);

        gate.tick(start + Duration::from_secs(60));
        assert_eq!(texts(&outbound), vec!["fill"]);
    }

    #[test]
    fn backlog_drains_in_batches() {
        let (mut gate, outbound, start) = gate(6);
        for i in 0..12 {
            gate.submit(response(&format!("r{i}")));
        }
        assert_eq!(gate.pending(), 6);

        gate.tick(start + Duration::from_secs(30));
        assert_eq!(outbound.sent().len(), 8);
        gate.tick(start + Duration::from_secs(40));
        assert_eq!(outbound.sent().len(), 10);
        gate.tick(start + Duration::from_secs(50));
        assert_eq!(outbound.sent().len(), 12);
        assert_eq!(gate.pending(), 0);
        assert_eq!(texts(&outbound).last().map(String::as_str), Some("r11"));
    }

    #[test]
    fn deadlines_advance_and_skip_missed_periods() {
        let (mut gate, _outbound, start) = gate(2);
        assert_eq!(gate.next_deadline(), start + Duration::from_secs(10));

        gate.tick(start + Duration::from_secs(10));
        assert_eq!(gate.next_deadline(), start + Duration::from_secs(20));

        gate.tick(start + Duration::from_secs(95));
        assert_eq!(gate.next_deadline(), start + Duration::from_secs(100));
    }

    #[test]
    fn counter_stays_at_limit_until_reset() {
        let (mut gate, _outbound, start) = gate(1);
        gate.submit(response("x"));
        gate.tick(start + Duration::from_secs(10));
        gate.tick(start + Duration::from_secs(20));
        assert_eq!(gate.state(), GateState::AtLimit);
        gate.tick(start + Duration::from_secs(30));
        assert_eq!(gate.state(), GateState::UnderLimit);
    }
}
