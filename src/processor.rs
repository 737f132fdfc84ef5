// src/processor.rs

use std::time::Instant;

use anyhow::{Context, Result};
use chat_channel::{
    message::ChatMessage,
    transport::{Transport, TransportEvent},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    feature::{FeatureResponse, FeatureRouter, Responder, SharedFeature},
    gate::{GateSettings, ResponseGate},
};

/// Glues a transport to the feature router and the response gate, and runs
/// the bot's single event loop.
pub struct MessageProcessor {
    channel: String,
    transport: Box<dyn Transport>,
    router: FeatureRouter,
    gate: ResponseGate,
    responses: UnboundedReceiver<FeatureResponse>,
}

impl MessageProcessor {
    pub fn new(transport: Box<dyn Transport>, channel: impl Into<String>, settings: GateSettings) -> Self {
        let (responder, responses) = Responder::channel();
        let gate = ResponseGate::new(settings, transport.outbound(), Instant::now());
        Self {
            channel: channel.into(),
            transport,
            router: FeatureRouter::new(responder),
            gate,
            responses,
        }
    }

    pub fn register_feature(&mut self, feature: SharedFeature) -> bool {
        self.router.register(feature)
    }

    /// Dispatch one inbound message and push whatever the features said
    /// into the gate.
    pub fn handle_message(&mut self, message: ChatMessage) {
        debug!(%message, "processing");
        self.router.process(&message);
        self.drain_responses();
    }

    fn drain_responses(&mut self) {
        while let Ok(response) = self.responses.try_recv() {
            self.gate.submit(response);
        }
    }

    pub fn gate(&self) -> &ResponseGate {
        &self.gate
    }

    pub fn router(&self) -> &FeatureRouter {
        &self.router
    }

    /// Connect and process events until `shutdown` fires or the transport
    /// goes away. Dropping out of the loop releases the gate timer.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let transport = self.transport.name();
        self.transport
            .connect(&self.channel)
            .await
            .with_context(|| format!("could not connect {transport} to {}", self.channel))?;
        info!(%transport, channel = %self.channel, "connected, waiting for messages");

        loop {
            let deadline = tokio::time::Instant::from_std(self.gate.next_deadline());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                event = self.transport.next_event() => match event {
                    Some(TransportEvent::Message(message)) => self.handle_message(message),
                    Some(TransportEvent::Error(e)) => error!(%transport, "{e}"),
                    None => {
                        warn!(%transport, "transport closed");
                        break;
                    }
                },
                // responses features emit outside of a dispatch, e.g. from timers
                Some(response) = self.responses.recv() => {
                    self.gate.submit(response);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.gate.tick(Instant::now());
                }
            }
        }

        if self.gate.pending() > 0 {
            warn!(pending = self.gate.pending(), "dropping responses that were never sent");
        }
        Ok(())
    }
}
