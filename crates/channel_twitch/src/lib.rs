// channel_twitch/src/lib.rs
use std::fmt;

use async_trait::async_trait;
use chat_channel::{
    irc::{self, IrcLine},
    transport::{Outbound, Transport, TransportError, TransportEvent},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_SERVER: &str = "irc.chat.twitch.tv:6667";

/// Capabilities we need for tags and whispers.
const CAPABILITIES: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands\r\n";

#[derive(Clone)]
pub struct TwitchConfig {
    /// `host:port` of the chat server.
    pub server: String,
    pub nickname: String,
    /// OAuth token, with or without the `oauth:` prefix.
    pub password: String,
}

impl fmt::Debug for TwitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitchConfig")
            .field("server", &self.server)
            .field("nickname", &self.nickname)
            .field("password", &"***")
            .finish()
    }
}

/// Lines sent right after the socket is open.
pub fn login_lines(config: &TwitchConfig, channel: &str) -> Vec<String> {
    let password = if config.password.starts_with("oauth:") {
        config.password.clone()
    } else {
        format!("oauth:{}", config.password)
    };
    vec![
        format!("PASS {password}\r\n"),
        format!("NICK {}\r\n", config.nickname.to_lowercase()),
        CAPABILITIES.to_string(),
        format!("JOIN {}\r\n", normalize_channel(channel)),
    ]
}

/// Channel names are lower case and start with `#`.
pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim().to_lowercase();
    if channel.starts_with('#') {
        channel
    } else {
        format!("#{channel}")
    }
}

/// Twitch chat over plain IRC.
pub struct TwitchTransport {
    config: TwitchConfig,
    out_tx: UnboundedSender<String>,
    out_rx: Option<UnboundedReceiver<String>>,
    events_tx: Option<UnboundedSender<TransportEvent>>,
    events_rx: UnboundedReceiver<TransportEvent>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

impl TwitchTransport {
    pub fn new(config: TwitchConfig) -> Self {
        let (out_tx, out_rx) = unbounded_channel();
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            config,
            out_tx,
            out_rx: Some(out_rx),
            events_tx: Some(events_tx),
            events_rx,
            reader_task: None,
            writer_task: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.reader_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    async fn writer_loop(mut write_half: OwnedWriteHalf, mut out_rx: UnboundedReceiver<String>) {
        while let Some(line) = out_rx.recv().await {
            if !line.starts_with("PASS ") {
                trace!(line = line.trim_end(), "> irc");
            }
            if let Err(e) = write_half.write_all(line.as_bytes()).await {
                error!("could not write to chat server: {e}");
                break;
            }
            if let Err(e) = write_half.flush().await {
                error!("could not flush chat server connection: {e}");
                break;
            }
        }
        debug!("writer loop finished");
    }

    async fn reader_loop(
        read_half: OwnedReadHalf,
        out_tx: UnboundedSender<String>,
        events_tx: UnboundedSender<TransportEvent>,
    ) {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("chat server closed the connection");
                    break;
                }
                Err(e) => {
                    let _ = events_tx.send(TransportEvent::Error(format!("read failed: {e}")));
                    break;
                }
            };
            trace!(%line, "< irc");

            let parsed = match IrcLine::parse(&line) {
                Ok(parsed) => parsed,
                Err(irc::IrcError::Empty) => continue,
                Err(e) => {
                    debug!("skipping line: {e}");
                    continue;
                }
            };

            if let Some(event) = Self::handle_line(parsed, &out_tx) {
                if events_tx.send(event).is_err() {
                    // nobody listens anymore
                    break;
                }
            }
        }
    }

    /// Answers keepalives itself, turns everything else into an event if
    /// the bot cares about it.
    fn handle_line(line: IrcLine, out_tx: &UnboundedSender<String>) -> Option<TransportEvent> {
        match line.command.as_str() {
            "PING" => {
                let _ = out_tx.send(irc::pong(line.trailing().unwrap_or("tmi.twitch.tv")));
                None
            }
            "NOTICE" => {
                let text = line.trailing().unwrap_or_default();
                if text.contains("Login authentication failed") || text.contains("Improperly formatted auth") {
                    Some(TransportEvent::Error(TransportError::LoginRejected(text.to_string()).to_string()))
                } else {
                    info!(notice = text, "server notice");
                    None
                }
            }
            "RECONNECT" => {
                warn!("chat server asked us to reconnect");
                Some(TransportEvent::Error("server requested a reconnect".into()))
            }
            "PRIVMSG" | "WHISPER" => line.into_chat_message().map(TransportEvent::Message),
            _ => None,
        }
    }
}

impl Drop for TwitchTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for TwitchTransport {
    fn name(&self) -> String {
        "twitch".into()
    }

    async fn connect(&mut self, channel: &str) -> Result<(), TransportError> {
        if self.out_rx.is_none() || self.events_tx.is_none() {
            return Err(TransportError::Other("already connected".into()));
        }

        info!(server = %self.config.server, channel, "connecting to chat");
        let stream = TcpStream::connect(&self.config.server).await?;
        let (read_half, write_half) = stream.into_split();

        let (Some(out_rx), Some(events_tx)) = (self.out_rx.take(), self.events_tx.take()) else {
            return Err(TransportError::Other("already connected".into()));
        };

        for line in login_lines(&self.config, channel) {
            self.out_tx.send(line).map_err(|_| TransportError::Closed)?;
        }

        self.writer_task = Some(tokio::spawn(Self::writer_loop(write_half, out_rx)));
        self.reader_task = Some(tokio::spawn(Self::reader_loop(
            read_half,
            self.out_tx.clone(),
            events_tx,
        )));
        Ok(())
    }

    fn outbound(&self) -> Box<dyn Outbound> {
        Box::new(TwitchOutbound { tx: self.out_tx.clone() })
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.reader_task.is_none() {
            return None;
        }
        self.events_rx.recv().await
    }
}

/// Queues `PRIVMSG` lines for the writer task.
pub struct TwitchOutbound {
    tx: UnboundedSender<String>,
}

impl Outbound for TwitchOutbound {
    fn send(&mut self, channel: &str, text: &str) -> Result<(), TransportError> {
        self.tx
            .send(irc::privmsg(channel, text))
            .map_err(|_| TransportError::Closed)
    }
}
