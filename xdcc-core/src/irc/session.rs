//! Actor-style IRC session.
//!
//! [`IrcSession::connect`] establishes the transport, registers the nick, and
//! spawns a task that owns the connection for its whole lifetime. The task
//! answers `PING`s and nick collisions by itself and publishes everything
//! else as typed [`IrcEvent`]s; callers talk back through the command handle.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::ctcp::CTCP_DELIMITER;
use crate::irc::connection::{establish, IrcStream, TlsMode};
use crate::irc::message::Message;
use crate::irc::IrcError;

/// Base nick; a random 32-bit suffix is appended per session.
pub const IRC_USER_NAME: &str = "xdcc-cli";

/// Capacity of the session's outbound event channel.
const EVENT_CHANNEL_SIZE: usize = 128;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct IrcConfig {
    /// Network host, optionally `host:port`.
    pub network: String,
    /// Connection negotiation mode.
    pub mode: TlsMode,
    /// Nick to register with.
    pub nick: String,
}

/// Generates the default nick: `xdcc-cli<random u32>`.
#[must_use]
pub fn random_nick() -> String {
    format!("{IRC_USER_NAME}{}", rand::random::<u32>())
}

/// Events published by the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// Registration completed (RPL_WELCOME received).
    Connected,
    /// This client joined a channel.
    Joined { channel: String },
    /// A plain private message addressed to us.
    Privmsg { from: String, text: String },
    /// A CTCP payload (delimiters stripped) addressed to us.
    Ctcp { from: String, payload: String },
    /// The server reported a protocol-level error.
    Error { message: String },
    /// The connection is gone; no further events follow.
    Disconnected { reason: String },
}

/// Commands accepted by the session task.
#[derive(Debug)]
enum IrcCommand {
    Join(String),
    Privmsg { target: String, text: String },
    Quit,
}

/// Handle to a running session.
#[derive(Debug, Clone)]
pub struct IrcSession {
    commands: mpsc::Sender<IrcCommand>,
}

impl IrcSession {
    /// Connects, registers, and spawns the session task.
    ///
    /// Returns the command handle and the event stream. The returned future
    /// resolves once the transport is established and the registration lines
    /// are on the wire; [`IrcEvent::Connected`] follows asynchronously.
    ///
    /// # Errors
    ///
    /// Connection and TLS errors from [`establish`], or an I/O error while
    /// writing the registration lines.
    pub async fn connect(
        config: IrcConfig,
    ) -> Result<(Self, mpsc::Receiver<IrcEvent>), IrcError> {
        let stream = establish(&config.network, config.mode).await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(16);

        let mut task = SessionTask {
            writer: write_half,
            events: event_tx,
            nick: config.nick.clone(),
        };

        task.send_line(&format!("NICK {}", config.nick)).await?;
        task.send_line(&format!("USER {} 0 * :{IRC_USER_NAME}", config.nick))
            .await?;

        tokio::spawn(task.run(read_half, command_rx));

        Ok((Self { commands: command_tx }, event_rx))
    }

    /// Joins a channel.
    pub async fn join(&self, channel: &str) -> Result<(), IrcError> {
        self.send(IrcCommand::Join(channel.to_string())).await
    }

    /// Sends a private message.
    pub async fn privmsg(&self, target: &str, text: &str) -> Result<(), IrcError> {
        self.send(IrcCommand::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Quits cleanly; the session task terminates without emitting
    /// [`IrcEvent::Disconnected`].
    pub async fn quit(&self) {
        let _ = self.commands.send(IrcCommand::Quit).await;
    }

    async fn send(&self, command: IrcCommand) -> Result<(), IrcError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| IrcError::SessionClosed)
    }
}

/// Whether the session task keeps running after handling input.
enum Flow {
    Continue,
    Stop,
}

struct SessionTask {
    writer: WriteHalf<Box<dyn IrcStream>>,
    events: mpsc::Sender<IrcEvent>,
    nick: String,
}

impl SessionTask {
    async fn run(
        mut self,
        read_half: ReadHalf<Box<dyn IrcStream>>,
        mut commands: mpsc::Receiver<IrcCommand>,
    ) {
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match self.handle_command(command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => break,
                        Err(e) => {
                            self.disconnect(format!("write error: {e}")).await;
                            break;
                        }
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => match self.handle_line(&line).await {
                            Flow::Continue => {}
                            Flow::Stop => break,
                        },
                        Ok(None) => {
                            self.disconnect("connection closed by server".to_string()).await;
                            break;
                        }
                        Err(e) => {
                            self.disconnect(format!("read error: {e}")).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Option<IrcCommand>) -> Result<Flow, IrcError> {
        match command {
            Some(IrcCommand::Join(channel)) => {
                self.send_line(&format!("JOIN {channel}")).await?;
                Ok(Flow::Continue)
            }
            Some(IrcCommand::Privmsg { target, text }) => {
                self.send_line(&format!("PRIVMSG {target} :{text}")).await?;
                Ok(Flow::Continue)
            }
            Some(IrcCommand::Quit) | None => {
                let _ = self.send_line("QUIT :bye").await;
                Ok(Flow::Stop)
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        trace!(%line, "irc line");
        let message = match Message::parse(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "skipping unparsable IRC line");
                return Flow::Continue;
            }
        };

        match message.command.as_str() {
            "PING" => {
                let token = message.trailing().unwrap_or_default();
                if self.send_line(&format!("PONG :{token}")).await.is_err() {
                    self.disconnect("write error during PONG".to_string()).await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            "001" => self.emit(IrcEvent::Connected).await,
            // Nick collision: append another random suffix and retry.
            "433" => {
                let retry = format!("{}{}", self.nick, rand::random::<u32>());
                debug!(nick = %retry, "nick in use, renaming");
                self.nick = retry.clone();
                if self.send_line(&format!("NICK {retry}")).await.is_err() {
                    self.disconnect("write error during rename".to_string()).await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
            "JOIN" => {
                if message.source_nick() == Some(self.nick.as_str()) {
                    let channel = message
                        .params
                        .first()
                        .cloned()
                        .unwrap_or_default();
                    self.emit(IrcEvent::Joined { channel }).await
                } else {
                    Flow::Continue
                }
            }
            "PRIVMSG" => {
                let from = message.source_nick().unwrap_or_default().to_string();
                let text = message.trailing().unwrap_or_default();
                let event = if text.starts_with(CTCP_DELIMITER) {
                    IrcEvent::Ctcp {
                        from,
                        payload: text.trim_matches(CTCP_DELIMITER).to_string(),
                    }
                } else {
                    IrcEvent::Privmsg {
                        from,
                        text: text.to_string(),
                    }
                };
                self.emit(event).await
            }
            "ERROR" => {
                let message = message.trailing().unwrap_or_default().to_string();
                self.emit(IrcEvent::Error { message }).await
            }
            _ => Flow::Continue,
        }
    }

    async fn emit(&self, event: IrcEvent) -> Flow {
        if self.events.send(event).await.is_err() {
            // Consumer is gone; nothing left to serve.
            return Flow::Stop;
        }
        Flow::Continue
    }

    async fn disconnect(&self, reason: String) {
        let _ = self.events.send(IrcEvent::Disconnected { reason }).await;
    }

    async fn send_line(&mut self, line: &str) -> Result<(), IrcError> {
        trace!(%line, "irc send");
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(IrcError::Io)?;
        self.writer.flush().await.map_err(IrcError::Io)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_random_nick_has_base_and_suffix() {
        let nick = random_nick();
        assert!(nick.starts_with(IRC_USER_NAME));
        assert!(nick.len() > IRC_USER_NAME.len());
        nick[IRC_USER_NAME.len()..]
            .parse::<u32>()
            .expect("suffix is a u32");
    }
}
