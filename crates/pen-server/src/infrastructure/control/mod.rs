//! Line-oriented control channel over stdin/stdout.
//!
//! A host process (a UI, a plugin shim, or a person at a terminal) drives the
//! server by writing one command per line and reads one notification per
//! line back.
//!
//! # Commands (stdin)
//!
//! | Line                        | Effect                                        |
//! |-----------------------------|-----------------------------------------------|
//! | `START`                     | start with the configured name and identifier |
//! | `START:<identifier>:<name>` | start with the given identifier and name      |
//! | `STOP`                      | stop the server                               |
//! | `SEND:<message>`            | send `<message>` to every connected client    |
//! | `DISCONNECT`                | drop every client but keep listening          |
//! | `STATUS`                    | report the lifecycle state                    |
//! | `QUIT`                      | stop the server and exit                      |
//!
//! Keywords are case-insensitive.  End of input behaves like `QUIT`.
//!
//! # Output (stdout), text format
//!
//! ```text
//! READY
//! SERVER_STARTED:Port 40123
//! CLIENT_CONNECTED:<id>:192.168.1.20:51544
//! MESSAGE_RECEIVED:{"type":"mousedelta","deltaX":"3","deltaY":"0"}
//! WARNING:<text>
//! CLIENT_DISCONNECTED:<id>
//! SENT:<message>
//! DISCONNECTED:2
//! STATUS:Running
//! SERVER_STOPPED
//! ERROR:<text>
//! ```
//!
//! With [`ControlFormat::Json`] every line is instead one JSON object tagged
//! by `"type"`.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use pen_core::{ServerEvent, ServerState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::lifecycle::{PenServer, StartError};

/// Error type for the control channel.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("control stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output encoding for the control stream.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ControlFormat {
    #[default]
    Text,
    Json,
}

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `None` fields fall back to the configured defaults.
    Start {
        identifier: Option<String>,
        name: Option<String>,
    },
    Stop,
    Send(String),
    Disconnect,
    Status,
    Quit,
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (keyword, argument) = match line.split_once(':') {
            Some((keyword, argument)) => (keyword, Some(argument)),
            None => (line, None),
        };

        match keyword.trim().to_ascii_uppercase().as_str() {
            "START" => match argument {
                None => Ok(ControlCommand::Start {
                    identifier: None,
                    name: None,
                }),
                Some(argument) => {
                    let (identifier, name) = argument
                        .split_once(':')
                        .ok_or(ControlError::MissingArgument("service name"))?;
                    if identifier.trim().is_empty() {
                        return Err(ControlError::MissingArgument("service identifier"));
                    }
                    if name.is_empty() {
                        return Err(ControlError::MissingArgument("service name"));
                    }
                    Ok(ControlCommand::Start {
                        identifier: Some(identifier.trim().to_string()),
                        name: Some(name.to_string()),
                    })
                }
            },
            "STOP" => Ok(ControlCommand::Stop),
            "SEND" => argument
                .map(|message| ControlCommand::Send(message.to_string()))
                .ok_or(ControlError::MissingArgument("message")),
            "DISCONNECT" => Ok(ControlCommand::Disconnect),
            "STATUS" => Ok(ControlCommand::Status),
            "QUIT" | "EXIT" => Ok(ControlCommand::Quit),
            _ => Err(ControlError::UnknownCommand(line.to_string())),
        }
    }
}

/// Direct answers to commands, as opposed to server notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlReply {
    Ready,
    Sent {
        message: String,
        recipients: usize,
    },
    Disconnected {
        count: usize,
    },
    Status {
        state: ServerState,
        port: Option<u16>,
        connections: usize,
    },
    Error {
        text: String,
    },
}

/// Renders one server notification as an output line (no terminator).
pub fn render_event(format: ControlFormat, event: &ServerEvent) -> String {
    match format {
        ControlFormat::Json => to_json_line(event),
        ControlFormat::Text => match event {
            ServerEvent::ServerStarted { port } => format!("SERVER_STARTED:Port {port}"),
            ServerEvent::ServerStopped => "SERVER_STOPPED".to_string(),
            ServerEvent::ClientConnected { id, remote_address } => {
                format!("CLIENT_CONNECTED:{id}:{remote_address}")
            }
            ServerEvent::ClientDisconnected { id } => format!("CLIENT_DISCONNECTED:{id}"),
            ServerEvent::MessageReceived { raw } => format!("MESSAGE_RECEIVED:{raw}"),
            ServerEvent::Warning { text } => format!("WARNING:{text}"),
            ServerEvent::Error { text } => format!("ERROR:{text}"),
        },
    }
}

/// Renders one command reply as an output line (no terminator).
pub fn render_reply(format: ControlFormat, reply: &ControlReply) -> String {
    match format {
        ControlFormat::Json => to_json_line(reply),
        ControlFormat::Text => match reply {
            ControlReply::Ready => "READY".to_string(),
            ControlReply::Sent { message, .. } => format!("SENT:{message}"),
            ControlReply::Disconnected { count } => format!("DISCONNECTED:{count}"),
            ControlReply::Status { state, .. } => format!("STATUS:{state}"),
            ControlReply::Error { text } => format!("ERROR:{text}"),
        },
    }
}

fn to_json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"type":"Error","text":"cannot encode output: {e}"}}"#))
}

/// Name and identifier used by a bare `START`.
#[derive(Debug, Clone)]
pub struct StartDefaults {
    pub name: String,
    pub identifier: String,
}

/// Drives a [`PenServer`] from a command stream and reports on an output
/// stream.
pub struct ControlChannel {
    server: Arc<PenServer>,
    format: ControlFormat,
    defaults: StartDefaults,
}

impl ControlChannel {
    pub fn new(server: Arc<PenServer>, format: ControlFormat, defaults: StartDefaults) -> Self {
        Self {
            server,
            format,
            defaults,
        }
    }

    /// Runs until `QUIT`, end of input, or `shutdown` resolves.  The server
    /// is stopped before returning and every notification it produced on the
    /// way down is written out.
    ///
    /// # Errors
    ///
    /// [`ControlError::Io`] if reading commands or writing output fails.  The
    /// server is still stopped.
    pub async fn run<R, W, F>(
        &self,
        input: R,
        output: &mut W,
        mut events: mpsc::Receiver<ServerEvent>,
        shutdown: F,
    ) -> Result<(), ControlError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let result = self.pump(input, output, &mut events, shutdown).await;

        self.server.stop().await;
        while let Ok(event) = events.try_recv() {
            self.write(output, &render_event(self.format, &event)).await?;
        }
        result
    }

    async fn pump<R, W, F>(
        &self,
        input: R,
        output: &mut W,
        events: &mut mpsc::Receiver<ServerEvent>,
        shutdown: F,
    ) -> Result<(), ControlError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.lines();
        tokio::pin!(shutdown);
        self.reply(output, ControlReply::Ready).await?;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.handle_line(&line, output).await? {
                            return Ok(());
                        }
                    }
                    None => {
                        debug!("control input closed");
                        return Ok(());
                    }
                },
                Some(event) = events.recv() => {
                    self.write(output, &render_event(self.format, &event)).await?;
                }
            }
        }
    }

    /// Executes one command line.  Returns `true` when the channel should
    /// close.
    async fn handle_line<W>(&self, line: &str, output: &mut W) -> Result<bool, ControlError>
    where
        W: AsyncWrite + Unpin,
    {
        if line.trim().is_empty() {
            return Ok(false);
        }
        let command = match line.parse::<ControlCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!("bad control command: {e}");
                self.reply(output, ControlReply::Error { text: e.to_string() })
                    .await?;
                return Ok(false);
            }
        };
        debug!(?command, "control command");

        match command {
            ControlCommand::Start { identifier, name } => {
                let name = name.unwrap_or_else(|| self.defaults.name.clone());
                let identifier = identifier.unwrap_or_else(|| self.defaults.identifier.clone());
                match self.server.start(&name, &identifier).await {
                    Ok(_) => {}
                    // The lifecycle has already emitted an Error notification.
                    Err(StartError::Setup(_)) => {}
                    Err(e) => {
                        self.reply(output, ControlReply::Error { text: e.to_string() })
                            .await?;
                    }
                }
            }
            ControlCommand::Stop => self.server.stop().await,
            ControlCommand::Send(message) => {
                let recipients = self.server.send(&message).await;
                self.reply(output, ControlReply::Sent { message, recipients })
                    .await?;
            }
            ControlCommand::Disconnect => {
                let count = self.server.disconnect_clients().await;
                self.reply(output, ControlReply::Disconnected { count })
                    .await?;
            }
            ControlCommand::Status => {
                let port = self.server.descriptor().await.map(|d| d.bound_port);
                let connections = self.server.connection_count().await;
                self.reply(
                    output,
                    ControlReply::Status {
                        state: self.server.state(),
                        port,
                        connections,
                    },
                )
                .await?;
            }
            ControlCommand::Quit => return Ok(true),
        }
        Ok(false)
    }

    async fn reply<W>(&self, output: &mut W, reply: ControlReply) -> Result<(), ControlError>
    where
        W: AsyncWrite + Unpin,
    {
        self.write(output, &render_reply(self.format, &reply)).await
    }

    async fn write<W>(&self, output: &mut W, line: &str) -> Result<(), ControlError>
    where
        W: AsyncWrite + Unpin,
    {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::ServerSettings;
    use crate::infrastructure::discovery::NoopRegistrar;
    use crate::infrastructure::input_dispatch::RecordingDispatcher;
    use crate::infrastructure::transport::TcpTransport;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use uuid::Uuid;

    const PEN_ID: &str = "00001101-0000-1000-8000-00805F9B34FB";

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_bare_start_uses_defaults() {
        assert_eq!(
            "START".parse::<ControlCommand>().unwrap(),
            ControlCommand::Start {
                identifier: None,
                name: None
            }
        );
    }

    #[test]
    fn test_parse_start_with_identifier_and_name() {
        // Arrange
        let line = format!("START:{PEN_ID}:Studio Pen: left hand");

        // Act
        let command = line.parse::<ControlCommand>().unwrap();

        // Assert: the name keeps any further colons.
        assert_eq!(
            command,
            ControlCommand::Start {
                identifier: Some(PEN_ID.to_string()),
                name: Some("Studio Pen: left hand".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_start_without_name_is_missing_argument() {
        let result = format!("START:{PEN_ID}").parse::<ControlCommand>();
        assert!(matches!(result, Err(ControlError::MissingArgument(_))));
    }

    #[test]
    fn test_parse_keywords_ignore_case_and_crlf() {
        assert_eq!("stop\r".parse::<ControlCommand>().unwrap(), ControlCommand::Stop);
        assert_eq!("Status".parse::<ControlCommand>().unwrap(), ControlCommand::Status);
        assert_eq!("exit".parse::<ControlCommand>().unwrap(), ControlCommand::Quit);
    }

    #[test]
    fn test_parse_send_keeps_message_verbatim() {
        assert_eq!(
            "SEND: hello:world ".parse::<ControlCommand>().unwrap(),
            ControlCommand::Send(" hello:world ".to_string())
        );
    }

    #[test]
    fn test_parse_send_without_separator_is_missing_argument() {
        assert!(matches!(
            "SEND".parse::<ControlCommand>(),
            Err(ControlError::MissingArgument("message"))
        ));
    }

    #[test]
    fn test_parse_disconnect() {
        assert_eq!(
            "disconnect".parse::<ControlCommand>().unwrap(),
            ControlCommand::Disconnect
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(matches!(
            "DANCE".parse::<ControlCommand>(),
            Err(ControlError::UnknownCommand(_))
        ));
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_text_rendering_of_notifications() {
        let id = Uuid::nil();
        let cases = [
            (ServerEvent::ServerStarted { port: 5 }, "SERVER_STARTED:Port 5".to_string()),
            (ServerEvent::ServerStopped, "SERVER_STOPPED".to_string()),
            (
                ServerEvent::ClientConnected {
                    id,
                    remote_address: "10.0.0.2:5000".to_string(),
                },
                format!("CLIENT_CONNECTED:{id}:10.0.0.2:5000"),
            ),
            (
                ServerEvent::ClientDisconnected { id },
                format!("CLIENT_DISCONNECTED:{id}"),
            ),
            (
                ServerEvent::Warning {
                    text: "bad".to_string(),
                },
                "WARNING:bad".to_string(),
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(render_event(ControlFormat::Text, &event), expected);
        }
    }

    #[test]
    fn test_json_rendering_is_tagged() {
        // Arrange
        let reply = ControlReply::Sent {
            message: "hi".to_string(),
            recipients: 2,
        };

        // Act
        let line = render_reply(ControlFormat::Json, &reply);

        // Assert
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "Sent");
        assert_eq!(value["recipients"], 2);
    }

    #[test]
    fn test_text_status_reply() {
        let reply = ControlReply::Status {
            state: ServerState::Stopped,
            port: None,
            connections: 0,
        };
        assert_eq!(render_reply(ControlFormat::Text, &reply), "STATUS:Stopped");
    }

    // ── Channel ───────────────────────────────────────────────────────────────

    fn make_channel(format: ControlFormat) -> (ControlChannel, mpsc::Receiver<ServerEvent>) {
        let settings = ServerSettings {
            accept_poll_interval: Duration::from_millis(20),
            ..ServerSettings::default()
        };
        let (server, events) = PenServer::new(
            Arc::new(TcpTransport::new("127.0.0.1:0".parse().unwrap())),
            Arc::new(NoopRegistrar),
            Arc::new(RecordingDispatcher::new()),
            settings,
        );
        let channel = ControlChannel::new(
            Arc::new(server),
            format,
            StartDefaults {
                name: "Drawing Pen Remote".to_string(),
                identifier: PEN_ID.to_string(),
            },
        );
        (channel, events)
    }

    #[tokio::test]
    async fn test_channel_runs_a_full_session() {
        // Arrange
        let (channel, events) = make_channel(ControlFormat::Text);
        let input: &[u8] = b"START\nSTATUS\nSEND:hello\nDANCE\nQUIT\n";
        let mut output = Vec::new();

        // Act
        channel
            .run(input, &mut output, events, std::future::pending())
            .await
            .unwrap();

        // Assert
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"READY"));
        assert!(lines.iter().any(|l| l.starts_with("SERVER_STARTED:Port ")));
        assert!(lines.contains(&"STATUS:Running"));
        assert!(lines.contains(&"SENT:hello"));
        assert!(lines.iter().any(|l| l.starts_with("ERROR:unknown command")));
        assert_eq!(lines.last(), Some(&"SERVER_STOPPED"));
        assert_eq!(channel.server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_disconnect_drops_clients_and_keeps_running() {
        // Arrange
        let (channel, mut events) = make_channel(ControlFormat::Text);
        channel.server.start("Pen", PEN_ID).await.unwrap();
        let port = channel.server.descriptor().await.unwrap().bound_port;
        let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("connection within 2s")
                .unwrap();
            if matches!(event, ServerEvent::ClientConnected { .. }) {
                break;
            }
        }
        let mut output = Vec::new();

        // Act
        let quit = channel.handle_line("DISCONNECT", &mut output).await.unwrap();
        let mut buf = [0u8; 4];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("client closed within 2s");
        let input: &[u8] = b"STATUS\n";
        channel
            .run(input, &mut output, events, std::future::pending())
            .await
            .unwrap();

        // Assert
        assert!(!quit);
        assert_eq!(read.unwrap_or(0), 0, "client sees end-of-stream");
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"DISCONNECTED:1"));
        assert!(lines.iter().any(|l| l.starts_with("CLIENT_DISCONNECTED:")));
        assert!(lines.contains(&"STATUS:Running"));
    }

    #[tokio::test]
    async fn test_start_with_bad_identifier_reports_error_and_stays_stopped() {
        let (channel, events) = make_channel(ControlFormat::Text);
        let input: &[u8] = b"START:nope:Pen\nSTATUS\n";
        let mut output = Vec::new();

        channel
            .run(input, &mut output, events, std::future::pending())
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("ERROR:invalid service identifier"));
        assert!(text.contains("STATUS:Stopped"));
        assert!(!text.contains("SERVER_STARTED"));
    }

    #[tokio::test]
    async fn test_shutdown_future_ends_the_channel() {
        // Arrange: input that never ends.
        let (channel, events) = make_channel(ControlFormat::Json);
        let (_keep_open, reader) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);
        let mut output = Vec::new();

        // Act
        let run = channel.run(
            reader,
            &mut output,
            events,
            tokio::time::sleep(Duration::from_millis(50)),
        );
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("shutdown must end the channel")
            .unwrap();

        // Assert
        let first = String::from_utf8(output).unwrap();
        assert!(first.starts_with(r#"{"type":"Ready"}"#));
    }
}
