//! Client session: one connection's read → frame → decode → dispatch loop.
//!
//! Each accepted connection runs [`run_session`] in its own task.  The task
//! owns the byte stream; nothing else ever touches it.  The session waits on
//! three things at once:
//!
//! - **Reads** from the peer.  Bytes go into a [`LineFramer`] and every
//!   complete line is decoded and submitted for dispatch, in arrival order,
//!   before the next read.
//! - **The close signal** from the registry entry.  `stop` fires it to end
//!   the session from outside; the stream is dropped, which closes it.  The
//!   signal also interrupts a pending dispatch submit or outbound write.
//! - **Outbound lines** queued by a broadcast.
//!
//! A malformed line is logged and reported as a `Warning`, and only that line
//! is dropped.  End-of-stream, a read error or the close signal end the
//! session.  Every exit path runs the same cleanup: leave the registry (if
//! `stop` has not already taken the entry), drop the stream, emit
//! `ClientDisconnected` exactly once.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use pen_core::{decode_frame, ConnectionId, FrameError, LineFramer, ProtocolError, ServerEvent};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::application::dispatch::DispatchHandle;
use crate::application::events::EventSink;
use crate::application::registry::ConnectionRegistry;
use crate::application::transport::BoxedStream;

/// Size of one read from the transport.
const READ_CHUNK: usize = 1024;

/// Depth of each connection's outbound queue.
pub const OUTBOUND_QUEUE_DEPTH: usize = 32;

/// Shared collaborators every session needs.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatch: DispatchHandle,
    pub events: EventSink,
    pub max_line_length: usize,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed its side of the stream.
    PeerClosed,
    /// The server closed the connection (shutdown).
    ClosedByServer,
    /// Reading failed.
    ReadFailed(io::Error),
    /// Writing an outbound line failed.
    WriteFailed(io::Error),
}

/// Per-connection halves handed from the accept loop to the session.
#[derive(Debug)]
pub struct SessionChannels {
    pub close_rx: oneshot::Receiver<()>,
    pub outbound_rx: mpsc::Receiver<Arc<str>>,
}

/// Runs one connection to completion.
pub async fn run_session(
    id: ConnectionId,
    stream: BoxedStream,
    channels: SessionChannels,
    ctx: SessionContext,
) -> SessionEnd {
    let SessionChannels {
        mut close_rx,
        mut outbound_rx,
    } = channels;
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut framer = LineFramer::new(ctx.max_line_length);
    let mut buf = [0u8; READ_CHUNK];

    // Every await below is raced against the close signal: a dispatch queue
    // that is full or a peer that stopped reading must not delay shutdown.
    let end = 'session: loop {
        tokio::select! {
            _ = &mut close_rx => break SessionEnd::ClosedByServer,

            read = reader.read(&mut buf) => match read {
                Ok(0) => break SessionEnd::PeerClosed,
                Ok(n) => {
                    framer.push(&buf[..n]);
                    while let Some(frame) = framer.next_frame() {
                        tokio::select! {
                            biased;
                            _ = &mut close_rx => break 'session SessionEnd::ClosedByServer,
                            () = handle_frame(id, frame, &ctx) => {}
                        }
                    }
                }
                Err(e) => break SessionEnd::ReadFailed(e),
            },

            Some(line) = outbound_rx.recv() => {
                tokio::select! {
                    biased;
                    _ = &mut close_rx => break SessionEnd::ClosedByServer,
                    written = write_line(&mut writer, &line) => {
                        if let Err(e) = written {
                            break SessionEnd::WriteFailed(e);
                        }
                    }
                }
            }
        }
    };

    // `stop` may already own the entry; either way it is gone afterwards.
    drop(ctx.registry.remove(id));
    drop(reader);
    drop(writer);

    match &end {
        SessionEnd::PeerClosed => info!("client {id} closed the connection"),
        SessionEnd::ClosedByServer => debug!("client {id} closed by server"),
        SessionEnd::ReadFailed(e) => debug!("client {id} read error: {e}"),
        SessionEnd::WriteFailed(e) => debug!("client {id} write error: {e}"),
    }
    ctx.events.emit(ServerEvent::ClientDisconnected { id });
    end
}

async fn handle_frame(id: ConnectionId, frame: Result<Bytes, FrameError>, ctx: &SessionContext) {
    let line = match frame {
        Ok(line) => line,
        Err(e) => {
            report_protocol_error(id, &ProtocolError::from(e), ctx);
            return;
        }
    };

    ctx.events.emit(ServerEvent::MessageReceived {
        raw: String::from_utf8_lossy(&line).into_owned(),
    });

    match decode_frame(&line) {
        Ok(event) => {
            debug!("client {id}: {event:?}");
            if !ctx.dispatch.submit(id, event).await {
                debug!("client {id}: dispatch worker has stopped; dropping {}", event.kind());
            }
        }
        Err(e) => report_protocol_error(id, &e, ctx),
    }
}

fn report_protocol_error(id: ConnectionId, e: &ProtocolError, ctx: &SessionContext) {
    warn!("client {id}: dropping line: {e}");
    ctx.events.warning(format!("client {id}: dropped line: {e}"));
}

async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
