//! TCP listening endpoint.
//!
//! `listen` walks the same four steps every stream transport needs (create
//! the socket, bind, read back the assigned port, start listening) and maps
//! each failure to its own [`SetupError`] variant.  Binding to port `0` lets
//! the OS choose a free port, which is then reported through
//! [`TransportListener::local_port`].
//!
//! `tokio::net::TcpSocket` is used instead of `TcpListener::bind` because the
//! latter folds bind and listen into one call and hides which step failed.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, info};

use crate::application::transport::{Accepted, SetupError, Transport, TransportListener};

/// Pending-connection queue length passed to `listen(2)`.
const LISTEN_BACKLOG: u32 = 16;

/// Transport that listens on a TCP socket address.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind_address: SocketAddr,
}

impl TcpTransport {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self { bind_address }
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self) -> Result<Box<dyn TransportListener>, SetupError> {
        let addr = self.bind_address;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(SetupError::TransportInit)?;

        // Allows a quick restart while old connections sit in TIME_WAIT.
        // Windows' SO_REUSEADDR means something else entirely, so skip it there.
        #[cfg(unix)]
        socket
            .set_reuseaddr(true)
            .map_err(SetupError::TransportInit)?;

        socket.bind(addr).map_err(|source| SetupError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local = socket.local_addr().map_err(SetupError::PortQuery)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(SetupError::Listen)?;

        info!("listening on TCP {local}");
        Ok(Box::new(TcpTransportListener {
            listener,
            port: local.port(),
        }))
    }
}

/// A bound TCP listener.
#[derive(Debug)]
pub struct TcpTransportListener {
    listener: TcpListener,
    port: u16,
}

#[async_trait]
impl TransportListener for TcpTransportListener {
    fn local_port(&self) -> u16 {
        self.port
    }

    async fn accept(&mut self) -> io::Result<Accepted> {
        let (stream, peer) = self.listener.accept().await?;
        // Input events are tiny and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle for {peer}: {e}");
        }
        Ok(Accepted {
            stream: Box::new(stream),
            remote_address: peer.to_string(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn loopback_any_port() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_listen_on_port_zero_reports_assigned_port() {
        // Arrange
        let transport = TcpTransport::new(loopback_any_port());

        // Act
        let listener = transport.listen().await.unwrap();

        // Assert
        assert_ne!(listener.local_port(), 0, "OS must assign a real port");
    }

    #[tokio::test]
    async fn test_accepted_stream_carries_bytes_and_peer_address() {
        // Arrange
        let transport = TcpTransport::new(loopback_any_port());
        let mut listener = transport.listen().await.unwrap();
        let port = listener.local_port();

        // Act
        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();
        client.write_all(b"ping\n").await.unwrap();
        let mut buf = [0u8; 5];
        accepted.stream.read_exact(&mut buf).await.unwrap();

        // Assert
        assert_eq!(&buf, b"ping\n");
        assert!(accepted.remote_address.starts_with("127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_bind_to_taken_port_is_a_bind_error() {
        // Arrange: hold a port with a plain listener (no SO_REUSEADDR games
        // apply to an actively listening socket).
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = holder.local_addr().unwrap();
        let transport = TcpTransport::new(taken);

        // Act
        let result = transport.listen().await;

        // Assert
        match result {
            Err(SetupError::Bind { addr, .. }) => assert_eq!(addr, taken.to_string()),
            Err(SetupError::Listen(_)) => {} // some platforms defer the conflict to listen()
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("binding a taken port must fail"),
        }
    }

    #[tokio::test]
    async fn test_dropping_listener_refuses_new_connections() {
        let transport = TcpTransport::new(loopback_any_port());
        let listener = transport.listen().await.unwrap();
        let port = listener.local_port();

        drop(listener);

        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
