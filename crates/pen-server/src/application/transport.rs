//! Listening-endpoint abstraction.
//!
//! The server only needs three things from its transport: a listening
//! endpoint, the port that endpoint was assigned, and a stream of accepted
//! byte-stream connections.  Keeping that behind [`Transport`] lets the
//! lifecycle and accept loop run unchanged over TCP in production and over
//! in-memory duplex pipes in tests.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Failure to bring up the listening endpoint.  Fatal to `start`.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The transport subsystem could not create an endpoint.
    #[error("failed to initialise transport: {0}")]
    TransportInit(#[source] io::Error),

    /// The endpoint could not be bound to the requested address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The assigned port could not be read back from the endpoint.
    #[error("failed to query assigned port: {0}")]
    PortQuery(#[source] io::Error),

    /// The endpoint refused to enter the listening state.
    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),
}

/// A bidirectional byte stream for one accepted connection.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Owned, type-erased connection stream.
pub type BoxedStream = Box<dyn ByteStream>;

/// One accepted connection.
pub struct Accepted {
    pub stream: BoxedStream,
    /// Peer address in display form, e.g. `"192.168.1.20:51544"`.
    pub remote_address: String,
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("remote_address", &self.remote_address)
            .finish_non_exhaustive()
    }
}

/// A bound, listening endpoint.
///
/// Dropping the listener closes the endpoint.
#[async_trait]
pub trait TransportListener: Send {
    /// The port the endpoint was assigned when it was bound.
    fn local_port(&self) -> u16;

    /// Waits for the next incoming connection.
    async fn accept(&mut self) -> io::Result<Accepted>;
}

/// Factory for listening endpoints.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Initialises the transport, binds an endpoint, reads back its port and
    /// starts listening.  Anything acquired before a failing step is released
    /// before the error is returned.
    async fn listen(&self) -> Result<Box<dyn TransportListener>, SetupError>;
}

/// Returns `true` when an accept error means the endpoint itself is gone,
/// as opposed to a single connection attempt failing.
pub fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected | io::ErrorKind::Unsupported
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_aborted_is_not_fatal() {
        let e = io::Error::new(io::ErrorKind::ConnectionAborted, "aborted");
        assert!(!is_fatal_accept_error(&e));
    }

    #[test]
    fn test_invalid_endpoint_is_fatal() {
        let e = io::Error::new(io::ErrorKind::InvalidInput, "bad fd");
        assert!(is_fatal_accept_error(&e));
    }

    #[test]
    fn test_setup_error_messages_name_the_failing_step() {
        let bind = SetupError::Bind {
            addr: "0.0.0.0:0".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(bind.to_string().starts_with("failed to bind 0.0.0.0:0"));

        let listen = SetupError::Listen(io::Error::new(io::ErrorKind::Other, "nope"));
        assert!(listen.to_string().contains("listen"));
    }

    #[tokio::test]
    async fn test_duplex_stream_is_a_byte_stream() {
        let (a, _b) = tokio::io::duplex(16);
        let boxed: BoxedStream = Box::new(a);
        let accepted = Accepted {
            stream: boxed,
            remote_address: "memory".to_string(),
        };
        assert!(format!("{accepted:?}").contains("memory"));
    }
}
