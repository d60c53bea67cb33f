//! Discovery registrar interface.
//!
//! Advertising makes the running service findable by name and identifier.
//! Both operations are best-effort: the lifecycle logs a failure and carries
//! on without discoverability, it never fails `start` or `stop` because of it.

use pen_core::ServiceDescriptor;
use thiserror::Error;
use uuid::Uuid;

/// Error type for discovery registrar operations.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The discovery endpoint could not be bound.
    #[error("failed to bind discovery socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// A socket operation other than bind failed.
    #[error("discovery socket error: {0}")]
    Io(#[from] std::io::Error),
    /// The registrar refused the advertisement.
    #[error("advertisement rejected: {0}")]
    Rejected(String),
    /// Nothing is advertised under this identifier.
    #[error("no advertisement for {0}")]
    NotAdvertised(Uuid),
}

/// Publishes and withdraws the service advertisement.
#[cfg_attr(test, mockall::automock)]
pub trait DiscoveryRegistrar: Send + Sync {
    /// Publishes `{name, identifier, port, comment}` from `descriptor`.
    fn advertise(&self, descriptor: &ServiceDescriptor) -> Result<(), RegistrarError>;

    /// Removes the advertisement published under `identifier`.
    fn withdraw(&self, identifier: Uuid) -> Result<(), RegistrarError>;
}
