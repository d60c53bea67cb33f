//! Service-level domain types: advertisement record, lifecycle state,
//! connection identifiers, and outward notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one accepted client connection.
pub type ConnectionId = Uuid;

/// Externally visible lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    Stopped,
    Running,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Stopped => f.write_str("Stopped"),
            ServerState::Running => f.write_str("Running"),
        }
    }
}

/// Describes one running instance of the service.
///
/// Built once by `Start`, never mutated afterwards, and dropped by `Stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Human-readable service name shown to remote devices.
    pub name: String,
    /// Stable service class identifier the remote looks for.
    pub identifier: Uuid,
    /// Human-readable comment published alongside the name.
    pub comment: String,
    /// Port the listening endpoint was assigned.
    pub bound_port: u16,
    /// Whether the discovery registrar accepted the advertisement.
    pub advertised: bool,
}

impl ServiceDescriptor {
    /// Returns a copy with the `advertised` flag set.
    pub fn with_advertised(self, advertised: bool) -> Self {
        Self { advertised, ..self }
    }

    /// Builds the record published by a discovery registrar.
    pub fn advertisement_record(&self) -> AdvertisementRecord {
        AdvertisementRecord {
            name: self.name.clone(),
            identifier: self.identifier,
            port: self.bound_port,
            comment: self.comment.clone(),
        }
    }
}

/// The advertisement published so remote devices can find the service.
///
/// ```json
/// {"name":"Drawing Pen Remote","identifier":"00001101-0000-1000-8000-00805f9b34fb","port":5,"comment":"Remote control for Drawing Pen"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementRecord {
    pub name: String,
    pub identifier: Uuid,
    pub port: u16,
    pub comment: String,
}

/// Notifications the server emits to its host (UI, plugin shim, or the
/// stdout control stream).
///
/// # Serde representation
///
/// ```json
/// {"type":"ServerStarted","port":5}
/// {"type":"ClientConnected","id":"…","remote_address":"127.0.0.1:50123"}
/// {"type":"Warning","text":"dropped malformed line: …"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    ServerStarted { port: u16 },
    ServerStopped,
    ClientConnected { id: ConnectionId, remote_address: String },
    ClientDisconnected { id: ConnectionId },
    MessageReceived { raw: String },
    Warning { text: String },
    Error { text: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
