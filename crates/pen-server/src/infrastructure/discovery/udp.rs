//! UDP discovery responder.
//!
//! While the server is advertised, a background thread listens on the
//! discovery port for probe datagrams and answers each one with the
//! service's advertisement record.  A remote on the same LAN broadcasts a
//! probe, collects the replies, and connects to the `port` in the record it
//! wants.
//!
//! # Wire format
//!
//! Probe (remote → server), one JSON object per datagram:
//!
//! ```json
//! {"type":"discover"}
//! {"type":"discover","identifier":"00001101-0000-1000-8000-00805f9b34fb"}
//! ```
//!
//! With `identifier` present the server replies only if it matches the
//! advertised identifier.  The reply (server → remote, unicast to the probe's
//! source address) is the [`AdvertisementRecord`] serialized as JSON.
//!
//! # Threads
//!
//! Socket I/O is synchronous, so each advertisement gets its own named
//! thread.  The socket has a short read timeout; on every timeout the thread
//! re-checks its `running` flag, which is how `withdraw` stops it.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Duration;

use pen_core::{AdvertisementRecord, ServiceDescriptor};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::advertise::{DiscoveryRegistrar, RegistrarError};

/// UDP port the responder listens on unless configured otherwise.
pub const DEFAULT_DISCOVERY_PORT: u16 = 24850;

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_DATAGRAM: usize = 1024;

/// A discovery probe.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Probe {
    Discover {
        #[serde(default)]
        identifier: Option<Uuid>,
    },
}

struct Responder {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Registrar that answers UDP discovery probes.
pub struct UdpDiscoveryRegistrar {
    bind_ip: std::net::IpAddr,
    port: u16,
    responders: Mutex<HashMap<Uuid, Responder>>,
}

impl std::fmt::Debug for UdpDiscoveryRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpDiscoveryRegistrar")
            .field("bind_ip", &self.bind_ip)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl UdpDiscoveryRegistrar {
    /// Responder on `0.0.0.0:port`.
    pub fn new(port: u16) -> Self {
        Self::with_bind_ip(std::net::Ipv4Addr::UNSPECIFIED.into(), port)
    }

    pub fn with_bind_ip(bind_ip: std::net::IpAddr, port: u16) -> Self {
        Self {
            bind_ip,
            port,
            responders: Mutex::new(HashMap::new()),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn responders(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Responder>> {
        self.responders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiscoveryRegistrar for UdpDiscoveryRegistrar {
    fn advertise(&self, descriptor: &ServiceDescriptor) -> Result<(), RegistrarError> {
        let mut responders = self.responders();
        if responders.contains_key(&descriptor.identifier) {
            return Err(RegistrarError::Rejected(format!(
                "{} is already advertised",
                descriptor.identifier
            )));
        }

        let addr = SocketAddr::new(self.bind_ip, self.port);
        let socket = UdpSocket::bind(addr).map_err(|source| RegistrarError::Bind {
            port: self.port,
            source,
        })?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;

        let record = descriptor.advertisement_record();
        let reply = serde_json::to_vec(&record)
            .map_err(|e| RegistrarError::Rejected(format!("cannot encode record: {e}")))?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let identifier = record.identifier;

        let thread = std::thread::Builder::new()
            .name("pen-discovery".to_string())
            .spawn(move || responder_loop(socket, identifier, reply, flag))?;

        info!(
            "answering discovery probes for \"{}\" on UDP {addr}",
            record.name
        );
        responders.insert(identifier, Responder { running, thread });
        Ok(())
    }

    fn withdraw(&self, identifier: Uuid) -> Result<(), RegistrarError> {
        let responder = self
            .responders()
            .remove(&identifier)
            .ok_or(RegistrarError::NotAdvertised(identifier))?;
        responder.running.store(false, Ordering::Release);
        if responder.thread.join().is_err() {
            error!("discovery responder thread panicked");
        }
        debug!("discovery responder for {identifier} stopped");
        Ok(())
    }
}

impl Drop for UdpDiscoveryRegistrar {
    fn drop(&mut self) {
        for (_, responder) in self.responders().drain() {
            responder.running.store(false, Ordering::Release);
        }
    }
}

fn responder_loop(socket: UdpSocket, identifier: Uuid, reply: Vec<u8>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; MAX_DATAGRAM];

    while running.load(Ordering::Acquire) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!("discovery recv error: {e}");
                continue;
            }
        };

        if !should_answer(&buf[..len], identifier) {
            debug!("ignoring datagram from {src}");
            continue;
        }
        if let Err(e) = socket.send_to(&reply, src) {
            warn!("failed to answer discovery probe from {src}: {e}");
        } else {
            debug!("answered discovery probe from {src}");
        }
    }
}

/// Whether `datagram` is a probe this responder should answer.
fn should_answer(datagram: &[u8], identifier: Uuid) -> bool {
    match serde_json::from_slice::<Probe>(datagram) {
        Ok(Probe::Discover { identifier: None }) => true,
        Ok(Probe::Discover {
            identifier: Some(wanted),
        }) => wanted == identifier,
        Err(_) => false,
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Parses a reply datagram.  Used by remotes and tests.
pub fn parse_reply(datagram: &[u8]) -> Option<AdvertisementRecord> {
    serde_json::from_slice(datagram).ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
