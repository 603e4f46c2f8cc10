//! Keyrelay production server.
//!
//! The relay that mediates public-key exchange between parties: it stores
//! each party's declared public key, introduces pairs of parties on request
//! (signing everything it forwards), and relays the double-enveloped
//! symmetric session key without ever seeing its plaintext.
//!
//! # Architecture
//!
//! [`RelayDriver`] is a sans-IO state machine: events in, actions out, no
//! I/O of its own. This crate wraps it with production glue - a Tokio TCP
//! accept loop, length-prefixed CBOR framing from `keyrelay-proto`, and a
//! shared writer map so any task can deliver events to any session.
//!
//! # Components
//!
//! - [`RelayDriver`]: handshake coordinator (pure logic)
//! - [`PeerDirectory`]: presence and key registry, owned by the driver
//! - [`Server`]: runtime that executes driver actions over TCP

#![forbid(unsafe_code)]

mod directory;
mod driver;
mod error;

use std::{collections::HashMap, sync::Arc};

pub use directory::PeerDirectory;
pub use driver::{RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use error::{DriverError, ServerError};
use keyrelay_crypto::Keypair;
use keyrelay_proto::{LEN_PREFIX_SIZE, Request, body_len, decode_body, encode_frame};
use rand::rngs::OsRng;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, tcp::OwnedWriteHalf},
    sync::{Mutex, RwLock},
};

/// Shared state for all connections: session ID → outbound write half.
/// All events to a session go through its single writer, preserving order.
struct SharedState {
    writers: RwLock<HashMap<u64, Mutex<OwnedWriteHalf>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:4040")
    pub bind_address: String,
    /// Path to the relay's private key (PEM, PKCS#1 or PKCS#8)
    pub key_path: String,
    /// Driver configuration (connection limits)
    pub relay: RelayConfig,
}

/// Production keyrelay server.
///
/// Wraps [`RelayDriver`] with a TCP transport and OS randomness.
pub struct Server {
    driver: Arc<Mutex<RelayDriver<OsRng>>>,
    listener: TcpListener,
}

impl Server {
    /// Load the relay keypair, bind the listener, and build the driver.
    ///
    /// # Errors
    ///
    /// - `Config` if the key file is unreadable or not a private key
    /// - `Transport` if the bind address is unavailable
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let pem = tokio::fs::read_to_string(&config.key_path).await.map_err(|e| {
            ServerError::Config(format!("failed to read relay key {}: {e}", config.key_path))
        })?;
        let keypair = Keypair::from_private_key_pem(&pem)
            .map_err(|e| ServerError::Config(format!("failed to parse relay key: {e}")))?;

        let listener = TcpListener::bind(&config.bind_address).await?;
        let driver = RelayDriver::new(keypair, OsRng, config.relay);

        Ok(Self { driver: Arc::new(Mutex::new(driver)), listener })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until the process is shut down or the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.listener.local_addr()?);

        let shared = Arc::new(SharedState { writers: RwLock::new(HashMap::new()) });
        let mut next_session_id: u64 = 0;

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    next_session_id += 1;
                    let session_id = next_session_id;
                    tracing::debug!("connection {session_id} accepted from {addr}");

                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, session_id, driver, shared).await
                        {
                            tracing::debug!("connection {session_id} error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.listener.local_addr().map_err(Into::into)
    }
}

/// Handle a single TCP connection: frame loop in, driver actions out.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    session_id: u64,
    driver: Arc<Mutex<RelayDriver<OsRng>>>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let (mut reader, writer) = stream.into_split();

    {
        let mut writers = shared.writers.write().await;
        writers.insert(session_id, Mutex::new(writer));
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(RelayEvent::ConnectionAccepted { session_id })?;
        execute_actions(actions, &shared).await;
    }

    loop {
        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        if reader.read_exact(&mut prefix).await.is_err() {
            break; // peer closed
        }

        let len = match body_len(prefix) {
            Ok(len) => len,
            Err(e) => {
                tracing::warn!("connection {session_id}: {e}");
                break;
            },
        };

        let mut body = vec![0u8; len];
        if reader.read_exact(&mut body).await.is_err() {
            break;
        }

        let request: Request = match decode_body(&body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("connection {session_id}: {e}");
                break;
            },
        };

        let actions = {
            let mut driver = driver.lock().await;
            match driver.process_event(RelayEvent::RequestReceived { session_id, request }) {
                Ok(actions) => actions,
                Err(e) => {
                    tracing::warn!("connection {session_id}: {e}");
                    continue;
                },
            }
        };
        execute_actions(actions, &shared).await;
    }

    {
        let mut writers = shared.writers.write().await;
        writers.remove(&session_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(RelayEvent::ConnectionClosed { session_id })?;
        execute_actions(actions, &shared).await;
    }

    Ok(())
}

/// Execute driver actions against the shared writer map.
///
/// Send failures are logged, not propagated: a dead session will be
/// cleaned up by its own connection task.
async fn execute_actions(actions: Vec<RelayAction>, shared: &SharedState) {
    for action in actions {
        match action {
            RelayAction::SendToSession { session_id, event } => {
                let mut buf = Vec::new();
                if let Err(e) = encode_frame(&event, &mut buf) {
                    tracing::error!("failed to encode event for {session_id}: {e}");
                    continue;
                }

                let writers = shared.writers.read().await;
                if let Some(writer_mutex) = writers.get(&session_id) {
                    let mut writer = writer_mutex.lock().await;
                    if let Err(e) = writer.write_all(&buf).await {
                        tracing::warn!("send to session {session_id} failed: {e}");
                    }
                } else {
                    tracing::debug!("send to session {session_id}: already gone");
                }
            },

            RelayAction::CloseConnection { session_id, reason } => {
                tracing::info!("closing connection {session_id}: {reason}");
                let mut writers = shared.writers.write().await;
                if let Some(writer_mutex) = writers.remove(&session_id) {
                    let mut writer = writer_mutex.into_inner();
                    let _ = writer.shutdown().await;
                }
            },
        }
    }
}
