//! Relay driver: the handshake coordinator.
//!
//! Ties together the peer directory and the relay keypair behind a sans-IO
//! interface: the runtime feeds [`RelayEvent`]s in, the driver returns
//! [`RelayAction`]s to execute. The driver performs no I/O and owns all
//! shared mutable state, so the runtime can serialize access with a single
//! lock and every directory update is atomic per party.
//!
//! # Handshake sequence
//!
//! ```text
//! initiator                relay                    responder
//!     │  SubmitPublicKey     │     SubmitPublicKey      │
//!     ├─────────────────────►│◄─────────────────────────┤
//!     │  StartHandshake      │                          │
//!     ├─────────────────────►│  HandshakeRequested      │
//!     │     HandshakeReply   ├─────────────────────────►│
//!     │◄─────────────────────┤                          │
//!     │  SubmitSessionKey    │                          │
//!     ├─────────────────────►│  SessionKeySet           │
//!     │                      ├─────────────────────────►│
//! ```
//!
//! Every forwarded artifact is signed with the relay's private key over the
//! ciphertext bytes only. The session key travels in a double envelope; the
//! relay strips the outer layer and signs the inner one without ever seeing
//! the key itself.

use std::collections::HashMap;

use bytes::Bytes;
use keyrelay_crypto::{CryptoRngCore, Keypair, PublicKey, decrypt, encrypt, sign};
use keyrelay_proto::{Event, RejectReason, Request};

use crate::{directory::PeerDirectory, error::DriverError};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent connections; further accepts are closed
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events the relay driver processes, produced by the runtime.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A request frame arrived on a connection
    RequestReceived {
        /// Connection that sent the frame
        session_id: u64,
        /// The decoded request
        request: Request,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
    },
}

/// Actions the relay driver produces, executed by the runtime.
#[derive(Debug, Clone)]
pub enum RelayAction {
    /// Send an event frame to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Event to deliver
        event: Event,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },
}

/// Per-connection state. A session is anonymous until its `Hello` binds it
/// to a party handle.
#[derive(Debug, Default)]
struct Session {
    party: Option<String>,
}

/// Sans-IO relay driver.
///
/// Generic over the RNG so production runs on an OS-backed generator and
/// tests run seeded.
pub struct RelayDriver<R: CryptoRngCore> {
    /// Connection state (session ID → session)
    sessions: HashMap<u64, Session>,
    /// Presence and key registry
    directory: PeerDirectory,
    /// The relay's long-lived keypair, loaded once at startup
    keypair: Keypair,
    /// RNG for encryption padding
    rng: R,
    config: RelayConfig,
}

impl<R: CryptoRngCore> RelayDriver<R> {
    /// Create a new driver around the relay keypair.
    pub fn new(keypair: Keypair, rng: R, config: RelayConfig) -> Self {
        Self { sessions: HashMap::new(), directory: PeerDirectory::new(), keypair, rng, config }
    }

    /// The relay's public key, for publication to parties out-of-band.
    pub fn relay_public_key(&self) -> &PublicKey {
        self.keypair.public()
    }

    /// Read access to the directory (tests and monitoring).
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Process one event and return the actions to execute.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, DriverError> {
        match event {
            RelayEvent::ConnectionAccepted { session_id } => self.handle_accepted(session_id),
            RelayEvent::RequestReceived { session_id, request } => {
                self.handle_request(session_id, request)
            },
            RelayEvent::ConnectionClosed { session_id } => self.handle_closed(session_id),
        }
    }

    fn handle_accepted(&mut self, session_id: u64) -> Result<Vec<RelayAction>, DriverError> {
        if self.sessions.contains_key(&session_id) {
            return Err(DriverError::SessionAlreadyExists(session_id));
        }

        if self.sessions.len() >= self.config.max_connections {
            return Ok(vec![RelayAction::CloseConnection {
                session_id,
                reason: "connection limit reached".to_string(),
            }]);
        }

        self.sessions.insert(session_id, Session::default());
        Ok(Vec::new())
    }

    fn handle_closed(&mut self, session_id: u64) -> Result<Vec<RelayAction>, DriverError> {
        // Close races with the accept-limit path are benign
        let Some(session) = self.sessions.remove(&session_id) else {
            return Ok(Vec::new());
        };

        let Some(party) = session.party else {
            return Ok(Vec::new());
        };

        if self.directory.unregister_connection(&party, session_id) {
            return Ok(self.broadcast_except(session_id, &Event::PeerDisconnected { party }));
        }
        Ok(Vec::new())
    }

    fn handle_request(
        &mut self,
        session_id: u64,
        request: Request,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if !self.sessions.contains_key(&session_id) {
            return Err(DriverError::SessionNotFound(session_id));
        }

        match request {
            Request::Hello { party } => self.handle_hello(session_id, party),
            Request::SubmitPublicKey { key_for_relay } => {
                self.handle_submit_public_key(session_id, &key_for_relay)
            },
            Request::StartHandshake { peer } => self.handle_start_handshake(session_id, &peer),
            Request::SubmitSessionKey { peer, sealed_key } => {
                self.handle_submit_session_key(session_id, &peer, &sealed_key)
            },
            Request::RelayMessage { peer, ciphertext } => {
                self.handle_relay_message(session_id, &peer, ciphertext)
            },
        }
    }

    fn handle_hello(
        &mut self,
        session_id: u64,
        party: String,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let session = self.sessions.get_mut(&session_id).ok_or(DriverError::SessionNotFound(session_id))?;

        if session.party.is_some() {
            return Ok(reject(session_id, RejectReason::MalformedRequest));
        }
        session.party = Some(party.clone());

        let first = self.directory.register_connection(&party, session_id);

        let mut actions = Vec::new();
        if first {
            actions.extend(self.broadcast_except(session_id, &Event::PeerConnected { party }));
        }
        actions.push(RelayAction::SendToSession {
            session_id,
            event: Event::PeerList { parties: self.directory.parties() },
        });
        Ok(actions)
    }

    fn handle_submit_public_key(
        &mut self,
        session_id: u64,
        key_for_relay: &[u8],
    ) -> Result<Vec<RelayAction>, DriverError> {
        let Some(party) = self.identified_party(session_id) else {
            return Ok(reject(session_id, RejectReason::MalformedRequest));
        };

        let Ok(key_material) = decrypt(&self.keypair, key_for_relay) else {
            return Ok(reject(session_id, RejectReason::DecryptionFailure));
        };

        // Validate before storing: a key that cannot parse would poison
        // every later handshake against this party
        if parse_public_key(&key_material).is_none() {
            return Ok(reject(session_id, RejectReason::InvalidKey));
        }

        self.directory.set_public_key(&party, Bytes::from(key_material));
        Ok(Vec::new())
    }

    fn handle_start_handshake(
        &mut self,
        session_id: u64,
        peer: &str,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let Some(caller) = self.identified_party(session_id) else {
            return Ok(reject(session_id, RejectReason::MalformedRequest));
        };

        if !self.directory.is_connected(peer) {
            return Ok(reject(session_id, RejectReason::PeerNotConnected));
        }

        let (Some(peer_key), Some(caller_key)) =
            (self.directory.public_key(peer).cloned(), self.directory.public_key(&caller).cloned())
        else {
            return Ok(reject(session_id, RejectReason::PeerKeyMissing));
        };

        let (Some(peer_public), Some(caller_public)) =
            (parse_public_key(&peer_key), parse_public_key(&caller_key))
        else {
            return Ok(reject(session_id, RejectReason::InvalidKey));
        };

        // Caller's key, encrypted for the peer and signed by the relay
        let Ok(key_for_peer) = encrypt(&mut self.rng, &peer_public, &caller_key) else {
            return Ok(reject(session_id, RejectReason::EncryptionFailure));
        };
        let peer_signature = sign(&self.keypair, &key_for_peer)?;

        // Peer's key, encrypted for the caller: the synchronous reply
        let Ok(key_for_caller) = encrypt(&mut self.rng, &caller_public, &peer_key) else {
            return Ok(reject(session_id, RejectReason::EncryptionFailure));
        };
        let caller_signature = sign(&self.keypair, &key_for_caller)?;

        let mut actions = self.send_to_party(
            peer,
            &Event::HandshakeRequested {
                from: caller,
                key_for_peer,
                signature: peer_signature,
            },
        );
        actions.push(RelayAction::SendToSession {
            session_id,
            event: Event::HandshakeReply {
                peer: peer.to_string(),
                key_for_caller,
                signature: caller_signature,
            },
        });
        Ok(actions)
    }

    fn handle_submit_session_key(
        &mut self,
        session_id: u64,
        peer: &str,
        sealed_key: &[u8],
    ) -> Result<Vec<RelayAction>, DriverError> {
        let Some(caller) = self.identified_party(session_id) else {
            return Ok(reject(session_id, RejectReason::MalformedRequest));
        };

        if !self.directory.is_connected(peer) {
            return Ok(reject(session_id, RejectReason::PeerNotConnected));
        }

        // Strip the outer envelope only. What remains is the session key
        // encrypted under the peer's public key; the relay signs those
        // bytes and forwards them without ever holding the key itself
        let Ok(key_for_peer) = decrypt(&self.keypair, sealed_key) else {
            return Ok(reject(session_id, RejectReason::DecryptionFailure));
        };
        let signature = sign(&self.keypair, &key_for_peer)?;

        Ok(self.send_to_party(
            peer,
            &Event::SessionKeySet { from: caller, key_for_peer, signature },
        ))
    }

    fn handle_relay_message(
        &mut self,
        session_id: u64,
        peer: &str,
        ciphertext: Vec<u8>,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let Some(caller) = self.identified_party(session_id) else {
            return Ok(reject(session_id, RejectReason::MalformedRequest));
        };

        if !self.directory.is_connected(peer) {
            return Ok(reject(session_id, RejectReason::PeerNotConnected));
        }

        Ok(self.send_to_party(peer, &Event::MessageReceived { from: caller, ciphertext }))
    }

    /// The party bound to a session by its `Hello`, if any.
    fn identified_party(&self, session_id: u64) -> Option<String> {
        self.sessions.get(&session_id).and_then(|s| s.party.clone())
    }

    /// One send action per live connection of `party`.
    fn send_to_party(&self, party: &str, event: &Event) -> Vec<RelayAction> {
        self.directory
            .connections(party)
            .map(|session_id| RelayAction::SendToSession { session_id, event: event.clone() })
            .collect()
    }

    /// One send action per session other than `exclude`.
    fn broadcast_except(&self, exclude: u64, event: &Event) -> Vec<RelayAction> {
        self.sessions
            .keys()
            .filter(|&&session_id| session_id != exclude)
            .map(|&session_id| RelayAction::SendToSession { session_id, event: event.clone() })
            .collect()
    }
}

fn reject(session_id: u64, reason: RejectReason) -> Vec<RelayAction> {
    vec![RelayAction::SendToSession { session_id, event: Event::Rejected { reason } }]
}

fn parse_public_key(material: &[u8]) -> Option<PublicKey> {
    let pem = std::str::from_utf8(material).ok()?;
    PublicKey::from_pem(pem).ok()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn test_driver() -> RelayDriver<ChaCha20Rng> {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let keypair = Keypair::generate(&mut rng, 1024).unwrap();
        RelayDriver::new(keypair, rng, RelayConfig::default())
    }

    fn connect(driver: &mut RelayDriver<ChaCha20Rng>, session_id: u64, party: &str) {
        driver.process_event(RelayEvent::ConnectionAccepted { session_id }).unwrap();
        driver
            .process_event(RelayEvent::RequestReceived {
                session_id,
                request: Request::Hello { party: party.to_string() },
            })
            .unwrap();
    }

    fn rejection(actions: &[RelayAction]) -> Option<RejectReason> {
        match actions {
            [RelayAction::SendToSession { event: Event::Rejected { reason }, .. }] => Some(*reason),
            _ => None,
        }
    }

    #[test]
    fn hello_returns_peer_list_and_announces_arrival() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");

        driver.process_event(RelayEvent::ConnectionAccepted { session_id: 2 }).unwrap();
        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 2,
                request: Request::Hello { party: "bob".to_string() },
            })
            .unwrap();

        // Arrival broadcast to alice, then the roster back to bob
        assert!(matches!(
            &actions[0],
            RelayAction::SendToSession { session_id: 1, event: Event::PeerConnected { party } }
                if party == "bob"
        ));
        assert!(matches!(
            &actions[1],
            RelayAction::SendToSession { session_id: 2, event: Event::PeerList { parties } }
                if *parties == vec!["alice".to_string(), "bob".to_string()]
        ));
    }

    #[test]
    fn second_connection_of_same_party_is_not_announced() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");

        driver.process_event(RelayEvent::ConnectionAccepted { session_id: 2 }).unwrap();
        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 2,
                request: Request::Hello { party: "alice".to_string() },
            })
            .unwrap();

        // Only the roster reply; no PeerConnected broadcast
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            RelayAction::SendToSession { session_id: 2, event: Event::PeerList { .. } }
        ));
    }

    #[test]
    fn repeated_hello_is_malformed() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");

        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 1,
                request: Request::Hello { party: "alice".to_string() },
            })
            .unwrap();

        assert_eq!(rejection(&actions), Some(RejectReason::MalformedRequest));
    }

    #[test]
    fn request_before_hello_is_malformed() {
        let mut driver = test_driver();
        driver.process_event(RelayEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 1,
                request: Request::StartHandshake { peer: "bob".to_string() },
            })
            .unwrap();

        assert_eq!(rejection(&actions), Some(RejectReason::MalformedRequest));
    }

    #[test]
    fn handshake_with_absent_peer_rejected() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");

        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 1,
                request: Request::StartHandshake { peer: "bob".to_string() },
            })
            .unwrap();

        assert_eq!(rejection(&actions), Some(RejectReason::PeerNotConnected));
    }

    #[test]
    fn handshake_with_keyless_peer_rejected_without_state_change() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");
        connect(&mut driver, 2, "bob");

        let parties_before = driver.directory().parties();

        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 1,
                request: Request::StartHandshake { peer: "bob".to_string() },
            })
            .unwrap();

        assert_eq!(rejection(&actions), Some(RejectReason::PeerKeyMissing));
        assert_eq!(driver.directory().parties(), parties_before);
        assert!(driver.directory().public_key("bob").is_none());
    }

    #[test]
    fn submitted_garbage_key_is_rejected_and_not_stored() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");

        // Properly enveloped for the relay, but not a public key inside
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let sealed =
            encrypt(&mut rng, driver.relay_public_key(), b"definitely not a PEM").unwrap();

        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 1,
                request: Request::SubmitPublicKey { key_for_relay: sealed },
            })
            .unwrap();

        assert_eq!(rejection(&actions), Some(RejectReason::InvalidKey));
        assert!(driver.directory().public_key("alice").is_none());
    }

    #[test]
    fn undecryptable_key_submission_rejected() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");

        let actions = driver
            .process_event(RelayEvent::RequestReceived {
                session_id: 1,
                request: Request::SubmitPublicKey { key_for_relay: vec![0xAA; 37] },
            })
            .unwrap();

        assert_eq!(rejection(&actions), Some(RejectReason::DecryptionFailure));
    }

    #[test]
    fn disconnect_announces_departure_and_clears_key() {
        let mut driver = test_driver();
        connect(&mut driver, 1, "alice");
        connect(&mut driver, 2, "bob");

        let actions = driver.process_event(RelayEvent::ConnectionClosed { session_id: 1 }).unwrap();

        assert!(matches!(
            &actions[..],
            [RelayAction::SendToSession { session_id: 2, event: Event::PeerDisconnected { party } }]
                if party == "alice"
        ));
        assert!(!driver.directory().is_connected("alice"));
    }

    #[test]
    fn close_of_unknown_session_is_noop() {
        let mut driver = test_driver();
        let actions = driver.process_event(RelayEvent::ConnectionClosed { session_id: 99 }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn connection_limit_closes_excess_connections() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let keypair = Keypair::generate(&mut rng, 1024).unwrap();
        let mut driver = RelayDriver::new(keypair, rng, RelayConfig { max_connections: 1 });

        driver.process_event(RelayEvent::ConnectionAccepted { session_id: 1 }).unwrap();
        let actions = driver.process_event(RelayEvent::ConnectionAccepted { session_id: 2 }).unwrap();

        assert!(matches!(
            &actions[..],
            [RelayAction::CloseConnection { session_id: 2, .. }]
        ));
    }

    #[test]
    fn duplicate_session_id_is_driver_error() {
        let mut driver = test_driver();
        driver.process_event(RelayEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        let err = driver.process_event(RelayEvent::ConnectionAccepted { session_id: 1 }).unwrap_err();
        assert!(matches!(err, DriverError::SessionAlreadyExists(1)));
    }
}
