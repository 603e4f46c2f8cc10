//! Party-side handshake state machine.
//!
//! Drives one party's half of the relay-mediated key exchange: builds the
//! requests to send, consumes the events the relay pushes back, and tracks
//! per-peer state until a shared session key is established. No I/O and no
//! ambient randomness; the caller owns the transport and supplies the RNG.
//!
//! Signature verification is mandatory here. Every relay-forwarded
//! artifact is checked against the relay's known public key before it is
//! decrypted or trusted; a failed check aborts that handshake with
//! [`ClientError::SignatureRejected`].

use std::collections::{BTreeSet, HashMap};

use keyrelay_crypto::{CryptoRngCore, Keypair, PublicKey, decrypt, encrypt, verify};
use keyrelay_proto::{Event, Request};

use crate::error::ClientError;

/// Session key length in bytes (AES-256 sized).
pub const SESSION_KEY_LEN: usize = 32;

/// What this party knows about one peer.
#[derive(Debug, Default)]
struct PeerSession {
    /// The peer's public key, once authenticated and decrypted
    public_key: Option<PublicKey>,
    /// The established symmetric session key, most recent exchange wins
    session_key: Option<Vec<u8>>,
}

/// One party's view of the handshake protocol.
///
/// Chat payloads (`MessageReceived`) are not consumed here: once
/// [`session_key`](Self::session_key) yields a key, the session cipher
/// layered above this crate owns them.
pub struct HandshakeClient {
    party: String,
    keypair: Keypair,
    relay_key: PublicKey,
    roster: BTreeSet<String>,
    peers: HashMap<String, PeerSession>,
}

impl HandshakeClient {
    /// Create a client for `party`, holding its keypair and the relay's
    /// public key (learned out-of-band).
    pub fn new(party: impl Into<String>, keypair: Keypair, relay_key: PublicKey) -> Self {
        Self {
            party: party.into(),
            keypair,
            relay_key,
            roster: BTreeSet::new(),
            peers: HashMap::new(),
        }
    }

    /// This party's handle.
    pub fn party(&self) -> &str {
        &self.party
    }

    /// The opening request binding the connection to this party.
    pub fn hello(&self) -> Request {
        Request::Hello { party: self.party.clone() }
    }

    /// Build the key submission: our public key PEM, encrypted under the
    /// relay's public key. Multi-block for any realistic key size.
    pub fn submit_public_key<R: CryptoRngCore>(&self, rng: &mut R) -> Result<Request, ClientError> {
        let pem = self.keypair.public().to_pem()?;
        let key_for_relay = encrypt(rng, &self.relay_key, pem.as_bytes())?;
        Ok(Request::SubmitPublicKey { key_for_relay })
    }

    /// Ask the relay to introduce us to `peer`.
    pub fn start_handshake(&self, peer: impl Into<String>) -> Request {
        Request::StartHandshake { peer: peer.into() }
    }

    /// Wrap an already-encrypted chat payload for forwarding.
    pub fn relay_message(&self, peer: impl Into<String>, ciphertext: Vec<u8>) -> Request {
        Request::RelayMessage { peer: peer.into(), ciphertext }
    }

    /// Consume a relay event and return any follow-up requests to send.
    ///
    /// # Errors
    ///
    /// - `SignatureRejected` if a relay signature fails to verify; the
    ///   offending material is discarded
    /// - `MalformedPeerKey` if authenticated material is not a public key
    /// - `Rejected` echoing a relay-side rejection of our own request
    pub fn handle_event<R: CryptoRngCore>(
        &mut self,
        rng: &mut R,
        event: Event,
    ) -> Result<Vec<Request>, ClientError> {
        match event {
            Event::PeerList { parties } => {
                self.roster = parties.into_iter().collect();
                Ok(Vec::new())
            },

            Event::PeerConnected { party } => {
                self.roster.insert(party);
                Ok(Vec::new())
            },

            Event::PeerDisconnected { party } => {
                self.roster.remove(&party);
                // Any established key is useless without the peer
                self.peers.remove(&party);
                Ok(Vec::new())
            },

            Event::HandshakeReply { peer, key_for_caller, signature } => {
                let peer_key = self.authenticate_peer_key(&peer, &key_for_caller, &signature)?;

                // We initiated, so we generate the session key and build
                // the double envelope: inner for the peer, outer for the
                // relay. Two independent encryptions; the relay can only
                // ever strip the outer one
                let mut session_key = vec![0u8; SESSION_KEY_LEN];
                rng.fill_bytes(&mut session_key);

                let inner = encrypt(rng, &peer_key, &session_key)?;
                let sealed_key = encrypt(rng, &self.relay_key, &inner)?;

                let entry = self.peers.entry(peer.clone()).or_default();
                entry.public_key = Some(peer_key);
                entry.session_key = Some(session_key);

                Ok(vec![Request::SubmitSessionKey { peer, sealed_key }])
            },

            Event::HandshakeRequested { from, key_for_peer, signature } => {
                let peer_key = self.authenticate_peer_key(&from, &key_for_peer, &signature)?;
                self.peers.entry(from).or_default().public_key = Some(peer_key);
                // The initiator generates the key; we wait for SessionKeySet
                Ok(Vec::new())
            },

            Event::SessionKeySet { from, key_for_peer, signature } => {
                if !verify(&self.relay_key, &key_for_peer, &signature) {
                    return Err(ClientError::SignatureRejected { from });
                }

                let session_key = decrypt(&self.keypair, &key_for_peer)?;
                self.peers.entry(from).or_default().session_key = Some(session_key);
                Ok(Vec::new())
            },

            // Session-cipher traffic; handled by the layer above
            Event::MessageReceived { .. } => Ok(Vec::new()),

            Event::Rejected { reason } => Err(ClientError::Rejected { reason }),
        }
    }

    /// The established session key for `peer`, if the handshake completed.
    pub fn session_key(&self, peer: &str) -> Option<&[u8]> {
        self.peers.get(peer)?.session_key.as_deref()
    }

    /// The peer's authenticated public key, if known.
    pub fn peer_public_key(&self, peer: &str) -> Option<&PublicKey> {
        self.peers.get(peer)?.public_key.as_ref()
    }

    /// Currently present parties, as last reported by the relay.
    pub fn roster(&self) -> impl Iterator<Item = &str> {
        self.roster.iter().map(String::as_str)
    }

    /// Verify the relay signature over forwarded key material, then
    /// decrypt and parse it.
    fn authenticate_peer_key(
        &self,
        from: &str,
        ciphertext: &[u8],
        signature: &[u8],
    ) -> Result<PublicKey, ClientError> {
        if !verify(&self.relay_key, ciphertext, signature) {
            return Err(ClientError::SignatureRejected { from: from.to_string() });
        }

        let material = decrypt(&self.keypair, ciphertext)?;
        let pem = std::str::from_utf8(&material)
            .map_err(|_| ClientError::MalformedPeerKey { from: from.to_string() })?;

        PublicKey::from_pem(pem)
            .map_err(|_| ClientError::MalformedPeerKey { from: from.to_string() })
    }
}
