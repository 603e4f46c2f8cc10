//! Peer directory: who is reachable and what key they declared.
//!
//! Maintains two maps keyed by party handle: an ordered list of live
//! connection handles, and the public key the party last submitted. The
//! driver serializes all access, so each method is a complete per-party
//! read-modify-write unit.
//!
//! # Invariants
//!
//! - A party is present iff its connection list is non-empty; the directory
//!   never holds an empty list
//! - A key record exists only while the party has at least one registered
//!   connection
//! - A reconnecting party may be present without a key (until it resubmits);
//!   the reverse window never occurs

use std::collections::HashMap;

use bytes::Bytes;

/// In-memory registry of connected parties and their public keys.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    /// Party → live connection handles, in registration order
    connections: HashMap<String, Vec<u64>>,
    /// Party → last submitted public key material
    keys: HashMap<String, Bytes>,
}

impl PeerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a party.
    ///
    /// Returns `true` if this was the party's first connection (the caller
    /// should announce the arrival to other parties).
    pub fn register_connection(&mut self, party: &str, handle: u64) -> bool {
        let handles = self.connections.entry(party.to_string()).or_default();
        let first = handles.is_empty();
        handles.push(handle);
        first
    }

    /// Unregister a connection.
    ///
    /// Returns `true` if this was the party's last connection; the party
    /// and its key record are then removed and the caller should announce
    /// the departure. Unknown parties or handles are a silent no-op:
    /// disconnect races are benign timing overlaps, not failures.
    pub fn unregister_connection(&mut self, party: &str, handle: u64) -> bool {
        let Some(handles) = self.connections.get_mut(party) else {
            return false;
        };

        handles.retain(|&h| h != handle);

        if handles.is_empty() {
            self.connections.remove(party);
            self.keys.remove(party);
            return true;
        }
        false
    }

    /// Store a party's public key. Latest write wins; no expiry.
    pub fn set_public_key(&mut self, party: &str, key: Bytes) {
        debug_assert!(self.is_connected(party), "key stored for absent party");
        self.keys.insert(party.to_string(), key);
    }

    /// The party's public key, or `None` if it has not submitted one.
    /// Absence is an expected condition, not a fault.
    pub fn public_key(&self, party: &str) -> Option<&Bytes> {
        self.keys.get(party)
    }

    /// Whether the party has at least one live connection.
    pub fn is_connected(&self, party: &str) -> bool {
        self.connections.contains_key(party)
    }

    /// Live connection handles for a party.
    pub fn connections(&self, party: &str) -> impl Iterator<Item = u64> + '_ {
        self.connections.get(party).into_iter().flatten().copied()
    }

    /// Sorted snapshot of present parties.
    pub fn parties(&self) -> Vec<String> {
        let mut parties: Vec<String> = self.connections.keys().cloned().collect();
        parties.sort();
        parties
    }

    /// Number of present parties.
    pub fn party_count(&self) -> usize {
        self.connections.len()
    }
}
