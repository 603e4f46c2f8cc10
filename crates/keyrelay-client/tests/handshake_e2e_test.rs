//! Full handshake between two clients through a real relay driver.
//!
//! Routes driver actions to the matching client and client requests back
//! into the driver until the exchange settles, then checks both sides
//! hold the same session key and the relay never saw it in the clear.

use keyrelay_client::{ClientError, HandshakeClient, SESSION_KEY_LEN};
use keyrelay_crypto::Keypair;
use keyrelay_proto::{Event, Request};
use keyrelay_server::{RelayAction, RelayConfig, RelayDriver, RelayEvent};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const ALICE_SESSION: u64 = 1;
const BOB_SESSION: u64 = 2;

struct Network {
    driver: RelayDriver<ChaCha20Rng>,
    alice: HandshakeClient,
    bob: HandshakeClient,
    rng: ChaCha20Rng,
}

impl Network {
    fn new(seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let relay_keypair = Keypair::generate(&mut rng, 1024).unwrap();
        let relay_public = relay_keypair.public().clone();

        let alice_keypair = Keypair::generate(&mut rng, 1024).unwrap();
        let bob_keypair = Keypair::generate(&mut rng, 1024).unwrap();

        let driver_rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(1));
        let driver = RelayDriver::new(relay_keypair, driver_rng, RelayConfig::default());

        Self {
            driver,
            alice: HandshakeClient::new("alice", alice_keypair, relay_public.clone()),
            bob: HandshakeClient::new("bob", bob_keypair, relay_public),
            rng,
        }
    }

    /// Connect both parties and submit their public keys.
    fn connect_all(&mut self) {
        for session_id in [ALICE_SESSION, BOB_SESSION] {
            self.driver.process_event(RelayEvent::ConnectionAccepted { session_id }).unwrap();
        }

        let hello = self.alice.hello();
        self.submit(ALICE_SESSION, hello);
        let hello = self.bob.hello();
        self.submit(BOB_SESSION, hello);

        let submit = self.alice.submit_public_key(&mut self.rng).unwrap();
        self.submit(ALICE_SESSION, submit);
        let submit = self.bob.submit_public_key(&mut self.rng).unwrap();
        self.submit(BOB_SESSION, submit);
    }

    /// Push a request into the driver and pump the resulting events through
    /// the clients, recursing until no follow-up requests remain.
    fn submit(&mut self, session_id: u64, request: Request) {
        let actions = self
            .driver
            .process_event(RelayEvent::RequestReceived { session_id, request })
            .unwrap();
        self.deliver(&actions);
    }

    fn deliver(&mut self, actions: &[RelayAction]) {
        let mut followups = Vec::new();

        for action in actions {
            let RelayAction::SendToSession { session_id, event } = action else {
                panic!("unexpected connection close");
            };
            let requests = match *session_id {
                ALICE_SESSION => self.alice.handle_event(&mut self.rng, event.clone()).unwrap(),
                BOB_SESSION => self.bob.handle_event(&mut self.rng, event.clone()).unwrap(),
                other => panic!("event for unknown session {other}"),
            };
            followups.extend(requests.into_iter().map(|request| (*session_id, request)));
        }

        for (session_id, request) in followups {
            self.submit(session_id, request);
        }
    }
}

#[test]
fn handshake_establishes_matching_session_keys() {
    let mut net = Network::new(0xE2E);
    net.connect_all();

    let start = net.alice.start_handshake("bob");
    net.submit(ALICE_SESSION, start);

    let alice_key = net.alice.session_key("bob").expect("alice should hold a session key");
    let bob_key = net.bob.session_key("alice").expect("bob should hold a session key");

    assert_eq!(alice_key, bob_key);
    assert_eq!(alice_key.len(), SESSION_KEY_LEN);

    // Both sides also hold each other's authenticated public key
    assert!(net.alice.peer_public_key("bob").is_some());
    assert!(net.bob.peer_public_key("alice").is_some());
}

#[test]
fn rosters_converge_after_connect() {
    let mut net = Network::new(0x505);
    net.connect_all();

    let alice_roster: Vec<&str> = net.alice.roster().collect();
    let bob_roster: Vec<&str> = net.bob.roster().collect();
    assert_eq!(alice_roster, vec!["alice", "bob"]);
    assert_eq!(bob_roster, vec!["alice", "bob"]);
}

#[test]
fn tampered_reply_aborts_the_handshake() {
    let mut net = Network::new(0xBAD);
    net.connect_all();

    let start = net.alice.start_handshake("bob");
    let actions = net
        .driver
        .process_event(RelayEvent::RequestReceived { session_id: ALICE_SESSION, request: start })
        .unwrap();

    // Intercept alice's reply and flip a ciphertext bit before delivery
    let reply = actions
        .iter()
        .find_map(|action| match action {
            RelayAction::SendToSession { session_id: ALICE_SESSION, event } => Some(event.clone()),
            _ => None,
        })
        .expect("alice should receive a reply");

    let Event::HandshakeReply { peer, mut key_for_caller, signature } = reply else {
        panic!("expected HandshakeReply");
    };
    key_for_caller[0] ^= 0x01;

    let err = net
        .alice
        .handle_event(&mut net.rng, Event::HandshakeReply { peer, key_for_caller, signature })
        .unwrap_err();

    assert_eq!(err, ClientError::SignatureRejected { from: "bob".to_string() });
    assert!(net.alice.session_key("bob").is_none());
}

#[test]
fn messages_flow_once_keys_are_established() {
    let mut net = Network::new(0xC4A7);
    net.connect_all();

    let start = net.alice.start_handshake("bob");
    net.submit(ALICE_SESSION, start);

    // Payload stands in for session-cipher output; the relay and the
    // handshake layer both treat it as opaque
    let payload = vec![0x5A; 48];
    let message = net.alice.relay_message("bob", payload.clone());
    let actions = net
        .driver
        .process_event(RelayEvent::RequestReceived { session_id: ALICE_SESSION, request: message })
        .unwrap();

    let forwarded = actions
        .iter()
        .find_map(|action| match action {
            RelayAction::SendToSession { session_id: BOB_SESSION, event } => Some(event),
            _ => None,
        })
        .expect("bob should receive the payload");

    assert!(matches!(
        forwarded,
        Event::MessageReceived { from, ciphertext } if from == "alice" && *ciphertext == payload
    ));
}
