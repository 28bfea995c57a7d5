//! End-to-end authentication and messaging flows over the in-memory store.
//!
//! Exercises the full pipeline the way a client drives it: register a
//! keypair, obtain and sign a challenge, open a session, rotate tokens,
//! trip the reuse detector, and exchange envelope-sealed conversations.

use ed25519_dalek::{Signer, SigningKey};
use uuid::Uuid;

use alcove_core::{
    AccessTokenSigner, AuthError, ChallengeIssuer, ConversationService, EnvelopeInput, Environment,
    Identity, IdentityRegistry, MemoryStore, NewMessage, SessionTokenService, SessionTokens,
    TokenFamilyTracker, testing::FixedEnv,
};
use alcove_crypto::{
    encryption_public_key, encryption_secret_key, open_content_key, seal_content_key,
};

const ACCESS_TTL: u64 = 900;

struct Harness {
    env: FixedEnv,
    store: MemoryStore,
    registry: IdentityRegistry<FixedEnv, MemoryStore>,
    issuer: ChallengeIssuer<FixedEnv, MemoryStore, MemoryStore>,
    sessions: SessionTokenService<FixedEnv, MemoryStore>,
    tracker: TokenFamilyTracker<FixedEnv, MemoryStore, MemoryStore>,
    conversations: ConversationService<FixedEnv, MemoryStore, MemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let env = FixedEnv::new(1_700_000_000);
        let store = MemoryStore::new();

        let registry = IdentityRegistry::new(env.clone(), store.clone());
        let issuer = ChallengeIssuer::new(env.clone(), store.clone(), store.clone());
        let signer = AccessTokenSigner::new(b"integration-secret", ACCESS_TTL);
        let sessions = SessionTokenService::new(env.clone(), store.clone(), signer);
        let tracker =
            TokenFamilyTracker::new(env.clone(), store.clone(), store.clone(), sessions.clone());
        let conversations = ConversationService::new(env.clone(), store.clone(), store.clone());

        Self { env, store, registry, issuer, sessions, tracker, conversations }
    }

    /// Full client-side login dance: challenge, sign, verify, mint.
    fn login(&self, key: &SigningKey) -> Result<SessionTokens, AuthError> {
        let fingerprint = alcove_crypto::fingerprint(&key.verifying_key().to_bytes());
        let issued = self.issuer.issue(&fingerprint)?;
        let signature = key.sign(issued.challenge.as_bytes());
        let identity = self.issuer.verify(&fingerprint, &issued.challenge, &signature.to_bytes())?;
        self.sessions.issue_session(&identity)
    }

    fn register(&self, seed: u8) -> (SigningKey, Identity) {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let identity = self.registry.register(&key.verifying_key().to_bytes(), None).unwrap();
        (key, identity)
    }
}

#[test]
fn scenario_a_full_lifecycle_with_reuse_detection() {
    let h = Harness::new();
    let (key, identity) = h.register(1);

    // register -> challenge -> sign -> login
    let first = h.login(&key).unwrap();
    let claims = h.sessions.signer().verify(&first.access_token, h.env.unix_now_secs()).unwrap();
    assert_eq!(claims.sub, identity.id);
    assert_eq!(first.expires_in, ACCESS_TTL);

    // refresh(R1) -> {A2, R2}
    let second = h.tracker.rotate(&first.refresh_token).unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);

    // refresh(R1) again -> reuse detected
    assert_eq!(h.tracker.rotate(&first.refresh_token), Err(AuthError::TokenReuseDetected));

    // and the family died with it: refresh(R2) fails
    assert_eq!(h.tracker.rotate(&second.refresh_token), Err(AuthError::TokenInvalid));

    // the client recovers only by a fresh login, which opens a new family
    let fresh = h.login(&key).unwrap();
    h.tracker.rotate(&fresh.refresh_token).unwrap();
}

#[test]
fn scenario_b_concurrent_rotation_race() {
    let h = Harness::new();
    let (key, identity) = h.register(1);
    let tokens = h.login(&key).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let tracker = h.tracker.clone();
        let token = tokens.refresh_token.clone();
        handles.push(std::thread::spawn(move || tracker.rotate(&token)));
    }

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Exactly one winner at most, and never two Active descendants
    assert!(outcomes.iter().filter(|o| o.is_ok()).count() <= 1);
    assert!(h.store.active_token_count(identity.id) <= 1);

    for loser in outcomes.iter().filter(|o| o.is_err()) {
        assert!(matches!(loser, Err(AuthError::TokenReuseDetected | AuthError::TokenInvalid)));
    }
}

#[test]
fn challenge_is_single_use_across_the_full_flow() {
    let h = Harness::new();
    let (key, _) = h.register(1);
    let fingerprint = alcove_crypto::fingerprint(&key.verifying_key().to_bytes());

    let issued = h.issuer.issue(&fingerprint).unwrap();
    let signature = key.sign(issued.challenge.as_bytes()).to_bytes();

    h.issuer.verify(&fingerprint, &issued.challenge, &signature).unwrap();
    assert_eq!(
        h.issuer.verify(&fingerprint, &issued.challenge, &signature),
        Err(AuthError::ChallengeNotFound)
    );
}

#[test]
fn login_on_expired_challenge_fails() {
    let h = Harness::new();
    let (key, _) = h.register(1);
    let fingerprint = alcove_crypto::fingerprint(&key.verifying_key().to_bytes());

    let issued = h.issuer.issue(&fingerprint).unwrap();
    let signature = key.sign(issued.challenge.as_bytes()).to_bytes();

    h.env.advance(301);

    assert_eq!(
        h.issuer.verify(&fingerprint, &issued.challenge, &signature),
        Err(AuthError::ChallengeExpired)
    );
}

#[test]
fn logout_everywhere_revokes_every_family() {
    let h = Harness::new();
    let (key, identity) = h.register(1);

    let laptop = h.login(&key).unwrap();
    let phone = h.login(&key).unwrap();

    let revoked = h.tracker.revoke_all(identity.id).unwrap();
    assert_eq!(revoked, 2);

    assert_eq!(h.tracker.rotate(&laptop.refresh_token), Err(AuthError::TokenInvalid));
    assert_eq!(h.tracker.rotate(&phone.refresh_token), Err(AuthError::TokenInvalid));
}

#[test]
fn conversation_envelopes_round_trip_client_side() {
    let h = Harness::new();
    let (alice_key, alice) = h.register(1);
    let (bob_key, bob) = h.register(2);

    // Alice (the creating client) generates a content key and seals one
    // envelope per participant
    let content_key = {
        let mut key = [0u8; 32];
        h.env.random_bytes(&mut key);
        key
    };

    let mut envelopes = Vec::new();
    for (member, seed) in [(&alice, 10u8), (&bob, 20u8)] {
        let member_key = alcove_crypto::parse_public_key(&member.public_key).unwrap();
        let sealed = seal_content_key(
            &encryption_public_key(&member_key),
            &content_key,
            [seed; 32],
            [seed; 24],
        )
        .unwrap();
        envelopes.push(EnvelopeInput { identity_id: member.id, encrypted_key: sealed.encode() });
    }

    let conversation = h
        .conversations
        .create_conversation(
            alice.id,
            &[bob.id],
            envelopes,
            Some(NewMessage { ciphertext: vec![0xC1; 48], nonce: vec![0x01; 24] }),
        )
        .unwrap();

    // The server-stored blobs are distinct and never equal the key
    let (_, stored) = h.conversations.conversation(conversation.id, bob.id).unwrap();
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0].encrypted_key, stored[1].encrypted_key);
    for envelope in &stored {
        assert!(!envelope.encrypted_key.windows(32).any(|w| w == content_key));
    }

    // Bob fetches his envelope and unwraps the same content key Alice made
    let bob_envelope = stored.iter().find(|e| e.identity_id == bob.id).unwrap();
    let decoded = alcove_crypto::KeyEnvelope::decode(&bob_envelope.encrypted_key).unwrap();
    let unwrapped = open_content_key(&encryption_secret_key(&bob_key), &decoded).unwrap();
    assert_eq!(unwrapped, content_key);

    // Alice can unwrap hers too; they hold the same key without the server
    // ever seeing it
    let alice_envelope = stored.iter().find(|e| e.identity_id == alice.id).unwrap();
    let decoded = alcove_crypto::KeyEnvelope::decode(&alice_envelope.encrypted_key).unwrap();
    let unwrapped = open_content_key(&encryption_secret_key(&alice_key), &decoded).unwrap();
    assert_eq!(unwrapped, content_key);
}

#[test]
fn message_relay_is_byte_faithful_end_to_end() {
    let h = Harness::new();
    let (_, alice) = h.register(1);
    let (_, bob) = h.register(2);

    let envelopes = vec![
        EnvelopeInput { identity_id: alice.id, encrypted_key: vec![1; 105] },
        EnvelopeInput { identity_id: bob.id, encrypted_key: vec![2; 105] },
    ];
    let conversation =
        h.conversations.create_conversation(alice.id, &[bob.id], envelopes, None).unwrap();

    let payloads: Vec<(Vec<u8>, Vec<u8>)> = (0u8..5)
        .map(|i| ((0..=i).cycle().take(100 + i as usize).collect(), vec![i; 24]))
        .collect();

    for (ciphertext, nonce) in &payloads {
        h.conversations
            .send_message(conversation.id, alice.id, ciphertext.clone(), nonce.clone())
            .unwrap();
    }

    let listed = h.conversations.messages(conversation.id, bob.id, 0, 100).unwrap();
    assert_eq!(listed.len(), payloads.len());
    for (message, (ciphertext, nonce)) in listed.iter().zip(&payloads) {
        assert_eq!(&message.ciphertext, ciphertext);
        assert_eq!(&message.nonce, nonce);
    }
}

#[test]
fn suspended_identity_is_locked_out_of_the_whole_flow() {
    let h = Harness::new();
    let (key, identity) = h.register(1);
    let tokens = h.login(&key).unwrap();

    h.registry.suspend(identity.id, None).unwrap();

    let fingerprint = alcove_crypto::fingerprint(&key.verifying_key().to_bytes());
    assert_eq!(h.issuer.issue(&fingerprint), Err(AuthError::Suspended));
    assert_eq!(h.tracker.rotate(&tokens.refresh_token), Err(AuthError::Suspended));

    h.registry.reinstate(identity.id).unwrap();
    h.login(&key).unwrap();
}

#[test]
fn duplicate_registration_cannot_shadow_an_identity() {
    let h = Harness::new();
    let (key, original) = h.register(1);

    let result = h.registry.register(&key.verifying_key().to_bytes(), Some("imposter".into()));
    assert_eq!(result, Err(AuthError::DuplicateFingerprint));

    let found = h.registry.lookup(&original.fingerprint).unwrap();
    assert_eq!(found.id, original.id);
    assert_eq!(found.display_name, None);
}

#[test]
fn ghost_participant_cannot_join_a_conversation() {
    let h = Harness::new();
    let (_, alice) = h.register(1);
    let ghost = Uuid::from_u128(0xD00D);

    let result = h.conversations.create_conversation(
        alice.id,
        &[ghost],
        vec![
            EnvelopeInput { identity_id: alice.id, encrypted_key: vec![1; 32] },
            EnvelopeInput { identity_id: ghost, encrypted_key: vec![2; 32] },
        ],
        None,
    );
    assert_eq!(result, Err(AuthError::NotFound("participant")));
}
