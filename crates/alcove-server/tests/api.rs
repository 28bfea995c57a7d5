//! HTTP-level integration tests.
//!
//! Drives the router the way real clients do: JSON bodies, Bearer tokens,
//! and client-side signing/sealing via `alcove-crypto`. Uses the in-memory
//! backend; the redb backend is covered by its own unit tests.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{Value, json};
use tower::ServiceExt;

use alcove_core::MemoryStore;
use alcove_server::{AppState, RuntimeConfig, SystemEnv, router};

fn test_router() -> Router {
    let config = RuntimeConfig::default();
    let state = AppState::new(&config, SystemEnv::new(), MemoryStore::new(), b"api-test-secret");
    router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

/// Register a keypair and return (identity id, fingerprint).
async fn register(app: &Router, key: &SigningKey, name: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "public_key": BASE64.encode(key.verifying_key().to_bytes()),
            "display_name": name,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    (
        body["identity"]["id"].as_str().unwrap().to_string(),
        body["identity"]["fingerprint"].as_str().unwrap().to_string(),
    )
}

/// Full challenge-response login; returns (access_token, refresh_token).
async fn login(app: &Router, key: &SigningKey, fingerprint: &str) -> (String, String) {
    let (status, body) =
        send(app, "POST", "/auth/challenge", None, Some(json!({ "fingerprint": fingerprint })))
            .await;
    assert_eq!(status, StatusCode::OK, "challenge failed: {body}");

    let challenge = body["challenge"].as_str().unwrap().to_string();
    let signature = key.sign(challenge.as_bytes());

    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({
            "fingerprint": fingerprint,
            "challenge": challenge,
            "signature": BASE64.encode(signature.to_bytes()),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");

    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_is_public() {
    let app = test_router();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_challenge_login_flow() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);

    let (_, fingerprint) = register(&app, &key, "nyx").await;
    let (access, refresh) = login(&app, &key, &fingerprint).await;

    assert!(!access.is_empty());
    assert!(!refresh.is_empty());
    assert_ne!(access, refresh);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);

    register(&app, &key, "first").await;

    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "public_key": BASE64.encode(key.verifying_key().to_bytes()) })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn malformed_public_key_is_bad_request() {
    let app = test_router();

    let (status, _) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "public_key": BASE64.encode([0u8; 16]) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn challenge_for_unknown_fingerprint_is_unauthorized() {
    let app = test_router();

    // Well-formed but unregistered fingerprint: the response must not
    // reveal that nobody owns it
    let fingerprint = "ab".repeat(32);
    let (status, body) =
        send(&app, "POST", "/auth/challenge", None, Some(json!({ "fingerprint": fingerprint })))
            .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn login_with_wrong_signature_is_unauthorized() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);
    let intruder = SigningKey::from_bytes(&[2u8; 32]);

    let (_, fingerprint) = register(&app, &key, "nyx").await;

    let (_, body) =
        send(&app, "POST", "/auth/challenge", None, Some(json!({ "fingerprint": fingerprint })))
            .await;
    let challenge = body["challenge"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({
            "fingerprint": fingerprint,
            "challenge": challenge,
            "signature": BASE64.encode(intruder.sign(challenge.as_bytes()).to_bytes()),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // The body is the same generic message as every other auth failure
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn challenge_is_single_use_over_http() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);
    let (_, fingerprint) = register(&app, &key, "nyx").await;

    let (_, body) =
        send(&app, "POST", "/auth/challenge", None, Some(json!({ "fingerprint": fingerprint })))
            .await;
    let challenge = body["challenge"].as_str().unwrap().to_string();
    let login_body = json!({
        "fingerprint": fingerprint,
        "challenge": challenge,
        "signature": BASE64.encode(key.sign(challenge.as_bytes()).to_bytes()),
    });

    let (status, _) = send(&app, "POST", "/auth/login", None, Some(login_body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/auth/login", None, Some(login_body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotation_and_reuse_detection() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);
    let (_, fingerprint) = register(&app, &key, "nyx").await;
    let (_, r1) = login(&app, &key, &fingerprint).await;

    // Rotate: R1 -> R2
    let (status, body) =
        send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": r1 }))).await;
    assert_eq!(status, StatusCode::OK);
    let r2 = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(r1, r2);

    // Replay R1: reuse detected, surfaced as a generic 401
    let (status, body) =
        send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": r1 }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "session invalid, please sign in again");

    // The whole family is dead: R2 fails too
    let (status, _) =
        send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": r2 }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A fresh login recovers
    login(&app, &key, &fingerprint).await;
}

#[tokio::test]
async fn authenticated_routes_reject_missing_or_garbage_tokens() {
    let app = test_router();

    let (status, _) = send(
        &app,
        "POST",
        "/messages/conversations",
        None,
        Some(json!({ "participant_ids": [], "key_envelopes": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/messages/conversations",
        Some("not-a-jwt"),
        Some(json!({ "participant_ids": [], "key_envelopes": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_family() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);
    let (_, fingerprint) = register(&app, &key, "nyx").await;
    let (access, refresh) = login(&app, &key, &fingerprint).await;

    let (status, _) = send(
        &app,
        "POST",
        "/auth/logout",
        Some(&access),
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) =
        send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": refresh }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_everywhere_ends_all_sessions() {
    let app = test_router();
    let key = SigningKey::from_bytes(&[1u8; 32]);
    let (_, fingerprint) = register(&app, &key, "nyx").await;

    let (_, laptop) = login(&app, &key, &fingerprint).await;
    let (access, phone) = login(&app, &key, &fingerprint).await;

    let (status, _) = send(
        &app,
        "POST",
        "/auth/logout",
        Some(&access),
        Some(json!({ "refresh_token": phone, "everywhere": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for token in [laptop, phone] {
        let (status, _) =
            send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": token })))
                .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn logout_with_someone_elses_token_is_rejected() {
    let app = test_router();
    let alice = SigningKey::from_bytes(&[1u8; 32]);
    let bob = SigningKey::from_bytes(&[2u8; 32]);

    let (_, alice_fp) = register(&app, &alice, "alice").await;
    let (_, bob_fp) = register(&app, &bob, "bob").await;

    let (alice_access, _) = login(&app, &alice, &alice_fp).await;
    let (_, bob_refresh) = login(&app, &bob, &bob_fp).await;

    let (status, _) = send(
        &app,
        "POST",
        "/auth/logout",
        Some(&alice_access),
        Some(json!({ "refresh_token": bob_refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Bob's session is untouched
    let (status, _) =
        send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": bob_refresh })))
            .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn conversation_lifecycle_with_sealed_envelopes() {
    let app = test_router();
    let alice = SigningKey::from_bytes(&[1u8; 32]);
    let bob = SigningKey::from_bytes(&[2u8; 32]);
    let mallory = SigningKey::from_bytes(&[3u8; 32]);

    let (alice_id, alice_fp) = register(&app, &alice, "alice").await;
    let (bob_id, bob_fp) = register(&app, &bob, "bob").await;
    let (_, mallory_fp) = register(&app, &mallory, "mallory").await;

    let (alice_access, _) = login(&app, &alice, &alice_fp).await;
    let (bob_access, _) = login(&app, &bob, &bob_fp).await;
    let (mallory_access, _) = login(&app, &mallory, &mallory_fp).await;

    // Alice seals a content key for both participants, client-side
    let content_key = [0x5Au8; 32];
    let seal_for = |recipient: &SigningKey, salt: u8| {
        let recipient_public =
            alcove_crypto::encryption_public_key(&recipient.verifying_key());
        let envelope = alcove_crypto::seal_content_key(
            &recipient_public,
            &content_key,
            [salt; 32],
            [salt.wrapping_add(1); 24],
        )
        .unwrap();
        BASE64.encode(envelope.encode())
    };

    let (status, body) = send(
        &app,
        "POST",
        "/messages/conversations",
        Some(&alice_access),
        Some(json!({
            "participant_ids": [bob_id],
            "key_envelopes": {
                (alice_id.clone()): seal_for(&alice, 11),
                (bob_id.clone()): seal_for(&bob, 22),
            },
            "initial_message": {
                "ciphertext": BASE64.encode([0xC1u8; 48]),
                "nonce": BASE64.encode([0x01u8; 24]),
            },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    let conversation_id = body["conversation"]["id"].as_str().unwrap().to_string();

    // Bob reads the detail and unwraps his envelope to Alice's key
    let (status, body) = send(
        &app,
        "GET",
        &format!("/messages/conversations/{conversation_id}"),
        Some(&bob_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 2);

    let bob_blob = participants
        .iter()
        .find(|p| p["identity_id"] == bob_id.as_str())
        .map(|p| p["encrypted_key"].as_str().unwrap())
        .unwrap();
    let decoded =
        alcove_crypto::KeyEnvelope::decode(&BASE64.decode(bob_blob).unwrap()).unwrap();
    let unwrapped = alcove_crypto::open_content_key(
        &alcove_crypto::encryption_secret_key(&bob),
        &decoded,
    )
    .unwrap();
    assert_eq!(unwrapped, content_key);

    // Mallory is frozen out
    let (status, _) = send(
        &app,
        "GET",
        &format!("/messages/conversations/{conversation_id}"),
        Some(&mallory_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Bob sends; bytes come back identical
    let ciphertext = BASE64.encode([0xD2u8; 100]);
    let nonce = BASE64.encode([0x0Fu8; 24]);
    let (status, body) = send(
        &app,
        "POST",
        &format!("/messages/conversations/{conversation_id}/messages"),
        Some(&bob_access),
        Some(json!({ "ciphertext": ciphertext, "nonce": nonce })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["ciphertext"], ciphertext);
    assert_eq!(body["message"]["nonce"], nonce);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/messages/conversations/{conversation_id}/messages?from=0&limit=10"),
        Some(&alice_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2, "initial message plus Bob's");
    assert_eq!(messages[0]["ciphertext"], BASE64.encode([0xC1u8; 48]));
    assert_eq!(messages[1]["ciphertext"], ciphertext);

    // Mallory cannot inject either
    let (status, _) = send(
        &app,
        "POST",
        &format!("/messages/conversations/{conversation_id}/messages"),
        Some(&mallory_access),
        Some(json!({ "ciphertext": BASE64.encode([1u8; 8]), "nonce": BASE64.encode([1u8; 8]) })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn conversation_requires_envelope_coverage() {
    let app = test_router();
    let alice = SigningKey::from_bytes(&[1u8; 32]);
    let bob = SigningKey::from_bytes(&[2u8; 32]);

    let (_, alice_fp) = register(&app, &alice, "alice").await;
    let (bob_id, _) = register(&app, &bob, "bob").await;
    let (alice_access, _) = login(&app, &alice, &alice_fp).await;

    // Missing the creator's own envelope
    let (status, body) = send(
        &app,
        "POST",
        "/messages/conversations",
        Some(&alice_access),
        Some(json!({
            "participant_ids": [bob_id],
            "key_envelopes": { (bob_id.clone()): BASE64.encode([0u8; 105]) },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}
