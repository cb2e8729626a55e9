// tests/curve.rs
//
// CURVE handshakes end to end, plus the tamper and replay cases that
// must surface as encryption failures rather than framing errors.

#![cfg(feature = "curve")]

use zmtp_security::{
  create_mechanism, curve_keypair, CurveOptions, CurvePublicKey, IDataCipher, Mechanism,
  MechanismConfig, MechanismKind, SecurityError, ZapEndpoint,
};

mod common;
use common::{spawn_authenticator, ZapPolicy};

struct TestKeys {
  client_public: CurvePublicKey,
  client_secret: zmtp_security::CurveSecretKey,
  server_public: CurvePublicKey,
  server_secret: zmtp_security::CurveSecretKey,
}

fn fresh_keys() -> TestKeys {
  let (client_public, client_secret) = curve_keypair();
  let (server_public, server_secret) = curve_keypair();
  TestKeys {
    client_public,
    client_secret,
    server_public,
    server_secret,
  }
}

fn client_config(keys: &TestKeys) -> MechanismConfig {
  MechanismConfig {
    mechanism: MechanismKind::Curve,
    as_server: false,
    socket_type_name: "DEALER".into(),
    routing_id: Some(b"curve-client".to_vec()),
    curve: CurveOptions {
      local_secret_key: Some(keys.client_secret.clone()),
      remote_public_key: Some(keys.server_public),
    },
    ..Default::default()
  }
}

fn server_config(keys: &TestKeys, endpoint: Option<ZapEndpoint>) -> MechanismConfig {
  MechanismConfig {
    mechanism: MechanismKind::Curve,
    as_server: true,
    socket_type_name: "ROUTER".into(),
    zap_domain: Some("global".into()),
    peer_address: "127.0.0.1:4242".into(),
    zap_endpoint: endpoint,
    curve: CurveOptions {
      local_secret_key: Some(keys.server_secret.clone()),
      remote_public_key: None,
    },
    ..Default::default()
  }
}

#[tokio::test]
async fn curve_handshake_succeeds_with_zap() {
  common::setup_tracing();
  let keys = fresh_keys();
  let (endpoint, log) = spawn_authenticator(ZapPolicy::Allow {
    user_id: "admin".into(),
  });

  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(&keys), server_config(&keys, Some(endpoint))).await;

  let client_outcome = client_outcome.expect("client handshake");
  let server_outcome = server_outcome.expect("server handshake");

  // The authenticator saw exactly one request carrying the client's
  // 32-byte long-term public key as the single credential frame.
  let requests = log.lock().unwrap();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0][5], b"CURVE");
  assert_eq!(requests[0][6], keys.client_public.as_bytes());

  // The server learned the client's long-term key; metadata crossed
  // over encrypted but intact.
  assert_eq!(
    server_outcome.peer_identity,
    Some(keys.client_public.as_bytes().to_vec())
  );
  let server_view = server_outcome.metadata.unwrap();
  assert_eq!(server_view.get("Socket-Type"), Some(b"DEALER".as_slice()));
  assert_eq!(server_view.get("User-Id"), Some(b"admin".as_slice()));
  let client_view = client_outcome.metadata.unwrap();
  assert_eq!(client_view.get("Socket-Type"), Some(b"ROUTER".as_slice()));
}

#[tokio::test]
async fn curve_handshake_succeeds_without_zap() {
  common::setup_tracing();
  let keys = fresh_keys();
  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(&keys), server_config(&keys, None)).await;
  client_outcome.expect("client handshake");
  server_outcome.expect("server handshake");
}

#[tokio::test]
async fn curve_zap_denial_reaches_the_client_as_a_status_code() {
  common::setup_tracing();
  let keys = fresh_keys();
  let (endpoint, _log) = spawn_authenticator(ZapPolicy::Deny {
    status_code: "400".into(),
  });

  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(&keys), server_config(&keys, Some(endpoint))).await;

  assert_eq!(
    client_outcome.unwrap_err(),
    SecurityError::Authentication("400".into())
  );
  assert!(matches!(
    server_outcome.unwrap_err(),
    SecurityError::Authentication(_)
  ));
}

#[tokio::test]
async fn data_phase_round_trips_and_rejects_replay() {
  common::setup_tracing();
  let keys = fresh_keys();
  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(&keys), server_config(&keys, None)).await;
  let mut client_cipher = client_outcome.unwrap().cipher;
  let mut server_cipher = server_outcome.unwrap().cipher;

  let to_server = client_cipher.encrypt_frame(b"ping from the client").unwrap();
  assert_eq!(
    server_cipher.decrypt_frame(&to_server).unwrap(),
    b"ping from the client"
  );
  let to_client = server_cipher.encrypt_frame(b"pong from the server").unwrap();
  assert_eq!(
    client_cipher.decrypt_frame(&to_client).unwrap(),
    b"pong from the server"
  );

  // Replaying a frame cannot decrypt: the nonce state has advanced.
  let err = server_cipher.decrypt_frame(&to_server).unwrap_err();
  assert!(matches!(err, SecurityError::Encryption(_)));
}

// The remaining cases hand-drive the mechanisms so single commands can
// be intercepted and corrupted in flight.

fn pair(keys: &TestKeys, zap: Option<ZapEndpoint>) -> (Box<dyn Mechanism>, Box<dyn Mechanism>) {
  let client = create_mechanism(&client_config(keys)).unwrap();
  let server = create_mechanism(&server_config(keys, zap)).unwrap();
  (client, server)
}

#[tokio::test]
async fn garbage_server_key_is_an_encryption_failure_and_no_zap_request_is_sent() {
  common::setup_tracing();
  let keys = fresh_keys();
  let (endpoint, log) = spawn_authenticator(ZapPolicy::Allow {
    user_id: "admin".into(),
  });

  let mut bad_keys_config = client_config(&keys);
  bad_keys_config.curve.remote_public_key = Some(CurvePublicKey::from_bytes([0x42; 32]));
  let mut client = create_mechanism(&bad_keys_config).unwrap();
  let mut server = create_mechanism(&server_config(&keys, Some(endpoint))).unwrap();

  let hello = client.produce_token().unwrap().unwrap();
  let err = server.process_token(&hello).unwrap_err();
  assert!(matches!(err, SecurityError::Encryption(_)));
  // Decryption failed before authentication was ever attempted.
  assert!(server.zap_request_needed().is_none());
  assert!(log.lock().unwrap().is_empty());
}

#[test]
fn hello_with_wrong_size_or_version_is_a_framing_error() {
  let keys = fresh_keys();
  let (mut client, mut server) = pair(&keys, None);
  let hello = client.produce_token().unwrap().unwrap();
  assert_eq!(hello.len(), 200);

  let truncated = &hello[..199];
  assert!(matches!(
    server.process_token(truncated).unwrap_err(),
    SecurityError::Framing(_)
  ));

  let mut wrong_version = hello.clone();
  wrong_version[6] = 2;
  assert!(matches!(
    server.process_token(&wrong_version).unwrap_err(),
    SecurityError::Framing(_)
  ));
}

#[test]
fn tampered_cookie_and_tampered_initiate_box_are_encryption_failures() {
  // Byte 9 lands in the cookie, byte 120 in the encrypted body; both
  // must be rejected as encryption failures, not framing errors.
  for tamper_offset in [9usize, 50, 104, 120, 200] {
    let keys = fresh_keys();
    let (mut client, mut server) = pair(&keys, None);

    let hello = client.produce_token().unwrap().unwrap();
    server.process_token(&hello).unwrap();
    let welcome = server.produce_token().unwrap().unwrap();
    assert_eq!(welcome.len(), 168);
    client.process_token(&welcome).unwrap();
    let mut initiate = client.produce_token().unwrap().unwrap();
    assert!(initiate.len() >= 257);

    initiate[tamper_offset] ^= 0x01;
    let err = server.process_token(&initiate).unwrap_err();
    assert!(
      matches!(err, SecurityError::Encryption(_)),
      "offset {}: got {:?}",
      tamper_offset,
      err
    );
  }
}

#[test]
fn tampered_welcome_is_an_encryption_failure_on_the_client() {
  let keys = fresh_keys();
  let (mut client, mut server) = pair(&keys, None);
  let hello = client.produce_token().unwrap().unwrap();
  server.process_token(&hello).unwrap();
  let mut welcome = server.produce_token().unwrap().unwrap();
  welcome[100] ^= 0x01;
  let err = client.process_token(&welcome).unwrap_err();
  assert!(matches!(err, SecurityError::Encryption(_)));
}

#[test]
fn duplicated_welcome_is_a_protocol_violation() {
  let keys = fresh_keys();
  let (mut client, mut server) = pair(&keys, None);
  let hello = client.produce_token().unwrap().unwrap();
  server.process_token(&hello).unwrap();
  let welcome = server.produce_token().unwrap().unwrap();
  client.process_token(&welcome).unwrap();
  // The client has moved on; a second WELCOME has no state to land in.
  let err = client.process_token(&welcome).unwrap_err();
  assert!(matches!(err, SecurityError::ProtocolViolation(_)));
}

#[tokio::test]
async fn curve_zap_reply_with_a_foreign_request_id_is_fatal() {
  common::setup_tracing();
  let keys = fresh_keys();
  let (endpoint, _log) = spawn_authenticator(ZapPolicy::Ignore);
  let (mut client, mut server) = pair(&keys, Some(endpoint));

  let hello = client.produce_token().unwrap().unwrap();
  server.process_token(&hello).unwrap();
  let welcome = server.produce_token().unwrap().unwrap();
  client.process_token(&welcome).unwrap();
  let initiate = client.produce_token().unwrap().unwrap();
  server.process_token(&initiate).unwrap();

  let _request = server.zap_request_needed().unwrap();
  let forged_reply = vec![
    b"1.0".to_vec(),
    b"not-our-id".to_vec(),
    b"200".to_vec(),
    b"OK".to_vec(),
    Vec::new(),
    Vec::new(),
  ];
  let err = server.process_zap_reply(&forged_reply).unwrap_err();
  assert!(matches!(err, SecurityError::ProtocolViolation(_)));
}

#[test]
fn full_handshake_by_hand_reaches_ready_on_both_sides() {
  let keys = fresh_keys();
  let (mut client, mut server) = pair(&keys, None);

  let hello = client.produce_token().unwrap().unwrap();
  server.process_token(&hello).unwrap();
  let welcome = server.produce_token().unwrap().unwrap();
  client.process_token(&welcome).unwrap();
  let initiate = client.produce_token().unwrap().unwrap();
  server.process_token(&initiate).unwrap();
  let ready = server.produce_token().unwrap().unwrap();
  assert!(ready.len() >= 30);
  client.process_token(&ready).unwrap();

  assert!(client.is_complete());
  assert!(server.is_complete());
  assert_eq!(
    server.peer_identity(),
    Some(keys.client_public.as_bytes().to_vec())
  );
  assert_eq!(
    server.metadata().unwrap().get("Identity"),
    Some(b"curve-client".as_slice())
  );
}
