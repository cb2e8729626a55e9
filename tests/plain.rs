// tests/plain.rs
//
// PLAIN handshakes end to end through the driver, with a mock
// authenticator task standing in for the external ZAP handler.

use std::time::Duration;

use zmtp_security::{
  create_mechanism, Mechanism, MechanismConfig, MechanismKind, PlainMechanismOptions,
  SecurityError,
};

mod common;
use common::{spawn_authenticator, ZapPolicy};

fn client_config() -> MechanismConfig {
  MechanismConfig {
    mechanism: MechanismKind::Plain,
    as_server: false,
    socket_type_name: "DEALER".into(),
    routing_id: Some(b"dealer-1".to_vec()),
    plain: PlainMechanismOptions {
      username: Some("testuser".into()),
      password: Some("testpass".into()),
    },
    ..Default::default()
  }
}

fn server_config(endpoint: Option<zmtp_security::ZapEndpoint>) -> MechanismConfig {
  MechanismConfig {
    mechanism: MechanismKind::Plain,
    as_server: true,
    socket_type_name: "ROUTER".into(),
    zap_domain: Some("global".into()),
    peer_address: "127.0.0.1:4242".into(),
    zap_endpoint: endpoint,
    ..Default::default()
  }
}

#[tokio::test]
async fn plain_handshake_succeeds_when_zap_allows() {
  common::setup_tracing();
  let (endpoint, log) = spawn_authenticator(ZapPolicy::Allow {
    user_id: "admin".into(),
  });

  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(), server_config(Some(endpoint))).await;

  let client_outcome = client_outcome.expect("client handshake");
  let server_outcome = server_outcome.expect("server handshake");

  // The server authenticated the configured credentials.
  let requests = log.lock().unwrap();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0][5], b"PLAIN");
  assert_eq!(requests[0][6], b"testuser");
  assert_eq!(requests[0][7], b"testpass");

  // Metadata crossed over intact, in both directions.
  let server_view = server_outcome.metadata.unwrap();
  assert_eq!(server_view.get("Socket-Type"), Some(b"DEALER".as_slice()));
  assert_eq!(server_view.get("Identity"), Some(b"dealer-1".as_slice()));
  assert_eq!(server_view.get("User-Id"), Some(b"admin".as_slice()));
  let client_view = client_outcome.metadata.unwrap();
  assert_eq!(client_view.get("Socket-Type"), Some(b"ROUTER".as_slice()));

  assert_eq!(server_outcome.peer_identity, Some(b"testuser".to_vec()));
}

#[tokio::test]
async fn plain_handshake_fails_with_the_zap_status_code() {
  common::setup_tracing();
  let (endpoint, _log) = spawn_authenticator(ZapPolicy::Deny {
    status_code: "400".into(),
  });

  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(), server_config(Some(endpoint))).await;

  // The ERROR command reached the client carrying the ZAP status.
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
async fn plain_server_without_authenticator_fails_hard() {
  common::setup_tracing();
  let (client_outcome, server_outcome) =
    common::run_handshake_pair(client_config(), server_config(None)).await;

  assert!(matches!(
    server_outcome.unwrap_err(),
    SecurityError::Authentication(_)
  ));
  // The server tore down without ever producing WELCOME.
  assert!(client_outcome.is_err());
}

#[tokio::test]
async fn welcome_is_never_produced_before_the_zap_verdict() {
  common::setup_tracing();
  let (endpoint, log) = spawn_authenticator(ZapPolicy::AllowAfter {
    user_id: "admin".into(),
    delay: Duration::from_millis(300),
  });

  let server_config = server_config(Some(endpoint));
  let (client_to_server_tx, client_to_server_rx) = async_channel::unbounded();
  let (server_to_client_tx, server_to_client_rx) = async_channel::unbounded::<Vec<u8>>();

  let server = create_mechanism(&server_config).unwrap();
  let server_task = tokio::spawn({
    let server_config = server_config.clone();
    async move {
      zmtp_security::perform_handshake(
        server,
        &server_config,
        client_to_server_rx,
        server_to_client_tx,
      )
      .await
    }
  });

  // Hand-roll the client side so we can watch the server's output.
  let mut client = create_mechanism(&client_config()).unwrap();
  let hello = client.produce_token().unwrap().unwrap();
  client_to_server_tx.send(hello).await.unwrap();

  // The authenticator is still sitting on the request; the server must
  // not have produced WELCOME yet.
  tokio::time::sleep(Duration::from_millis(150)).await;
  assert_eq!(log.lock().unwrap().len(), 1);
  assert!(server_to_client_rx.try_recv().is_err());

  // Once the verdict lands, WELCOME follows.
  let welcome = tokio::time::timeout(Duration::from_secs(2), server_to_client_rx.recv())
    .await
    .expect("timed out waiting for WELCOME")
    .unwrap();
  client.process_token(&welcome).unwrap();

  let initiate = client.produce_token().unwrap().unwrap();
  client_to_server_tx.send(initiate).await.unwrap();
  let ready = server_to_client_rx.recv().await.unwrap();
  client.process_token(&ready).unwrap();
  assert!(client.is_complete());

  server_task.await.unwrap().expect("server handshake");
}
