// tests/zap.rs
//
// The transport half of the ZAP adapter: bounded waits, vanished
// authenticators, and the no-authenticator case.

use std::time::Duration;

use zmtp_security::{
  create_mechanism, Mechanism, MechanismConfig, MechanismKind, PlainMechanismOptions,
  SecurityError, ZapClient, ZapEndpoint,
};

mod common;
use common::{spawn_authenticator, ZapPolicy};

#[tokio::test]
async fn connect_without_an_endpoint_fails() {
  assert!(matches!(
    ZapClient::connect(None),
    Err(SecurityError::NoAuthenticator)
  ));
}

#[tokio::test]
async fn exchange_times_out_when_the_authenticator_never_replies() {
  common::setup_tracing();
  let (endpoint, _log) = spawn_authenticator(ZapPolicy::Ignore);
  let channel = ZapClient::connect(Some(&endpoint)).unwrap();
  let err = channel
    .exchange(vec![b"1.0".to_vec()], Duration::from_millis(100))
    .await
    .unwrap_err();
  assert_eq!(err, SecurityError::Timeout);
}

#[tokio::test]
async fn exchange_fails_cleanly_when_the_authenticator_is_gone() {
  common::setup_tracing();
  let (endpoint, requests_rx) = ZapEndpoint::pair();
  drop(requests_rx);
  let channel = ZapClient::connect(Some(&endpoint)).unwrap();
  let err = channel
    .exchange(vec![b"1.0".to_vec()], Duration::from_secs(1))
    .await
    .unwrap_err();
  assert_eq!(err, SecurityError::ChannelClosed);
}

#[tokio::test]
async fn handshake_with_a_stuck_authenticator_fails_within_the_bound() {
  common::setup_tracing();
  let (endpoint, _log) = spawn_authenticator(ZapPolicy::Ignore);
  let server_config = MechanismConfig {
    mechanism: MechanismKind::Plain,
    as_server: true,
    zap_endpoint: Some(endpoint),
    zap_timeout: Duration::from_millis(100),
    ..Default::default()
  };
  let (client_to_server_tx, client_to_server_rx) = async_channel::unbounded();
  let (server_to_client_tx, _server_to_client_rx) = async_channel::unbounded();

  let mut client = create_mechanism(&MechanismConfig {
    mechanism: MechanismKind::Plain,
    plain: PlainMechanismOptions {
      username: Some("u".into()),
      password: Some("p".into()),
    },
    ..Default::default()
  })
  .unwrap();
  let hello = client.produce_token().unwrap().unwrap();
  client_to_server_tx.send(hello).await.unwrap();

  let server = create_mechanism(&server_config).unwrap();
  let started = std::time::Instant::now();
  let err = zmtp_security::perform_handshake(
    server,
    &server_config,
    client_to_server_rx,
    server_to_client_tx,
  )
  .await
  .unwrap_err();
  assert_eq!(err, SecurityError::Timeout);
  // The teardown was bounded by zap_timeout, not left hanging.
  assert!(started.elapsed() < Duration::from_secs(2));
}
