// tests/common.rs
#![allow(dead_code)] // Not every test binary uses every helper.

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use zmtp_security::{
  create_mechanism, perform_handshake, HandshakeOutcome, MechanismConfig, SecurityError,
  ZapEndpoint, ZapExchange,
};

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Default level filter; can be overridden by RUST_LOG.
    let default_filter = "zmtp_security=trace,debug,info,warn";
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
  });
}

/// What the mock authenticator does with every request it receives.
#[derive(Debug, Clone)]
pub enum ZapPolicy {
  Allow { user_id: String },
  Deny { status_code: String },
  AllowAfter { user_id: String, delay: Duration },
  /// Never reply, but keep the exchange alive so the requester hits
  /// its bounded wait rather than a closed channel.
  Ignore,
}

pub type ZapRequestLog = Arc<Mutex<Vec<Vec<Vec<u8>>>>>;

/// Spawns a mock authenticator task applying `policy` to every request
/// and returns the endpoint handle plus a log of the requests seen.
pub fn spawn_authenticator(policy: ZapPolicy) -> (ZapEndpoint, ZapRequestLog) {
  let (endpoint, requests_rx) = ZapEndpoint::pair();
  let log: ZapRequestLog = Arc::new(Mutex::new(Vec::new()));
  let log_for_task = log.clone();
  tokio::spawn(async move {
    let mut parked = Vec::new();
    while let Ok(exchange) = requests_rx.recv().await {
      let ZapExchange { request, reply_tx } = exchange;
      log_for_task.lock().unwrap().push(request.clone());
      match &policy {
        ZapPolicy::Allow { user_id } => {
          let _ = reply_tx.send(allow_reply(&request, user_id));
        }
        ZapPolicy::Deny { status_code } => {
          let _ = reply_tx.send(deny_reply(&request, status_code));
        }
        ZapPolicy::AllowAfter { user_id, delay } => {
          tokio::time::sleep(*delay).await;
          let _ = reply_tx.send(allow_reply(&request, user_id));
        }
        ZapPolicy::Ignore => parked.push(reply_tx),
      }
    }
  });
  (endpoint, log)
}

pub fn allow_reply(request: &[Vec<u8>], user_id: &str) -> Vec<Vec<u8>> {
  vec![
    b"1.0".to_vec(),
    request[1].clone(),
    b"200".to_vec(),
    b"OK".to_vec(),
    user_id.as_bytes().to_vec(),
    Vec::new(),
  ]
}

pub fn deny_reply(request: &[Vec<u8>], status_code: &str) -> Vec<Vec<u8>> {
  vec![
    b"1.0".to_vec(),
    request[1].clone(),
    status_code.as_bytes().to_vec(),
    b"denied".to_vec(),
    Vec::new(),
    Vec::new(),
  ]
}

/// Runs a client and a server mechanism against each other through the
/// handshake driver, wired up with in-memory command channels the way a
/// session would wire a socket. Each side runs as its own task so that
/// one side failing drops its channels and unblocks the other, exactly
/// like a torn-down connection.
pub async fn run_handshake_pair(
  client_config: MechanismConfig,
  server_config: MechanismConfig,
) -> (
  Result<HandshakeOutcome, SecurityError>,
  Result<HandshakeOutcome, SecurityError>,
) {
  let (client_to_server_tx, client_to_server_rx) = async_channel::unbounded();
  let (server_to_client_tx, server_to_client_rx) = async_channel::unbounded();

  let client_task = tokio::spawn(async move {
    let mechanism = create_mechanism(&client_config).expect("client mechanism");
    perform_handshake(
      mechanism,
      &client_config,
      server_to_client_rx,
      client_to_server_tx,
    )
    .await
  });
  let server_task = tokio::spawn(async move {
    let mechanism = create_mechanism(&server_config).expect("server mechanism");
    perform_handshake(
      mechanism,
      &server_config,
      client_to_server_rx,
      server_to_client_tx,
    )
    .await
  });

  let (client_outcome, server_outcome) = tokio::join!(client_task, server_task);
  (
    client_outcome.expect("client task"),
    server_outcome.expect("server task"),
  )
}
