use std::time::Duration;

use crate::security::zap::ZapEndpoint;

#[cfg(feature = "curve")]
use crate::security::curve::{CurvePublicKey, CurveSecretKey};

/// Which mechanism a connection runs. Negotiation is not performed at
/// this layer: the session configures the mechanism up front and both
/// peers must agree out of band (ZMTP greeting exchange happens in the
/// transport layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MechanismKind {
  #[default]
  Null,
  Plain,
  #[cfg(feature = "curve")]
  Curve,
}

/// Credentials for the PLAIN mechanism (client role). Each must fit in
/// the single length byte the wire format allows (255 bytes).
#[derive(Debug, Clone, Default)]
pub struct PlainMechanismOptions {
  pub username: Option<String>,
  pub password: Option<String>,
}

/// Long-term CURVE key material for one side of a connection.
#[cfg(feature = "curve")]
#[derive(Debug, Clone, Default)]
pub struct CurveOptions {
  /// Our long-term secret key. Required for both roles; the matching
  /// public key is derived from it.
  pub local_secret_key: Option<CurveSecretKey>,
  /// The server's long-term public key. Required on the client, learned
  /// from INITIATE on the server.
  pub remote_public_key: Option<CurvePublicKey>,
}

/// Per-connection configuration handed to a mechanism at construction.
///
/// Modeled on the engine config the session layer derives from socket
/// options; everything here is fixed for the lifetime of one handshake.
#[derive(Debug, Clone)]
pub struct MechanismConfig {
  pub mechanism: MechanismKind,
  /// Server role answers HELLO/INITIATE; client role sends them.
  pub as_server: bool,
  /// Socket type name advertised in the handshake metadata
  /// (`Socket-Type` property).
  pub socket_type_name: String,
  /// Identity advertised in the handshake metadata (`Identity`
  /// property) and reported to the authenticator.
  pub routing_id: Option<Vec<u8>>,
  /// ZAP domain reported to the authenticator. Empty means the default
  /// domain.
  pub zap_domain: Option<String>,
  /// Network address of the peer, reported to the authenticator.
  pub peer_address: String,
  /// Handle to the process-local authenticator task, when one is
  /// running. PLAIN servers refuse to handshake without it; NULL and
  /// CURVE servers skip the ZAP exchange when it is absent.
  pub zap_endpoint: Option<ZapEndpoint>,
  /// Upper bound on one ZAP round trip. Tearing down a connection with
  /// a request outstanding never blocks longer than this.
  pub zap_timeout: Duration,
  pub plain: PlainMechanismOptions,
  #[cfg(feature = "curve")]
  pub curve: CurveOptions,
}

impl Default for MechanismConfig {
  fn default() -> Self {
    Self {
      mechanism: MechanismKind::Null,
      as_server: false,
      socket_type_name: String::new(),
      routing_id: None,
      zap_domain: None,
      peer_address: String::new(),
      zap_endpoint: None,
      zap_timeout: Duration::from_secs(5),
      plain: PlainMechanismOptions::default(),
      #[cfg(feature = "curve")]
      curve: CurveOptions::default(),
    }
  }
}
