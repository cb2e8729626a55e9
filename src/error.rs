use thiserror::Error;

/// Errors surfaced by the security mechanism layer.
///
/// The first four variants are the observable failure categories of a
/// handshake. They stay distinct because local observers (monitoring,
/// logs) need to tell tampering apart from malformed peers; none of the
/// detail is ever echoed back to the unauthenticated peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SecurityError {
  /// Malformed, truncated or oversized handshake command. Fatal; the
  /// peer learns nothing beyond connection closure.
  #[error("malformed handshake command: {0}")]
  Framing(String),

  /// A box or cookie failed to decrypt, or a nonce was replayed. Fatal;
  /// may indicate corruption or an active attack.
  #[error("decryption failed: {0}")]
  Encryption(String),

  /// The authenticator rejected the peer, or authentication was
  /// required but unavailable. The peer receives an ERROR command with
  /// the 3-digit status code before the connection is closed.
  #[error("authentication failed: {0}")]
  Authentication(String),

  /// A command arrived in a state that does not expect it, or the ZAP
  /// reply did not match the request. Fatal, treated like a framing
  /// error.
  #[error("protocol violation: {0}")]
  ProtocolViolation(String),

  /// Operation is invalid for the mechanism's current state.
  #[error("operation invalid for current handshake state: {0}")]
  InvalidState(&'static str),

  /// No ZAP authenticator is configured for this connection.
  #[error("no ZAP authenticator configured")]
  NoAuthenticator,

  /// The bounded wait for a ZAP reply expired.
  #[error("timed out waiting for ZAP reply")]
  Timeout,

  /// The authenticator channel (or the session command channel) closed
  /// while the handshake was still in progress.
  #[error("channel closed during handshake")]
  ChannelClosed,

  /// Invalid configuration value (e.g. an oversized PLAIN credential).
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// Missing or malformed CURVE key material in the configuration.
  #[error("invalid CURVE key material")]
  InvalidCurveKey,

  /// Internal library error.
  #[error("internal error: {0}")]
  Internal(String),
}

#[cfg(feature = "curve")]
impl From<dryoc::Error> for SecurityError {
  fn from(_: dryoc::Error) -> Self {
    // dryoc reports every AEAD failure uniformly; at this layer they
    // are all decryption failures. The dryoc error text is discarded so
    // no primitive-level detail can leak into error output.
    SecurityError::Encryption("authenticated decryption failed".into())
  }
}
