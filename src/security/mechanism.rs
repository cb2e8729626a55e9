use std::fmt;

use crate::error::SecurityError;
use crate::metadata::Metadata;

use super::cipher::IDataCipher;

/// Overall progress of a mechanism's handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismStatus {
  Initializing,
  /// Handshake commands are being exchanged.
  Handshaking,
  /// Suspended, waiting for the ZAP verdict. No output is produced in
  /// this state; WELCOME/READY strictly follow the verdict.
  Authenticating,
  /// Handshake completed successfully.
  Ready,
  /// Handshake failed. If an ERROR command was owed to the peer it has
  /// already been produced.
  Error,
}

/// What the driver should do after feeding a command (or a ZAP reply)
/// into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTokenAction {
  /// No immediate action is required; wait for the next event.
  ContinueWaiting,
  /// The mechanism now has a command ready to send.
  ProduceAndSend,
  /// The handshake is now complete.
  HandshakeComplete,
}

/// Trait for security mechanisms (NULL, PLAIN, CURVE).
/// Drives the security handshake state machine.
///
/// One instance exists per connection, owned by the session for the
/// duration of the handshake. `produce_token` and `process_token` are
/// never invoked concurrently for the same instance.
pub trait Mechanism: Send + fmt::Debug + 'static {
  /// Returns the ASCII name of the mechanism (e.g. "NULL", "PLAIN").
  fn name(&self) -> &'static str;

  /// Produces the next handshake command to be sent, based on current
  /// state. Returns `None` if nothing is due (e.g. waiting for the
  /// peer or for a ZAP verdict). At most one command per call.
  fn produce_token(&mut self) -> Result<Option<Vec<u8>>, SecurityError>;

  /// Consumes exactly one peer-sent handshake command, validating its
  /// name and length against what the current state expects. A command
  /// the state does not expect fails with
  /// [`SecurityError::ProtocolViolation`] without advancing state.
  fn process_token(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError>;

  /// Returns the current status of the mechanism handshake.
  fn status(&self) -> MechanismStatus;

  /// Returns true if the handshake completed successfully.
  fn is_complete(&self) -> bool {
    self.status() == MechanismStatus::Ready
  }

  /// Returns true if the handshake resulted in an error.
  fn is_error(&self) -> bool {
    self.status() == MechanismStatus::Error
  }

  /// Returns the identity of the peer, if established by the
  /// mechanism. For CURVE this is the peer's long-term public key; for
  /// PLAIN the authenticated username.
  fn peer_identity(&self) -> Option<Vec<u8>>;

  /// Metadata negotiated during the handshake: the peer's properties
  /// plus anything the authenticator supplied (User-Id, ZAP metadata).
  fn metadata(&self) -> Option<Metadata>;

  /// Sets the mechanism's internal state to Error. Called by the
  /// session when transport errors occur mid-handshake.
  fn set_error(&mut self, reason: String);

  /// Returns the reason for the error state, if available.
  fn error_reason(&self) -> Option<&str>;

  /// Returns the ZAP request frames to send if the mechanism is
  /// suspended waiting on authentication, at most once per suspended
  /// step. `None` when no exchange is due.
  fn zap_request_needed(&mut self) -> Option<Vec<Vec<u8>>>;

  /// Processes the ZAP reply received from the authenticator and
  /// advances the state machine on the verdict. A reply that violates
  /// the ZAP protocol (wrong version, wrong request id) is fatal.
  fn process_zap_reply(
    &mut self,
    reply_frames: &[Vec<u8>],
  ) -> Result<ProcessTokenAction, SecurityError>;

  /// Called once the handshake is Ready. Consumes the mechanism and
  /// returns the data-phase cipher plus the established peer identity.
  /// Non-encrypting mechanisms return a pass-through cipher.
  fn into_data_cipher_parts(
    self: Box<Self>,
  ) -> Result<(Box<dyn IDataCipher>, Option<Vec<u8>>), SecurityError>;
}
