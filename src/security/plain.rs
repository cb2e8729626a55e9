use bytes::{BufMut, BytesMut};

use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::MechanismConfig;

use super::cipher::PassThroughDataCipher;
use super::mechanism::{Mechanism, MechanismStatus, ProcessTokenAction};
use super::zap::{ZapClient, ZapOutcome};
use super::{basic_properties, build_error_command, parse_error_command, IDataCipher};

/// State for the PLAIN security mechanism handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlainState {
  // Client states
  SendingHello,
  WaitingForWelcome,
  SendingInitiate,
  WaitingForReady,
  // Server states
  WaitingForHello,
  WaitingForZapReply,
  SendingWelcome,
  WaitingForInitiate,
  SendingReady,
  SendingError,
  // Terminal states
  Ready,
  Error,     // failed with nothing left to flush
  ErrorSent, // failed after flushing the ERROR command
}

/// Implements the ZMTP PLAIN security mechanism: clear-text credentials
/// in HELLO, verdict delegated to the ZAP authenticator. See RFC 27.
///
/// PLAIN is pointless without an authenticator to check the username
/// and password against, so a server with no ZAP endpoint configured
/// fails the handshake rather than waving the peer through.
pub struct PlainMechanism {
  is_server: bool,
  state: PlainState,
  username: Vec<u8>,
  password: Vec<u8>,
  own_metadata: Metadata,
  peer_metadata: Option<Metadata>,
  zap: ZapClient,
  zap_configured: bool,
  zap_request_pending: bool,
  zap_user_id: Option<String>,
  zap_metadata: Option<Metadata>,
  /// 3-digit code for the ERROR command (server) or received from one
  /// (client).
  status_code: Option<String>,
  error_reason: Option<String>,
}

impl PlainMechanism {
  pub const NAME: &'static str = "PLAIN";
  const HELLO_PREFIX: &'static [u8] = b"\x05HELLO";
  const WELCOME_PREFIX: &'static [u8] = b"\x07WELCOME";
  const INITIATE_PREFIX: &'static [u8] = b"\x08INITIATE";
  const READY_PREFIX: &'static [u8] = b"\x05READY";

  pub fn new(config: &MechanismConfig) -> Result<Self, SecurityError> {
    let username = config
      .plain
      .username
      .as_deref()
      .unwrap_or_default()
      .as_bytes()
      .to_vec();
    let password = config
      .plain
      .password
      .as_deref()
      .unwrap_or_default()
      .as_bytes()
      .to_vec();
    if username.len() > 255 || password.len() > 255 {
      return Err(SecurityError::InvalidArgument(
        "PLAIN credentials are limited to 255 bytes".into(),
      ));
    }
    Ok(Self {
      is_server: config.as_server,
      state: if config.as_server {
        PlainState::WaitingForHello
      } else {
        PlainState::SendingHello
      },
      username,
      password,
      own_metadata: basic_properties(config),
      peer_metadata: None,
      zap: ZapClient::new(config),
      zap_configured: config.zap_endpoint.is_some(),
      zap_request_pending: false,
      zap_user_id: None,
      zap_metadata: None,
      status_code: None,
      error_reason: None,
    })
  }

  /// Parses the HELLO command (client to server).
  /// Format: tag, 1-byte username length, username, 1-byte password
  /// length, password. Trailing bytes are a framing error.
  fn parse_hello(token: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SecurityError> {
    let body = token
      .strip_prefix(Self::HELLO_PREFIX)
      .ok_or_else(|| SecurityError::Framing("PLAIN client did not send HELLO".into()))?;
    if body.is_empty() {
      return Err(SecurityError::Framing(
        "PLAIN HELLO is missing the username".into(),
      ));
    }
    let username_len = body[0] as usize;
    if body.len() < 1 + username_len + 1 {
      return Err(SecurityError::Framing(
        "PLAIN HELLO username is malformed".into(),
      ));
    }
    let username = body[1..1 + username_len].to_vec();
    let rest = &body[1 + username_len..];
    let password_len = rest[0] as usize;
    if rest.len() < 1 + password_len {
      return Err(SecurityError::Framing(
        "PLAIN HELLO password is malformed".into(),
      ));
    }
    let password = rest[1..1 + password_len].to_vec();
    if rest.len() > 1 + password_len {
      return Err(SecurityError::Framing(
        "PLAIN HELLO carries trailing bytes".into(),
      ));
    }
    Ok((username, password))
  }

  /// Builds the HELLO command from the configured credentials.
  fn build_hello(&self) -> Vec<u8> {
    let mut command =
      BytesMut::with_capacity(Self::HELLO_PREFIX.len() + 2 + self.username.len() + self.password.len());
    command.put_slice(Self::HELLO_PREFIX);
    command.put_u8(self.username.len() as u8);
    command.put_slice(&self.username);
    command.put_u8(self.password.len() as u8);
    command.put_slice(&self.password);
    command.to_vec()
  }

  fn process_hello(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    let (username, password) = Self::parse_hello(token)?;
    tracing::debug!(mechanism = Self::NAME, "Server received HELLO");
    self.username = username;
    self.password = password;
    if !self.zap_configured {
      // There is no point to PLAIN if nothing can check the
      // credentials; treat a missing authenticator as a failure, not a
      // bypass.
      let reason = "PLAIN requires a ZAP authenticator and none is configured".to_string();
      self.set_error_internal(reason.clone());
      return Err(SecurityError::Authentication(reason));
    }
    self.state = PlainState::WaitingForZapReply;
    self.zap_request_pending = true;
    Ok(ProcessTokenAction::ContinueWaiting)
  }

  fn process_initiate(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    let body = token
      .strip_prefix(Self::INITIATE_PREFIX)
      .ok_or_else(|| SecurityError::Framing("PLAIN client did not send INITIATE".into()))?;
    let metadata = Metadata::decode(body)?;
    tracing::debug!(mechanism = Self::NAME, "Server received INITIATE");
    self.peer_metadata = Some(metadata);
    self.state = PlainState::SendingReady;
    Ok(ProcessTokenAction::ProduceAndSend)
  }

  fn process_welcome(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    if token.starts_with(super::ERROR_PREFIX) {
      return self.process_error(token);
    }
    if token != Self::WELCOME_PREFIX {
      return Err(SecurityError::Framing(
        "PLAIN server did not send WELCOME".into(),
      ));
    }
    tracing::debug!(mechanism = Self::NAME, "Client received WELCOME");
    self.state = PlainState::SendingInitiate;
    Ok(ProcessTokenAction::ProduceAndSend)
  }

  fn process_ready(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    if token.starts_with(super::ERROR_PREFIX) {
      return self.process_error(token);
    }
    let body = token
      .strip_prefix(Self::READY_PREFIX)
      .ok_or_else(|| SecurityError::Framing("PLAIN server did not send READY".into()))?;
    let metadata = Metadata::decode(body)?;
    tracing::debug!(mechanism = Self::NAME, "Client received READY");
    self.peer_metadata = Some(metadata);
    self.state = PlainState::Ready;
    Ok(ProcessTokenAction::HandshakeComplete)
  }

  /// Client side: the server refused us. Record the status and fail.
  fn process_error(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    let status_code = parse_error_command(token)?;
    let reason = format!("server rejected the handshake with status {}", status_code);
    self.status_code = Some(status_code.clone());
    self.set_error_internal(reason);
    Err(SecurityError::Authentication(status_code))
  }

  fn set_error_internal(&mut self, reason: String) {
    tracing::error!(mechanism = Self::NAME, %reason, "Handshake error");
    self.error_reason = Some(reason);
    self.state = PlainState::Error;
  }
}

// Keeps the credentials out of Debug output.
impl std::fmt::Debug for PlainMechanism {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PlainMechanism")
      .field("is_server", &self.is_server)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

impl Mechanism for PlainMechanism {
  fn name(&self) -> &'static str {
    Self::NAME
  }

  fn produce_token(&mut self) -> Result<Option<Vec<u8>>, SecurityError> {
    match self.state {
      PlainState::SendingHello => {
        tracing::debug!(mechanism = Self::NAME, "Client sending HELLO");
        self.state = PlainState::WaitingForWelcome;
        Ok(Some(self.build_hello()))
      }
      PlainState::SendingWelcome => {
        tracing::debug!(mechanism = Self::NAME, "Server sending WELCOME");
        self.state = PlainState::WaitingForInitiate;
        Ok(Some(Self::WELCOME_PREFIX.to_vec()))
      }
      PlainState::SendingInitiate => {
        tracing::debug!(mechanism = Self::NAME, "Client sending INITIATE");
        let mut command = BytesMut::new();
        command.put_slice(Self::INITIATE_PREFIX);
        command.put_slice(&self.own_metadata.encode());
        self.state = PlainState::WaitingForReady;
        Ok(Some(command.to_vec()))
      }
      PlainState::SendingReady => {
        tracing::debug!(mechanism = Self::NAME, "Server sending READY");
        let mut command = BytesMut::new();
        command.put_slice(Self::READY_PREFIX);
        command.put_slice(&self.own_metadata.encode());
        self.state = PlainState::Ready;
        Ok(Some(command.to_vec()))
      }
      PlainState::SendingError => {
        let status_code = self.status_code.as_deref().unwrap_or("500");
        tracing::debug!(mechanism = Self::NAME, status_code, "Server sending ERROR");
        let command = build_error_command(status_code);
        self.state = PlainState::ErrorSent;
        Ok(Some(command))
      }
      // No output while waiting on the peer, the authenticator, or in a
      // terminal state.
      _ => Ok(None),
    }
  }

  fn process_token(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    match self.state {
      PlainState::WaitingForHello => self.process_hello(token),
      PlainState::WaitingForInitiate => self.process_initiate(token),
      PlainState::WaitingForWelcome => self.process_welcome(token),
      PlainState::WaitingForReady => self.process_ready(token),
      _ => Err(SecurityError::ProtocolViolation(
        "unexpected command for current state".into(),
      )),
    }
  }

  fn status(&self) -> MechanismStatus {
    match self.state {
      PlainState::WaitingForZapReply => MechanismStatus::Authenticating,
      PlainState::Ready => MechanismStatus::Ready,
      PlainState::Error | PlainState::ErrorSent => MechanismStatus::Error,
      _ => MechanismStatus::Handshaking,
    }
  }

  fn peer_identity(&self) -> Option<Vec<u8>> {
    if self.is_server {
      Some(self.username.clone())
    } else {
      self
        .peer_metadata
        .as_ref()
        .and_then(|m| m.get("Identity"))
        .map(|id| id.to_vec())
    }
  }

  fn metadata(&self) -> Option<Metadata> {
    let mut merged = self.peer_metadata.clone()?;
    if let Some(user_id) = &self.zap_user_id {
      if !user_id.is_empty() {
        merged.insert("User-Id", user_id.as_bytes());
      }
    }
    if let Some(zap_metadata) = &self.zap_metadata {
      merged.merge(zap_metadata);
    }
    Some(merged)
  }

  fn set_error(&mut self, reason: String) {
    self.set_error_internal(reason);
  }

  fn error_reason(&self) -> Option<&str> {
    self.error_reason.as_deref()
  }

  fn zap_request_needed(&mut self) -> Option<Vec<Vec<u8>>> {
    if self.state == PlainState::WaitingForZapReply && self.zap_request_pending {
      self.zap_request_pending = false;
      let credentials = [self.username.as_slice(), self.password.as_slice()];
      Some(self.zap.request_frames(Self::NAME, &credentials))
    } else {
      None
    }
  }

  fn process_zap_reply(
    &mut self,
    reply_frames: &[Vec<u8>],
  ) -> Result<ProcessTokenAction, SecurityError> {
    if self.state != PlainState::WaitingForZapReply {
      return Err(SecurityError::InvalidState(
        "no ZAP exchange outstanding for PLAIN",
      ));
    }
    match self.zap.process_reply(reply_frames)? {
      ZapOutcome::Allowed { user_id, metadata } => {
        self.zap_user_id = Some(user_id);
        self.zap_metadata = Some(metadata);
        self.state = PlainState::SendingWelcome;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
      ZapOutcome::Denied {
        status_code,
        status_text,
      } => {
        self.error_reason = Some(format!(
          "ZAP authenticator denied the peer: {} {}",
          status_code, status_text
        ));
        self.status_code = Some(status_code);
        self.state = PlainState::SendingError;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
    }
  }

  fn into_data_cipher_parts(
    self: Box<Self>,
  ) -> Result<(Box<dyn IDataCipher>, Option<Vec<u8>>), SecurityError> {
    if self.status() != MechanismStatus::Ready {
      return Err(SecurityError::InvalidState("PLAIN handshake not complete"));
    }
    let identity = self.peer_identity();
    Ok((Box::new(PassThroughDataCipher), identity))
  }
}
