use bytes::{BufMut, BytesMut};

use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::MechanismConfig;

use super::cipher::PassThroughDataCipher;
use super::mechanism::{Mechanism, MechanismStatus, ProcessTokenAction};
use super::zap::{ZapClient, ZapOutcome};
use super::{basic_properties, build_error_command, parse_error_command, IDataCipher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NullState {
  // Client
  SendingReady,
  WaitingForPeerReady,
  // Server
  WaitingForReady,
  WaitingForZapReply,
  SendingReadyReply,
  SendingError,
  // Terminal
  Ready,
  Error,
  ErrorSent,
}

/// The NULL mechanism: no credentials, no encryption, a single
/// READY/READY metadata exchange. A server still delegates to ZAP when
/// an authenticator is configured (with an empty credential list);
/// without one the exchange is skipped entirely.
#[derive(Debug)]
pub struct NullMechanism {
  is_server: bool,
  state: NullState,
  own_metadata: Metadata,
  peer_metadata: Option<Metadata>,
  zap: ZapClient,
  zap_configured: bool,
  zap_request_pending: bool,
  zap_user_id: Option<String>,
  zap_metadata: Option<Metadata>,
  status_code: Option<String>,
  error_reason: Option<String>,
}

impl NullMechanism {
  pub const NAME: &'static str = "NULL";
  const READY_PREFIX: &'static [u8] = b"\x05READY";

  pub fn new(config: &MechanismConfig) -> Self {
    Self {
      is_server: config.as_server,
      state: if config.as_server {
        NullState::WaitingForReady
      } else {
        NullState::SendingReady
      },
      own_metadata: basic_properties(config),
      peer_metadata: None,
      zap: ZapClient::new(config),
      zap_configured: config.zap_endpoint.is_some(),
      zap_request_pending: false,
      zap_user_id: None,
      zap_metadata: None,
      status_code: None,
      error_reason: None,
    }
  }

  fn build_ready(&self) -> Vec<u8> {
    let mut command = BytesMut::new();
    command.put_slice(Self::READY_PREFIX);
    command.put_slice(&self.own_metadata.encode());
    command.to_vec()
  }

  fn process_ready(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    if !self.is_server && token.starts_with(super::ERROR_PREFIX) {
      let status_code = parse_error_command(token)?;
      self.status_code = Some(status_code.clone());
      self.set_error_internal(format!(
        "server rejected the handshake with status {}",
        status_code
      ));
      return Err(SecurityError::Authentication(status_code));
    }
    let body = token
      .strip_prefix(Self::READY_PREFIX)
      .ok_or_else(|| SecurityError::Framing("NULL peer did not send READY".into()))?;
    self.peer_metadata = Some(Metadata::decode(body)?);
    tracing::debug!(mechanism = Self::NAME, "Received READY");
    if self.is_server {
      if self.zap_configured {
        self.state = NullState::WaitingForZapReply;
        self.zap_request_pending = true;
        Ok(ProcessTokenAction::ContinueWaiting)
      } else {
        self.state = NullState::SendingReadyReply;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
    } else {
      self.state = NullState::Ready;
      Ok(ProcessTokenAction::HandshakeComplete)
    }
  }

  fn set_error_internal(&mut self, reason: String) {
    tracing::error!(mechanism = Self::NAME, %reason, "Handshake error");
    self.error_reason = Some(reason);
    self.state = NullState::Error;
  }
}

impl Mechanism for NullMechanism {
  fn name(&self) -> &'static str {
    Self::NAME
  }

  fn produce_token(&mut self) -> Result<Option<Vec<u8>>, SecurityError> {
    match self.state {
      NullState::SendingReady => {
        tracing::debug!(mechanism = Self::NAME, "Client sending READY");
        self.state = NullState::WaitingForPeerReady;
        Ok(Some(self.build_ready()))
      }
      NullState::SendingReadyReply => {
        tracing::debug!(mechanism = Self::NAME, "Server sending READY");
        self.state = NullState::Ready;
        Ok(Some(self.build_ready()))
      }
      NullState::SendingError => {
        let status_code = self.status_code.as_deref().unwrap_or("500");
        let command = build_error_command(status_code);
        self.state = NullState::ErrorSent;
        Ok(Some(command))
      }
      _ => Ok(None),
    }
  }

  fn process_token(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    match self.state {
      NullState::WaitingForReady | NullState::WaitingForPeerReady => self.process_ready(token),
      _ => Err(SecurityError::ProtocolViolation(
        "unexpected command for current state".into(),
      )),
    }
  }

  fn status(&self) -> MechanismStatus {
    match self.state {
      NullState::WaitingForZapReply => MechanismStatus::Authenticating,
      NullState::Ready => MechanismStatus::Ready,
      NullState::Error | NullState::ErrorSent => MechanismStatus::Error,
      _ => MechanismStatus::Handshaking,
    }
  }

  fn peer_identity(&self) -> Option<Vec<u8>> {
    self
      .peer_metadata
      .as_ref()
      .and_then(|m| m.get("Identity"))
      .map(|id| id.to_vec())
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
    if self.state == NullState::WaitingForZapReply && self.zap_request_pending {
      self.zap_request_pending = false;
      Some(self.zap.request_frames(Self::NAME, &[]))
    } else {
      None
    }
  }

  fn process_zap_reply(
    &mut self,
    reply_frames: &[Vec<u8>],
  ) -> Result<ProcessTokenAction, SecurityError> {
    if self.state != NullState::WaitingForZapReply {
      return Err(SecurityError::InvalidState(
        "no ZAP exchange outstanding for NULL",
      ));
    }
    match self.zap.process_reply(reply_frames)? {
      ZapOutcome::Allowed { user_id, metadata } => {
        self.zap_user_id = Some(user_id);
        self.zap_metadata = Some(metadata);
        self.state = NullState::SendingReadyReply;
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
        self.state = NullState::SendingError;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
    }
  }

  fn into_data_cipher_parts(
    self: Box<Self>,
  ) -> Result<(Box<dyn IDataCipher>, Option<Vec<u8>>), SecurityError> {
    if self.status() != MechanismStatus::Ready {
      return Err(SecurityError::InvalidState("NULL handshake not complete"));
    }
    let identity = self.peer_identity();
    Ok((Box::new(PassThroughDataCipher), identity))
  }
}
