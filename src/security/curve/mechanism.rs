use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::MechanismConfig;

use crate::security::mechanism::{Mechanism, MechanismStatus, ProcessTokenAction};
use crate::security::zap::{ZapClient, ZapOutcome};
use crate::security::{basic_properties, build_error_command, parse_error_command, IDataCipher};

use super::handshake::{CurveHandshake, CurveHandshakePhase};

/// The public-facing wrapper for the CurveZMQ security mechanism. This
/// struct implements the `Mechanism` trait and holds the underlying
/// handshake state machine plus the ZAP adapter the server side uses to
/// authenticate the client's long-term public key.
///
/// Unlike PLAIN, CURVE stands on its own when no authenticator is
/// configured: the key exchange itself proves possession of the keys,
/// so the ZAP exchange only runs when an endpoint is present.
#[derive(Debug)]
pub struct CurveMechanism {
  handshake: CurveHandshake,
  zap: ZapClient,
  zap_configured: bool,
  zap_request_pending: bool,
  zap_user_id: Option<String>,
  zap_metadata: Option<Metadata>,
  status_code: Option<String>,
  error_reason: Option<String>,
}

impl CurveMechanism {
  pub const NAME: &'static str = "CURVE";

  pub fn new(config: &MechanismConfig) -> Result<Self, SecurityError> {
    let handshake = CurveHandshake::new(config.as_server, config, basic_properties(config))?;
    Ok(Self {
      handshake,
      zap: ZapClient::new(config),
      zap_configured: config.zap_endpoint.is_some(),
      zap_request_pending: false,
      zap_user_id: None,
      zap_metadata: None,
      status_code: None,
      error_reason: None,
    })
  }

  fn set_error_internal(&mut self, reason: String) {
    tracing::error!(mechanism = Self::NAME, %reason, "Handshake error");
    self.error_reason = Some(reason);
    self.handshake.phase = CurveHandshakePhase::Error;
  }

  /// Client side: the server refused us after INITIATE.
  fn process_error(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    let status_code = parse_error_command(token)?;
    let reason = format!("server rejected the handshake with status {}", status_code);
    self.status_code = Some(status_code.clone());
    self.set_error_internal(reason);
    Err(SecurityError::Authentication(status_code))
  }
}

impl Mechanism for CurveMechanism {
  fn name(&self) -> &'static str {
    Self::NAME
  }

  fn produce_token(&mut self) -> Result<Option<Vec<u8>>, SecurityError> {
    match self.handshake.phase {
      CurveHandshakePhase::ClientStart => {
        let command = self.handshake.build_client_hello()?;
        self.handshake.phase = CurveHandshakePhase::ClientExpectWelcome;
        Ok(Some(command))
      }
      CurveHandshakePhase::ClientProduceInitiate => {
        let command = self.handshake.build_client_initiate()?;
        self.handshake.phase = CurveHandshakePhase::ClientExpectReady;
        Ok(Some(command))
      }
      CurveHandshakePhase::ServerProduceWelcome => {
        let command = self.handshake.build_server_welcome()?;
        self.handshake.phase = CurveHandshakePhase::ServerExpectInitiate;
        Ok(Some(command))
      }
      CurveHandshakePhase::ServerProduceReady => {
        let command = self.handshake.build_server_ready()?;
        self.handshake.phase = CurveHandshakePhase::Complete;
        Ok(Some(command))
      }
      CurveHandshakePhase::ServerProduceError => {
        let status_code = self.status_code.as_deref().unwrap_or("500");
        let command = build_error_command(status_code);
        self.handshake.phase = CurveHandshakePhase::ErrorSent;
        Ok(Some(command))
      }
      // In all other states we are waiting on the peer or the
      // authenticator.
      _ => Ok(None),
    }
  }

  fn process_token(&mut self, token: &[u8]) -> Result<ProcessTokenAction, SecurityError> {
    match self.handshake.phase {
      CurveHandshakePhase::ServerExpectHello => {
        self.handshake.process_client_hello(token)?;
        self.handshake.phase = CurveHandshakePhase::ServerProduceWelcome;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
      CurveHandshakePhase::ClientExpectWelcome => {
        if token.starts_with(crate::security::ERROR_PREFIX) {
          return self.process_error(token);
        }
        self.handshake.process_server_welcome(token)?;
        self.handshake.phase = CurveHandshakePhase::ClientProduceInitiate;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
      CurveHandshakePhase::ServerExpectInitiate => {
        self.handshake.process_client_initiate(token)?;
        if self.zap_configured {
          // The extracted long-term key still needs the
          // authenticator's verdict before READY may go out.
          self.handshake.phase = CurveHandshakePhase::ServerExpectZapReply;
          self.zap_request_pending = true;
          Ok(ProcessTokenAction::ContinueWaiting)
        } else {
          self.handshake.phase = CurveHandshakePhase::ServerProduceReady;
          Ok(ProcessTokenAction::ProduceAndSend)
        }
      }
      CurveHandshakePhase::ClientExpectReady => {
        if token.starts_with(crate::security::ERROR_PREFIX) {
          return self.process_error(token);
        }
        self.handshake.process_server_ready(token)?;
        self.handshake.phase = CurveHandshakePhase::Complete;
        Ok(ProcessTokenAction::HandshakeComplete)
      }
      _ => Err(SecurityError::ProtocolViolation(
        "unexpected command for current state".into(),
      )),
    }
  }

  fn status(&self) -> MechanismStatus {
    match self.handshake.phase {
      CurveHandshakePhase::ServerExpectZapReply => MechanismStatus::Authenticating,
      CurveHandshakePhase::Complete => MechanismStatus::Ready,
      CurveHandshakePhase::Error | CurveHandshakePhase::ErrorSent => MechanismStatus::Error,
      _ => MechanismStatus::Handshaking,
    }
  }

  fn peer_identity(&self) -> Option<Vec<u8>> {
    self
      .handshake
      .remote_static_public_key
      .map(|pk| pk.to_vec())
  }

  fn metadata(&self) -> Option<Metadata> {
    let mut merged = self.handshake.peer_metadata.clone()?;
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
    if self.handshake.phase == CurveHandshakePhase::ServerExpectZapReply && self.zap_request_pending
    {
      self.zap_request_pending = false;
      let client_key = self.handshake.remote_static_public_key?;
      Some(self.zap.request_frames(Self::NAME, &[&client_key]))
    } else {
      None
    }
  }

  fn process_zap_reply(
    &mut self,
    reply_frames: &[Vec<u8>],
  ) -> Result<ProcessTokenAction, SecurityError> {
    if self.handshake.phase != CurveHandshakePhase::ServerExpectZapReply {
      return Err(SecurityError::InvalidState(
        "no ZAP exchange outstanding for CURVE",
      ));
    }
    match self.zap.process_reply(reply_frames)? {
      ZapOutcome::Allowed { user_id, metadata } => {
        self.zap_user_id = Some(user_id);
        self.zap_metadata = Some(metadata);
        self.handshake.phase = CurveHandshakePhase::ServerProduceReady;
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
        self.handshake.phase = CurveHandshakePhase::ServerProduceError;
        Ok(ProcessTokenAction::ProduceAndSend)
      }
    }
  }

  fn into_data_cipher_parts(
    self: Box<Self>,
  ) -> Result<(Box<dyn IDataCipher>, Option<Vec<u8>>), SecurityError> {
    if self.status() != MechanismStatus::Ready {
      return Err(SecurityError::InvalidState("CURVE handshake not complete"));
    }
    let peer_identity = self.peer_identity();
    let cipher = self.handshake.into_data_cipher()?;
    Ok((Box::new(cipher), peer_identity))
  }
}
