//! ZAP (RFC 27) client adapter.
//!
//! Two halves. The protocol half, [`ZapClient`], builds request frames
//! and validates reply frames; it is held by the PLAIN, CURVE and NULL
//! server mechanisms (composition, one adapter per handshake). The
//! transport half, [`ZapEndpoint`] / [`ZapChannel`], carries one
//! request/reply exchange to the process-local authenticator task over
//! a dedicated channel with a bounded wait.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::MechanismConfig;

/// ZAP protocol version. Replies carrying anything else are fatal.
pub const ZAP_VERSION: &[u8] = b"1.0";

/// One request/reply exchange in flight to the authenticator. The
/// authenticator task receives these, inspects `request` and answers on
/// `reply_tx`. Dropping `reply_tx` without answering surfaces as
/// [`SecurityError::ChannelClosed`] on the requesting side.
#[derive(Debug)]
pub struct ZapExchange {
  pub request: Vec<Vec<u8>>,
  pub reply_tx: oneshot::Sender<Vec<Vec<u8>>>,
}

/// Cloneable handle to the process-local authenticator task, the
/// equivalent of the well-known inproc authenticator endpoint. One
/// exists per process (or per test); every connection's handshake
/// connects through a clone of it.
#[derive(Debug, Clone)]
pub struct ZapEndpoint {
  requests: async_channel::Sender<ZapExchange>,
}

impl ZapEndpoint {
  /// Creates the handle plus the authenticator-side receiver. The task
  /// servicing the receiver decides every verdict for the process.
  pub fn pair() -> (Self, async_channel::Receiver<ZapExchange>) {
    let (tx, rx) = async_channel::unbounded();
    (Self { requests: tx }, rx)
  }
}

/// A per-handshake channel to the authenticator, produced by
/// [`ZapClient::connect`].
#[derive(Debug)]
pub struct ZapChannel {
  requests: async_channel::Sender<ZapExchange>,
}

impl ZapChannel {
  /// Performs exactly one request/reply exchange, waiting at most
  /// `wait` for the reply. Dropping the returned future abandons the
  /// exchange cleanly: the authenticator's reply lands on a dead
  /// oneshot and is discarded.
  pub async fn exchange(
    &self,
    request: Vec<Vec<u8>>,
    wait: Duration,
  ) -> Result<Vec<Vec<u8>>, SecurityError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .requests
      .send(ZapExchange { request, reply_tx })
      .await
      .map_err(|_| SecurityError::ChannelClosed)?;
    match tokio::time::timeout(wait, reply_rx).await {
      Ok(Ok(frames)) => Ok(frames),
      Ok(Err(_)) => Err(SecurityError::ChannelClosed),
      Err(_) => Err(SecurityError::Timeout),
    }
  }
}

/// Outcome of a validated ZAP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZapOutcome {
  /// Status class 2xx. The authenticator may attach a user id and
  /// extra metadata for the application.
  Allowed { user_id: String, metadata: Metadata },
  /// Status class 3xx/4xx/5xx. The status code is propagated verbatim
  /// into the ERROR command sent back to the peer.
  Denied {
    status_code: String,
    status_text: String,
  },
}

/// Builds ZAP requests and validates the matching replies for one
/// handshake. Shared by the PLAIN, CURVE and NULL server mechanisms;
/// clients never talk to the authenticator.
#[derive(Debug, Clone)]
pub struct ZapClient {
  domain: String,
  peer_address: String,
  routing_id: Vec<u8>,
  pending_request_id: Option<Vec<u8>>,
}

impl ZapClient {
  pub fn new(config: &MechanismConfig) -> Self {
    Self {
      domain: config.zap_domain.clone().unwrap_or_default(),
      peer_address: config.peer_address.clone(),
      routing_id: config.routing_id.clone().unwrap_or_default(),
      pending_request_id: None,
    }
  }

  /// Resolves the configured authenticator endpoint into a channel.
  /// Mechanisms that require authentication treat
  /// [`SecurityError::NoAuthenticator`] as a hard authentication
  /// failure, never as a bypass.
  pub fn connect(endpoint: Option<&ZapEndpoint>) -> Result<ZapChannel, SecurityError> {
    match endpoint {
      Some(ep) => Ok(ZapChannel {
        requests: ep.requests.clone(),
      }),
      None => Err(SecurityError::NoAuthenticator),
    }
  }

  /// Builds the request frames for `mechanism` with a freshly chosen
  /// request id: version, request id, domain, address, identity,
  /// mechanism name, then the mechanism-specific credential frames.
  pub fn request_frames(&mut self, mechanism: &str, credentials: &[&[u8]]) -> Vec<Vec<u8>> {
    let request_id = rand::random::<u32>().to_string().into_bytes();
    tracing::debug!(
      mechanism,
      request_id = %String::from_utf8_lossy(&request_id),
      domain = %self.domain,
      "Sending ZAP request"
    );
    let mut frames = Vec::with_capacity(6 + credentials.len());
    frames.push(ZAP_VERSION.to_vec());
    frames.push(request_id.clone());
    frames.push(self.domain.clone().into_bytes());
    frames.push(self.peer_address.clone().into_bytes());
    frames.push(self.routing_id.clone());
    frames.push(mechanism.as_bytes().to_vec());
    frames.extend(credentials.iter().map(|c| c.to_vec()));
    self.pending_request_id = Some(request_id);
    frames
  }

  /// Validates a reply against the outstanding request and classifies
  /// its status code. Version or request id mismatches are protocol
  /// violations, fatal to the connection, never mere authentication
  /// failures.
  pub fn process_reply(&mut self, frames: &[Vec<u8>]) -> Result<ZapOutcome, SecurityError> {
    let request_id = self
      .pending_request_id
      .take()
      .ok_or(SecurityError::InvalidState("no ZAP request outstanding"))?;
    if frames.len() != 6 {
      return Err(SecurityError::ProtocolViolation(format!(
        "ZAP reply has {} frames, expected 6",
        frames.len()
      )));
    }
    if frames[0] != ZAP_VERSION {
      return Err(SecurityError::ProtocolViolation(
        "ZAP reply version mismatch".into(),
      ));
    }
    if frames[1] != request_id {
      return Err(SecurityError::ProtocolViolation(
        "ZAP reply request id does not match the request".into(),
      ));
    }
    let status = &frames[2];
    if status.len() != 3 || !status.iter().all(|b| b.is_ascii_digit()) {
      return Err(SecurityError::ProtocolViolation(
        "malformed ZAP status code".into(),
      ));
    }
    let status_code = String::from_utf8(status.clone()).expect("checked ASCII digits");
    match status[0] {
      b'2' => {
        let user_id = String::from_utf8(frames[4].clone())
          .map_err(|_| SecurityError::ProtocolViolation("ZAP user id is not UTF-8".into()))?;
        let metadata = Metadata::decode(&frames[5])
          .map_err(|_| SecurityError::ProtocolViolation("malformed ZAP reply metadata".into()))?;
        tracing::debug!(status_code = %status_code, user_id = %user_id, "ZAP allowed");
        Ok(ZapOutcome::Allowed { user_id, metadata })
      }
      b'3' | b'4' | b'5' => {
        let status_text = String::from_utf8_lossy(&frames[3]).into_owned();
        tracing::debug!(status_code = %status_code, status_text = %status_text, "ZAP denied");
        Ok(ZapOutcome::Denied {
          status_code,
          status_text,
        })
      }
      _ => Err(SecurityError::ProtocolViolation(format!(
        "ZAP status code {} outside the 2xx-5xx classes",
        status_code
      ))),
    }
  }
}
