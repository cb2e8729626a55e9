//! Drives one mechanism to completion over discrete command buffers.
//!
//! The transport/session layer owns the socket; this loop only sees the
//! command buffers it has already framed off the wire. It is the one
//! place the handshake touches the authenticator: when a mechanism
//! suspends for a ZAP verdict the loop performs the bounded exchange
//! and feeds the reply back in before anything else happens, so no
//! WELCOME/READY can ever be produced ahead of the verdict.

use async_channel::{Receiver, Sender};

use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::MechanismConfig;

use super::cipher::IDataCipher;
use super::mechanism::Mechanism;
use super::zap::ZapClient;

/// What a successful handshake leaves behind for the session.
#[derive(Debug)]
pub struct HandshakeOutcome {
  pub cipher: Box<dyn IDataCipher>,
  pub peer_identity: Option<Vec<u8>>,
  pub metadata: Option<Metadata>,
}

/// Runs the produce/consume loop until the mechanism is Ready or has
/// failed. A failure that owes the peer an ERROR command is flushed
/// before this returns, so the session only has to close the
/// connection. No handshake error is retried here.
pub async fn perform_handshake(
  mut mechanism: Box<dyn Mechanism>,
  config: &MechanismConfig,
  incoming: Receiver<Vec<u8>>,
  outgoing: Sender<Vec<u8>>,
) -> Result<HandshakeOutcome, SecurityError> {
  loop {
    // Flush everything the mechanism has to say, one command per call.
    while let Some(token) = mechanism.produce_token()? {
      tracing::trace!(
        mechanism = mechanism.name(),
        token_len = token.len(),
        "Sending handshake command"
      );
      outgoing
        .send(token)
        .await
        .map_err(|_| SecurityError::ChannelClosed)?;
    }

    if mechanism.is_error() {
      // A pending ERROR command (if any) went out above; all that is
      // left is to report why and let the session tear down.
      let reason = mechanism
        .error_reason()
        .unwrap_or("security handshake failed")
        .to_string();
      tracing::error!(mechanism = mechanism.name(), %reason, "Security handshake failed");
      return Err(SecurityError::Authentication(reason));
    }
    if mechanism.is_complete() {
      break;
    }

    // A suspended mechanism gets its ZAP verdict before anything else.
    if let Some(request) = mechanism.zap_request_needed() {
      let channel = match ZapClient::connect(config.zap_endpoint.as_ref()) {
        Ok(channel) => channel,
        Err(e) => {
          mechanism.set_error("authenticator required but not reachable".into());
          return Err(e);
        }
      };
      let reply = match channel.exchange(request, config.zap_timeout).await {
        Ok(reply) => reply,
        Err(e) => {
          mechanism.set_error(format!("ZAP exchange failed: {}", e));
          return Err(e);
        }
      };
      mechanism.process_zap_reply(&reply).map_err(|e| {
        tracing::error!(mechanism = mechanism.name(), error = %e, "ZAP reply rejected");
        e
      })?;
      continue;
    }

    let token = incoming
      .recv()
      .await
      .map_err(|_| SecurityError::ChannelClosed)?;
    mechanism.process_token(&token).map_err(|e| {
      tracing::error!(
        mechanism = mechanism.name(),
        error = %e,
        "Peer handshake command rejected"
      );
      e
    })?;
  }

  tracing::debug!(
    mechanism = mechanism.name(),
    "Security handshake successful"
  );
  let metadata = mechanism.metadata();
  let (cipher, peer_identity) = mechanism.into_data_cipher_parts()?;
  Ok(HandshakeOutcome {
    cipher,
    peer_identity,
    metadata,
  })
}
