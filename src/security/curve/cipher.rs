use std::fmt;

use bytes::{BufMut, BytesMut};
use dryoc::constants::CRYPTO_BOX_MACBYTES;
use zeroize::Zeroizing;

use crate::error::SecurityError;
use crate::security::IDataCipher;

use super::handshake::{open_box, seal_box, short_nonce};

pub(crate) const MESSAGE_PREFIX: &[u8] = b"\x07MESSAGE";
const MESSAGE_NONCE_PREFIX_CLIENT: &[u8; 16] = b"CurveZMQMESSAGEC";
const MESSAGE_NONCE_PREFIX_SERVER: &[u8; 16] = b"CurveZMQMESSAGES";

/// Prefix, 8-byte nonce, MAC; an empty payload is legal.
pub(crate) const MESSAGE_COMMAND_SIZE_MIN: usize = 8 + 8 + CRYPTO_BOX_MACBYTES;

/// Data-phase cipher for CurveZMQ: each frame travels as a MESSAGE
/// command sealed with the shared ephemeral key. Nonce counters
/// continue from the handshake, one per direction, so a replayed or
/// reordered MESSAGE fails to authenticate.
pub struct CurveDataCipher {
  precomputed_key: Zeroizing<[u8; 32]>,
  send_nonce: u64,
  peer_nonce: u64,
  encrypt_prefix: &'static [u8; 16],
  decrypt_prefix: &'static [u8; 16],
}

impl CurveDataCipher {
  pub(crate) fn new(
    precomputed_key: Zeroizing<[u8; 32]>,
    send_nonce: u64,
    peer_nonce: u64,
    is_server: bool,
  ) -> Self {
    let (encrypt_prefix, decrypt_prefix) = if is_server {
      (MESSAGE_NONCE_PREFIX_SERVER, MESSAGE_NONCE_PREFIX_CLIENT)
    } else {
      (MESSAGE_NONCE_PREFIX_CLIENT, MESSAGE_NONCE_PREFIX_SERVER)
    };
    Self {
      precomputed_key,
      send_nonce,
      peer_nonce,
      encrypt_prefix,
      decrypt_prefix,
    }
  }
}

impl IDataCipher for CurveDataCipher {
  fn encrypt_frame(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError> {
    let counter = self.send_nonce;
    self.send_nonce += 1;
    let nonce = short_nonce(self.encrypt_prefix, counter);
    let sealed = seal_box(plaintext, &nonce, &self.precomputed_key);

    let mut wire_frame = BytesMut::with_capacity(MESSAGE_PREFIX.len() + 8 + sealed.len());
    wire_frame.put_slice(MESSAGE_PREFIX);
    wire_frame.put_slice(&counter.to_le_bytes());
    wire_frame.put_slice(&sealed);
    Ok(wire_frame.to_vec())
  }

  fn decrypt_frame(&mut self, wire_frame: &[u8]) -> Result<Vec<u8>, SecurityError> {
    if wire_frame.len() < MESSAGE_COMMAND_SIZE_MIN || !wire_frame.starts_with(MESSAGE_PREFIX) {
      return Err(SecurityError::Framing(
        "CURVE MESSAGE malformed or too short".into(),
      ));
    }
    let counter = u64::from_le_bytes(wire_frame[8..16].try_into().expect("8-byte nonce"));
    if counter <= self.peer_nonce {
      return Err(SecurityError::Encryption(
        "peer nonce did not advance (replayed message)".into(),
      ));
    }
    let nonce = short_nonce(self.decrypt_prefix, counter);
    let plaintext = open_box(&wire_frame[16..], &nonce, &self.precomputed_key)?;
    self.peer_nonce = counter;
    Ok(plaintext)
  }
}

// Keeps the shared key out of Debug output.
impl fmt::Debug for CurveDataCipher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CurveDataCipher")
      .field("send_nonce", &self.send_nonce)
      .field("peer_nonce", &self.peer_nonce)
      .finish_non_exhaustive()
  }
}
