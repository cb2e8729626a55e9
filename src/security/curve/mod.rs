//! CurveZMQ security mechanism (RFC 26): an encrypted four-command
//! handshake (HELLO, WELCOME, INITIATE, READY) over curve25519 boxes,
//! followed by an encrypted data phase.

pub(crate) mod cipher;
pub(crate) mod handshake;
pub(crate) mod mechanism;

pub use mechanism::CurveMechanism;

use std::fmt;

use dryoc::classic::crypto_box::crypto_box_keypair;
use zeroize::Zeroize;

/// 32-byte CURVE (curve25519) public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurvePublicKey(pub [u8; 32]);

impl CurvePublicKey {
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl From<[u8; 32]> for CurvePublicKey {
  fn from(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }
}

impl fmt::Debug for CurvePublicKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // A short prefix is enough to correlate keys in logs.
    write!(f, "CurvePublicKey({}..)", hex::encode(&self.0[..4]))
  }
}

/// 32-byte CURVE secret key. Zeroed on drop; Debug output never shows
/// the key material.
#[derive(Clone)]
pub struct CurveSecretKey([u8; 32]);

impl CurveSecretKey {
  pub const fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  pub(crate) fn as_bytes(&self) -> &[u8; 32] {
    &self.0
  }
}

impl From<[u8; 32]> for CurveSecretKey {
  fn from(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }
}

impl Drop for CurveSecretKey {
  fn drop(&mut self) {
    self.0.zeroize();
  }
}

impl fmt::Debug for CurveSecretKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("CurveSecretKey(..)")
  }
}

/// Generates a fresh long-term CURVE key pair.
pub fn curve_keypair() -> (CurvePublicKey, CurveSecretKey) {
  let (public_key, secret_key) = crypto_box_keypair();
  (
    CurvePublicKey::from_bytes(public_key),
    CurveSecretKey::from_bytes(secret_key),
  )
}
