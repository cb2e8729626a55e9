use std::fmt;

use crate::error::SecurityError;

/// Defines operations for encrypting and decrypting full data frames
/// after a security handshake is complete.
pub trait IDataCipher: Send + fmt::Debug + 'static {
  /// Encrypts a single, complete frame of plaintext bytes into its
  /// wire representation.
  fn encrypt_frame(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError>;

  /// Decrypts a single, complete wire frame back into plaintext.
  fn decrypt_frame(&mut self, wire_frame: &[u8]) -> Result<Vec<u8>, SecurityError>;
}

/// A pure "cipher" that performs no encryption or decryption. It simply
/// passes data through unmodified, conforming to the IDataCipher trait.
/// Used by the NULL and PLAIN mechanisms.
#[derive(Debug, Default)]
pub struct PassThroughDataCipher;

impl IDataCipher for PassThroughDataCipher {
  fn encrypt_frame(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError> {
    Ok(plaintext.to_vec())
  }

  fn decrypt_frame(&mut self, wire_frame: &[u8]) -> Result<Vec<u8>, SecurityError> {
    Ok(wire_frame.to_vec())
  }
}
