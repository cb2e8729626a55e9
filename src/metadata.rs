use bytes::{BufMut, BytesMut};
use linked_hash_map::LinkedHashMap;

use crate::error::SecurityError;

/// Property set exchanged at the end of a security handshake.
///
/// Properties keep their insertion order so that a set round-trips
/// through [`Metadata::encode`] / [`Metadata::decode`] byte for byte.
/// Values are raw bytes; names are ASCII-ish UTF-8 and limited to 255
/// bytes by the single length byte on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
  properties: LinkedHashMap<String, Vec<u8>>,
}

impl Metadata {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts a property, replacing any previous value under the same
  /// name.
  ///
  /// # Panics
  /// Panics if `name` is empty or longer than 255 bytes; the wire
  /// format cannot represent either.
  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
    let name = name.into();
    assert!(
      !name.is_empty() && name.len() <= 255,
      "property name must be 1..=255 bytes"
    );
    self.properties.insert(name, value.into());
  }

  pub fn get(&self, name: &str) -> Option<&[u8]> {
    self.properties.get(name).map(|v| v.as_slice())
  }

  pub fn len(&self) -> usize {
    self.properties.len()
  }

  pub fn is_empty(&self) -> bool {
    self.properties.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
    self
      .properties
      .iter()
      .map(|(k, v)| (k.as_str(), v.as_slice()))
  }

  /// Copies every property of `other` into `self`, overwriting on name
  /// collision. Used to fold ZAP-supplied metadata into the negotiated
  /// set.
  pub fn merge(&mut self, other: &Metadata) {
    for (name, value) in other.iter() {
      self.properties.insert(name.to_string(), value.to_vec());
    }
  }

  /// Serializes each property as: 1-byte name length, name bytes,
  /// 4-byte big-endian value length, value bytes.
  pub fn encode(&self) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(
      self
        .properties
        .iter()
        .map(|(k, v)| 1 + k.len() + 4 + v.len())
        .sum(),
    );
    for (name, value) in &self.properties {
      buf.put_u8(name.len() as u8);
      buf.put_slice(name.as_bytes());
      buf.put_u32(value.len() as u32);
      buf.put_slice(value);
    }
    buf.to_vec()
  }

  /// Decodes a metadata block. All-or-nothing: any declared length that
  /// would read past the end of the buffer, an empty name, or a name
  /// that is not UTF-8 fails the whole block with a framing error.
  pub fn decode(data: &[u8]) -> Result<Self, SecurityError> {
    let mut properties = LinkedHashMap::new();
    let mut cursor = 0usize;
    while cursor < data.len() {
      let name_len = data[cursor] as usize;
      cursor += 1;
      if name_len == 0 {
        return Err(SecurityError::Framing(
          "metadata property has an empty name".into(),
        ));
      }
      if name_len > data.len() - cursor {
        return Err(SecurityError::Framing(
          "metadata name length overruns the buffer".into(),
        ));
      }
      let name = std::str::from_utf8(&data[cursor..cursor + name_len])
        .map_err(|_| SecurityError::Framing("metadata name is not UTF-8".into()))?
        .to_string();
      cursor += name_len;

      if data.len() - cursor < 4 {
        return Err(SecurityError::Framing(
          "metadata value length is truncated".into(),
        ));
      }
      let value_len = u32::from_be_bytes(
        data[cursor..cursor + 4]
          .try_into()
          .expect("length prefix is 4 bytes"),
      ) as usize;
      cursor += 4;
      if value_len > data.len() - cursor {
        return Err(SecurityError::Framing(
          "metadata value length overruns the buffer".into(),
        ));
      }
      let value = data[cursor..cursor + value_len].to_vec();
      cursor += value_len;

      properties.insert(name, value);
    }
    Ok(Self { properties })
  }
}
