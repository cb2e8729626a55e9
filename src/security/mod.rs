pub mod cipher;
pub mod driver;
pub mod mechanism;
pub mod null;
pub mod plain;
pub mod zap;

#[cfg(feature = "curve")]
pub mod curve;

pub use cipher::{IDataCipher, PassThroughDataCipher};
pub use driver::{perform_handshake, HandshakeOutcome};
pub use mechanism::{Mechanism, MechanismStatus, ProcessTokenAction};
pub use null::NullMechanism;
pub use plain::PlainMechanism;
pub use zap::{ZapClient, ZapEndpoint, ZapExchange, ZapOutcome};

#[cfg(feature = "curve")]
pub use curve::CurveMechanism;

use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::{MechanismConfig, MechanismKind};

/// Instantiates the configured mechanism for one connection. There is
/// no negotiation here: the session already knows which mechanism both
/// peers agreed to run.
pub fn create_mechanism(config: &MechanismConfig) -> Result<Box<dyn Mechanism>, SecurityError> {
  match config.mechanism {
    MechanismKind::Null => Ok(Box::new(NullMechanism::new(config))),
    MechanismKind::Plain => Ok(Box::new(PlainMechanism::new(config)?)),
    #[cfg(feature = "curve")]
    MechanismKind::Curve => Ok(Box::new(CurveMechanism::new(config)?)),
  }
}

/// The handshake properties every mechanism advertises about itself.
pub(crate) fn basic_properties(config: &MechanismConfig) -> Metadata {
  let mut props = Metadata::new();
  if !config.socket_type_name.is_empty() {
    props.insert("Socket-Type", config.socket_type_name.as_bytes());
  }
  if let Some(id) = &config.routing_id {
    if !id.is_empty() && id.len() <= 255 {
      props.insert("Identity", id.clone());
    }
  }
  props
}

pub(crate) const ERROR_PREFIX: &[u8] = b"\x05ERROR";

/// ERROR carries a mandatory 3-byte status code, nothing else.
pub(crate) fn build_error_command(status_code: &str) -> Vec<u8> {
  debug_assert_eq!(status_code.len(), 3);
  let mut command = Vec::with_capacity(ERROR_PREFIX.len() + 1 + status_code.len());
  command.extend_from_slice(ERROR_PREFIX);
  command.push(status_code.len() as u8);
  command.extend_from_slice(status_code.as_bytes());
  command
}

pub(crate) fn parse_error_command(token: &[u8]) -> Result<String, SecurityError> {
  if token.len() != 10 || !token.starts_with(ERROR_PREFIX) || token[6] != 3 {
    return Err(SecurityError::Framing("malformed ERROR command".into()));
  }
  String::from_utf8(token[7..].to_vec())
    .map_err(|_| SecurityError::Framing("ERROR status code is not ASCII".into()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_command_round_trips() {
    let command = build_error_command("400");
    assert_eq!(command, b"\x05ERROR\x03400");
    assert_eq!(parse_error_command(&command).unwrap(), "400");
  }

  #[test]
  fn error_command_length_must_be_three() {
    assert!(parse_error_command(b"\x05ERROR\x0440000").is_err());
    assert!(parse_error_command(b"\x05ERROR\x0240").is_err());
    assert!(parse_error_command(b"\x05ERROR").is_err());
  }
}
