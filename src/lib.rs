// src/lib.rs

//! zmtp-security - the security mechanism layer of a ZMTP messaging engine.
//!
//! This library implements the per-connection security handshake state
//! machines (NULL, PLAIN, CURVE) together with the ZAP client used to
//! delegate authentication decisions to an external authenticator task.
//! The transport/session layer that owns sockets and frames command
//! buffers off the wire is a collaborator, not part of this crate: it
//! feeds discrete command buffers into a [`Mechanism`] and sends the
//! buffers the mechanism produces, typically via
//! [`security::perform_handshake`].

/// Defines the custom error type used throughout the library.
pub mod error;
/// Metadata property set and its length-prefixed wire codec.
pub mod metadata;
/// Per-connection mechanism configuration.
pub mod options;
/// Handshake state machines (NULL, PLAIN, CURVE) and ZAP.
pub mod security;

// Re-export core types for user convenience, making them accessible
// directly from the crate root.
pub use error::SecurityError;
pub use metadata::Metadata;
pub use options::{MechanismConfig, MechanismKind, PlainMechanismOptions};
pub use security::{
  create_mechanism, perform_handshake, HandshakeOutcome, IDataCipher, Mechanism, MechanismStatus,
  NullMechanism, PlainMechanism, ProcessTokenAction, ZapClient, ZapEndpoint, ZapExchange,
  ZapOutcome,
};

#[cfg(feature = "curve")]
pub use options::CurveOptions;
#[cfg(feature = "curve")]
pub use security::curve::{curve_keypair, CurveMechanism, CurvePublicKey, CurveSecretKey};
