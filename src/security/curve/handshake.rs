use bytes::{BufMut, BytesMut};

use dryoc::classic::crypto_box::{
  crypto_box_beforenm, crypto_box_detached_afternm, crypto_box_keypair,
  crypto_box_open_detached_afternm,
};
use dryoc::classic::crypto_secretbox::{crypto_secretbox_detached, crypto_secretbox_open_detached};
use dryoc::constants::{CRYPTO_BOX_MACBYTES, CRYPTO_SECRETBOX_MACBYTES};
use dryoc::keypair::StackKeyPair as Keypair;
use dryoc::rng::copy_randombytes;
use dryoc::types::ByteArray;
use zeroize::{Zeroize, Zeroizing};

use crate::error::SecurityError;
use crate::metadata::Metadata;
use crate::options::MechanismConfig;

use super::cipher::CurveDataCipher;

/// Represents the internal state of the CurveZMQ handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CurveHandshakePhase {
  // Client states
  ClientStart,            // produce HELLO
  ClientExpectWelcome,    // sent HELLO, waiting for WELCOME
  ClientProduceInitiate,  // received WELCOME, ready to send INITIATE
  ClientExpectReady,      // sent INITIATE, waiting for READY or ERROR

  // Server states
  ServerExpectHello,      // waiting for HELLO
  ServerProduceWelcome,   // received HELLO, ready to send WELCOME
  ServerExpectInitiate,   // sent WELCOME, waiting for INITIATE
  ServerExpectZapReply,   // INITIATE verified, waiting on the authenticator
  ServerProduceReady,     // verdict in, ready to send READY
  ServerProduceError,     // verdict in, ready to send ERROR

  // Terminal states
  Complete,
  ErrorSent,
  Error,
}

// Command layout constants. HELLO and WELCOME are fixed size; INITIATE
// and READY grow with the embedded metadata block.
pub(crate) const HELLO_COMMAND_SIZE: usize = 200;
pub(crate) const WELCOME_COMMAND_SIZE: usize = 168;
pub(crate) const COOKIE_SIZE: usize = 96;
pub(crate) const INITIATE_COMMAND_SIZE_MIN: usize = 257;
pub(crate) const READY_COMMAND_SIZE_MIN: usize = 30;

/// A state machine that encapsulates the logic and state for a ZMTP
/// CurveZMQ handshake, both roles. Long-term and ephemeral secret keys
/// never outlive this value and are zeroed on drop.
pub(crate) struct CurveHandshake {
  pub(crate) phase: CurveHandshakePhase,
  pub(crate) is_server: bool,

  // Cryptographic materials.
  local_static_keypair: Keypair,
  pub(crate) remote_static_public_key: Option<[u8; 32]>, // client knows, server learns
  local_ephemeral_public_key: [u8; 32],
  local_ephemeral_secret_key: Zeroizing<[u8; 32]>,
  remote_ephemeral_public_key: Option<[u8; 32]>,

  // Shared key between the two ephemeral keys, used for INITIATE,
  // READY and the data phase.
  precomputed_key: Option<Zeroizing<[u8; 32]>>,

  // Server only, alive between WELCOME and INITIATE. Sealing the
  // ephemeral secret into the cookie lets the server forget it and
  // reconstruct it from whatever the client echoes back.
  cookie_key: Option<Zeroizing<[u8; 32]>>,
  // Client only, alive between WELCOME and INITIATE.
  cookie: Option<Vec<u8>>,

  // Strictly increasing short-nonce counters, one per direction.
  send_nonce: u64,
  peer_nonce: u64,

  own_metadata: Metadata,
  pub(crate) peer_metadata: Option<Metadata>,
}

impl CurveHandshake {
  const HELLO_PREFIX: &'static [u8] = b"\x05HELLO";
  const WELCOME_PREFIX: &'static [u8] = b"\x07WELCOME";
  const INITIATE_PREFIX: &'static [u8] = b"\x08INITIATE";
  const READY_PREFIX: &'static [u8] = b"\x05READY";

  const HELLO_NONCE_PREFIX: &'static [u8; 16] = b"CurveZMQHELLO---";
  const INITIATE_NONCE_PREFIX: &'static [u8; 16] = b"CurveZMQINITIATE";
  const READY_NONCE_PREFIX: &'static [u8; 16] = b"CurveZMQREADY---";
  const WELCOME_NONCE_PREFIX: &'static [u8; 8] = b"WELCOME-";
  const COOKIE_NONCE_PREFIX: &'static [u8; 8] = b"COOKIE--";
  const VOUCH_NONCE_PREFIX: &'static [u8; 8] = b"VOUCH---";

  /// Creates a new Curve handshake state machine. Both roles need the
  /// long-term secret key; the client additionally needs the server's
  /// long-term public key.
  pub(crate) fn new(
    is_server: bool,
    config: &MechanismConfig,
    own_metadata: Metadata,
  ) -> Result<Self, SecurityError> {
    let local_static_keypair = Keypair::from_secret_key(
      (*config
        .curve
        .local_secret_key
        .as_ref()
        .ok_or(SecurityError::InvalidCurveKey)?
        .as_bytes())
      .into(),
    );

    let remote_static_public_key = if is_server {
      None
    } else {
      Some(
        *config
          .curve
          .remote_public_key
          .as_ref()
          .ok_or(SecurityError::InvalidCurveKey)?
          .as_bytes(),
      )
    };

    // Fresh ephemeral pair per connection.
    let (ephemeral_public, ephemeral_secret) = crypto_box_keypair();

    Ok(Self {
      phase: if is_server {
        CurveHandshakePhase::ServerExpectHello
      } else {
        CurveHandshakePhase::ClientStart
      },
      is_server,
      local_static_keypair,
      remote_static_public_key,
      local_ephemeral_public_key: ephemeral_public,
      local_ephemeral_secret_key: Zeroizing::new(ephemeral_secret),
      remote_ephemeral_public_key: None,
      precomputed_key: None,
      cookie_key: None,
      cookie: None,
      send_nonce: 1,
      peer_nonce: 0,
      own_metadata,
      peer_metadata: None,
    })
  }

  /// Helper to log key prefixes for debugging. Public keys only.
  fn key_prefix(key: &[u8]) -> String {
    hex::encode(&key[..4])
  }

  fn next_send_nonce(&mut self) -> u64 {
    let nonce = self.send_nonce;
    self.send_nonce += 1;
    nonce
  }

  /// Rejects a peer counter that did not move forward; a replayed
  /// command cannot decrypt into the advanced nonce state.
  fn check_peer_nonce(&self, counter: u64) -> Result<(), SecurityError> {
    if counter <= self.peer_nonce {
      return Err(SecurityError::Encryption(
        "peer nonce did not advance (replayed command)".into(),
      ));
    }
    Ok(())
  }

  // --- Client side ---

  pub(crate) fn build_client_hello(&mut self) -> Result<Vec<u8>, SecurityError> {
    let server_static_pk = self
      .remote_static_public_key
      .ok_or(SecurityError::InvalidState("HELLO without a server key"))?;
    tracing::debug!(
      side = "client",
      state = "build_hello",
      client_eph_pk = %Self::key_prefix(&self.local_ephemeral_public_key),
      "Building HELLO command"
    );

    let counter = self.next_send_nonce();
    let nonce = short_nonce(Self::HELLO_NONCE_PREFIX, counter);
    // The signature box proves possession of the ephemeral secret key;
    // its content is fixed at 64 zero bytes.
    let mut key = crypto_box_beforenm(&server_static_pk, &self.local_ephemeral_secret_key);
    let signature = seal_box(&[0u8; 64], &nonce, &key);
    key.zeroize();

    let mut command = BytesMut::with_capacity(HELLO_COMMAND_SIZE);
    command.put_slice(Self::HELLO_PREFIX);
    command.put_u8(1); // major version
    command.put_u8(0); // minor version
    command.put_bytes(0, 72); // anti-amplification padding
    command.put_slice(&self.local_ephemeral_public_key);
    command.put_slice(&counter.to_le_bytes());
    command.put_slice(&signature);
    debug_assert_eq!(command.len(), HELLO_COMMAND_SIZE);
    Ok(command.to_vec())
  }

  pub(crate) fn process_server_welcome(&mut self, token: &[u8]) -> Result<(), SecurityError> {
    if token.len() != WELCOME_COMMAND_SIZE || !token.starts_with(Self::WELCOME_PREFIX) {
      return Err(SecurityError::Framing(
        "CURVE WELCOME malformed or wrong size".into(),
      ));
    }
    let server_static_pk = self
      .remote_static_public_key
      .ok_or(SecurityError::InvalidState("WELCOME without a server key"))?;

    let nonce = long_nonce(Self::WELCOME_NONCE_PREFIX, &token[8..24]);
    let mut key = crypto_box_beforenm(&server_static_pk, &self.local_ephemeral_secret_key);
    let opened = open_box(&token[24..], &nonce, &key);
    key.zeroize();
    let plaintext = opened?; // 128 bytes: S' then the cookie

    let mut server_ephemeral_pk = [0u8; 32];
    server_ephemeral_pk.copy_from_slice(&plaintext[..32]);
    self.remote_ephemeral_public_key = Some(server_ephemeral_pk);
    self.cookie = Some(plaintext[32..].to_vec());

    // Final shared key between the two ephemeral keys.
    let final_key = crypto_box_beforenm(&server_ephemeral_pk, &self.local_ephemeral_secret_key);
    self.precomputed_key = Some(Zeroizing::new(final_key));
    tracing::debug!(
      side = "client",
      state = "process_welcome",
      server_eph_pk = %Self::key_prefix(&server_ephemeral_pk),
      "Processed WELCOME command"
    );
    Ok(())
  }

  pub(crate) fn build_client_initiate(&mut self) -> Result<Vec<u8>, SecurityError> {
    let server_ephemeral_pk = self
      .remote_ephemeral_public_key
      .ok_or(SecurityError::InvalidState("INITIATE before WELCOME"))?;
    let server_static_pk = self
      .remote_static_public_key
      .ok_or(SecurityError::InvalidState("INITIATE without a server key"))?;
    let cookie = self
      .cookie
      .take()
      .ok_or(SecurityError::InvalidState("INITIATE without a cookie"))?;

    // The vouch proves possession of the long-term secret key by
    // binding our ephemeral key and the server's long-term key.
    let mut vouch_plaintext = [0u8; 64];
    vouch_plaintext[..32].copy_from_slice(&self.local_ephemeral_public_key);
    vouch_plaintext[32..].copy_from_slice(&server_static_pk);
    let mut vouch_nonce_suffix = [0u8; 16];
    copy_randombytes(&mut vouch_nonce_suffix);
    let vouch_nonce = long_nonce(Self::VOUCH_NONCE_PREFIX, &vouch_nonce_suffix);
    let mut vouch_key = crypto_box_beforenm(
      &server_ephemeral_pk,
      self.local_static_keypair.secret_key.as_array(),
    );
    let vouch_box = seal_box(&vouch_plaintext, &vouch_nonce, &vouch_key);
    vouch_key.zeroize();

    let metadata_bytes = self.own_metadata.encode();
    let mut plaintext = Vec::with_capacity(128 + metadata_bytes.len());
    plaintext.extend_from_slice(self.local_static_keypair.public_key.as_array());
    plaintext.extend_from_slice(&vouch_nonce_suffix);
    plaintext.extend_from_slice(&vouch_box);
    plaintext.extend_from_slice(&metadata_bytes);

    let counter = self.next_send_nonce();
    let nonce = short_nonce(Self::INITIATE_NONCE_PREFIX, counter);
    let precomputed = self
      .precomputed_key
      .as_ref()
      .ok_or(SecurityError::InvalidState("INITIATE before key agreement"))?;
    let initiate_box = seal_box(&plaintext, &nonce, precomputed);

    let mut command =
      BytesMut::with_capacity(Self::INITIATE_PREFIX.len() + COOKIE_SIZE + 8 + initiate_box.len());
    command.put_slice(Self::INITIATE_PREFIX);
    command.put_slice(&cookie);
    command.put_slice(&counter.to_le_bytes());
    command.put_slice(&initiate_box);
    debug_assert!(command.len() >= INITIATE_COMMAND_SIZE_MIN);
    tracing::debug!(side = "client", state = "build_initiate", "Building INITIATE command");
    Ok(command.to_vec())
  }

  pub(crate) fn process_server_ready(&mut self, token: &[u8]) -> Result<(), SecurityError> {
    if token.len() < READY_COMMAND_SIZE_MIN || !token.starts_with(Self::READY_PREFIX) {
      return Err(SecurityError::Framing(
        "CURVE READY malformed or too short".into(),
      ));
    }
    let counter = u64::from_le_bytes(token[6..14].try_into().expect("8-byte nonce"));
    self.check_peer_nonce(counter)?;
    let nonce = short_nonce(Self::READY_NONCE_PREFIX, counter);
    let precomputed = self
      .precomputed_key
      .as_ref()
      .ok_or(SecurityError::InvalidState("READY before key agreement"))?;
    let plaintext = open_box(&token[14..], &nonce, precomputed)?;
    self.peer_metadata = Some(Metadata::decode(&plaintext)?);
    self.peer_nonce = counter;
    tracing::debug!(side = "client", state = "process_ready", "Processed READY command");
    Ok(())
  }

  // --- Server side ---

  pub(crate) fn process_client_hello(&mut self, token: &[u8]) -> Result<(), SecurityError> {
    if token.len() != HELLO_COMMAND_SIZE || !token.starts_with(Self::HELLO_PREFIX) {
      return Err(SecurityError::Framing(
        "CURVE HELLO malformed or wrong size".into(),
      ));
    }
    if token[6] != 1 || token[7] != 0 {
      return Err(SecurityError::Framing(
        "CURVE HELLO carries an unsupported version".into(),
      ));
    }
    let mut client_ephemeral_pk = [0u8; 32];
    client_ephemeral_pk.copy_from_slice(&token[80..112]);
    let counter = u64::from_le_bytes(token[112..120].try_into().expect("8-byte nonce"));
    self.check_peer_nonce(counter)?;

    let nonce = short_nonce(Self::HELLO_NONCE_PREFIX, counter);
    let mut key = crypto_box_beforenm(
      &client_ephemeral_pk,
      self.local_static_keypair.secret_key.as_array(),
    );
    let opened = open_box(&token[120..], &nonce, &key);
    key.zeroize();
    // Content is 64 zero bytes; the authenticated open is the proof.
    let _signature = opened?;

    self.remote_ephemeral_public_key = Some(client_ephemeral_pk);
    self.peer_nonce = counter;
    tracing::debug!(
      side = "server",
      state = "process_hello",
      client_eph_pk = %Self::key_prefix(&client_ephemeral_pk),
      "Processed HELLO command"
    );
    Ok(())
  }

  pub(crate) fn build_server_welcome(&mut self) -> Result<Vec<u8>, SecurityError> {
    let client_ephemeral_pk = self
      .remote_ephemeral_public_key
      .ok_or(SecurityError::InvalidState("WELCOME before HELLO"))?;

    // Fresh single-use cookie key; it lives only until INITIATE.
    let mut cookie_key = Zeroizing::new([0u8; 32]);
    copy_randombytes(&mut *cookie_key);

    // Cookie plaintext binds the client's ephemeral key to our
    // ephemeral secret so we need not remember either.
    let mut cookie_plaintext = Zeroizing::new([0u8; 64]);
    cookie_plaintext[..32].copy_from_slice(&client_ephemeral_pk);
    cookie_plaintext[32..].copy_from_slice(&*self.local_ephemeral_secret_key);
    let mut cookie_nonce_suffix = [0u8; 16];
    copy_randombytes(&mut cookie_nonce_suffix);
    let cookie_nonce = long_nonce(Self::COOKIE_NONCE_PREFIX, &cookie_nonce_suffix);
    let mut cookie_mac = [0u8; CRYPTO_SECRETBOX_MACBYTES];
    let mut cookie_box = [0u8; 64];
    crypto_secretbox_detached(
      &mut cookie_box,
      &mut cookie_mac,
      &*cookie_plaintext,
      &cookie_nonce,
      &cookie_key,
    );
    let mut cookie = Vec::with_capacity(COOKIE_SIZE);
    cookie.extend_from_slice(&cookie_nonce_suffix);
    cookie.extend_from_slice(&cookie_mac);
    cookie.extend_from_slice(&cookie_box);

    let mut welcome_plaintext = [0u8; 128];
    welcome_plaintext[..32].copy_from_slice(&self.local_ephemeral_public_key);
    welcome_plaintext[32..].copy_from_slice(&cookie);
    let mut welcome_nonce_suffix = [0u8; 16];
    copy_randombytes(&mut welcome_nonce_suffix);
    let welcome_nonce = long_nonce(Self::WELCOME_NONCE_PREFIX, &welcome_nonce_suffix);
    let mut key = crypto_box_beforenm(
      &client_ephemeral_pk,
      self.local_static_keypair.secret_key.as_array(),
    );
    let welcome_box = seal_box(&welcome_plaintext, &welcome_nonce, &key);
    key.zeroize();

    let mut command = BytesMut::with_capacity(WELCOME_COMMAND_SIZE);
    command.put_slice(Self::WELCOME_PREFIX);
    command.put_slice(&welcome_nonce_suffix);
    command.put_slice(&welcome_box);
    debug_assert_eq!(command.len(), WELCOME_COMMAND_SIZE);

    self.cookie_key = Some(cookie_key);
    tracing::debug!(
      side = "server",
      state = "build_welcome",
      server_eph_pk = %Self::key_prefix(&self.local_ephemeral_public_key),
      "Building WELCOME command"
    );
    Ok(command.to_vec())
  }

  pub(crate) fn process_client_initiate(&mut self, token: &[u8]) -> Result<(), SecurityError> {
    if token.len() < INITIATE_COMMAND_SIZE_MIN || !token.starts_with(Self::INITIATE_PREFIX) {
      return Err(SecurityError::Framing(
        "CURVE INITIATE malformed or too short".into(),
      ));
    }
    let cookie_key = self
      .cookie_key
      .take()
      .ok_or(SecurityError::InvalidState("INITIATE before WELCOME"))?;

    // Open the echoed cookie and reconstruct the connection's
    // ephemeral keys from it alone.
    let cookie = &token[9..9 + COOKIE_SIZE];
    let cookie_nonce = long_nonce(Self::COOKIE_NONCE_PREFIX, &cookie[..16]);
    let mut cookie_mac = [0u8; CRYPTO_SECRETBOX_MACBYTES];
    cookie_mac.copy_from_slice(&cookie[16..32]);
    let mut cookie_plaintext = Zeroizing::new([0u8; 64]);
    crypto_secretbox_open_detached(
      &mut *cookie_plaintext,
      &cookie_mac,
      &cookie[32..],
      &cookie_nonce,
      &cookie_key,
    )
    .map_err(|_| SecurityError::Encryption("WELCOME cookie rejected".into()))?;
    drop(cookie_key); // single use

    let mut client_ephemeral_pk = [0u8; 32];
    client_ephemeral_pk.copy_from_slice(&cookie_plaintext[..32]);
    let mut server_ephemeral_sk = Zeroizing::new([0u8; 32]);
    server_ephemeral_sk.copy_from_slice(&cookie_plaintext[32..]);

    let counter = u64::from_le_bytes(token[105..113].try_into().expect("8-byte nonce"));
    self.check_peer_nonce(counter)?;
    let nonce = short_nonce(Self::INITIATE_NONCE_PREFIX, counter);
    let precomputed = Zeroizing::new(crypto_box_beforenm(
      &client_ephemeral_pk,
      &server_ephemeral_sk,
    ));
    let plaintext = open_box(&token[113..], &nonce, &precomputed)?;
    // Plaintext layout: C (32), vouch nonce (16), vouch box (80),
    // metadata. The size floor above guarantees the fixed part.
    let mut client_static_pk = [0u8; 32];
    client_static_pk.copy_from_slice(&plaintext[..32]);

    let vouch_nonce = long_nonce(Self::VOUCH_NONCE_PREFIX, &plaintext[32..48]);
    let mut vouch_key = crypto_box_beforenm(&client_static_pk, &server_ephemeral_sk);
    let vouch_opened = open_box(&plaintext[48..128], &vouch_nonce, &vouch_key);
    vouch_key.zeroize();
    let vouch = vouch_opened?;
    if vouch[..32] != client_ephemeral_pk[..] {
      return Err(SecurityError::ProtocolViolation(
        "INITIATE vouch does not cover the ephemeral key".into(),
      ));
    }
    if vouch[32..] != self.local_static_keypair.public_key.as_array()[..] {
      return Err(SecurityError::ProtocolViolation(
        "INITIATE vouch is addressed to a different server".into(),
      ));
    }

    let metadata = Metadata::decode(&plaintext[128..])?;

    self.remote_ephemeral_public_key = Some(client_ephemeral_pk);
    self.remote_static_public_key = Some(client_static_pk);
    self.precomputed_key = Some(precomputed);
    self.peer_nonce = counter;
    self.peer_metadata = Some(metadata);
    tracing::debug!(
      side = "server",
      state = "process_initiate",
      client_pk = %Self::key_prefix(&client_static_pk),
      "Processed INITIATE command"
    );
    Ok(())
  }

  pub(crate) fn build_server_ready(&mut self) -> Result<Vec<u8>, SecurityError> {
    let precomputed = self
      .precomputed_key
      .as_ref()
      .ok_or(SecurityError::InvalidState("READY before INITIATE"))?;
    let counter = self.send_nonce;
    let nonce = short_nonce(Self::READY_NONCE_PREFIX, counter);
    let ready_box = seal_box(&self.own_metadata.encode(), &nonce, precomputed);
    self.send_nonce += 1;

    let mut command = BytesMut::with_capacity(Self::READY_PREFIX.len() + 8 + ready_box.len());
    command.put_slice(Self::READY_PREFIX);
    command.put_slice(&counter.to_le_bytes());
    command.put_slice(&ready_box);
    tracing::debug!(side = "server", state = "build_ready", "Building READY command");
    Ok(command.to_vec())
  }

  /// Consumes the completed handshake state to produce the data-phase
  /// cipher. Counters continue where the handshake left off.
  pub(crate) fn into_data_cipher(mut self) -> Result<CurveDataCipher, SecurityError> {
    if self.phase != CurveHandshakePhase::Complete {
      return Err(SecurityError::InvalidState("CURVE handshake not complete"));
    }
    let key = self
      .precomputed_key
      .take()
      .ok_or(SecurityError::InvalidState("shared secret not derived"))?;
    Ok(CurveDataCipher::new(
      key,
      self.send_nonce,
      self.peer_nonce,
      self.is_server,
    ))
  }
}

// Keeps every kind of key material out of Debug output.
impl std::fmt::Debug for CurveHandshake {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CurveHandshake")
      .field("phase", &self.phase)
      .field("is_server", &self.is_server)
      .field("send_nonce", &self.send_nonce)
      .field("peer_nonce", &self.peer_nonce)
      .finish_non_exhaustive()
  }
}

// --- Box helpers shared with the data-phase cipher ---

/// Builds a 24-byte nonce from a 16-byte ASCII prefix and a strictly
/// increasing little-endian counter.
pub(crate) fn short_nonce(prefix: &[u8; 16], counter: u64) -> [u8; 24] {
  let mut nonce = [0u8; 24];
  nonce[..16].copy_from_slice(prefix);
  nonce[16..].copy_from_slice(&counter.to_le_bytes());
  nonce
}

/// Builds a 24-byte nonce from an 8-byte ASCII prefix and 16 random
/// bytes carried on the wire.
pub(crate) fn long_nonce(prefix: &[u8; 8], suffix: &[u8]) -> [u8; 24] {
  debug_assert_eq!(suffix.len(), 16);
  let mut nonce = [0u8; 24];
  nonce[..8].copy_from_slice(prefix);
  nonce[8..].copy_from_slice(suffix);
  nonce
}

/// Seals `plaintext` with a precomputed key, returning MAC then
/// ciphertext (the detached box laid out for the wire).
pub(crate) fn seal_box(plaintext: &[u8], nonce: &[u8; 24], key: &[u8; 32]) -> Vec<u8> {
  let mut mac = [0u8; CRYPTO_BOX_MACBYTES];
  let mut ciphertext = vec![0u8; plaintext.len()];
  crypto_box_detached_afternm(&mut ciphertext, &mut mac, plaintext, nonce, key);
  let mut sealed = Vec::with_capacity(CRYPTO_BOX_MACBYTES + ciphertext.len());
  sealed.extend_from_slice(&mac);
  sealed.extend_from_slice(&ciphertext);
  sealed
}

/// Opens a MAC-then-ciphertext box. Any failure is a decryption
/// failure; the caller never learns more than that.
pub(crate) fn open_box(
  sealed: &[u8],
  nonce: &[u8; 24],
  key: &[u8; 32],
) -> Result<Vec<u8>, SecurityError> {
  if sealed.len() < CRYPTO_BOX_MACBYTES {
    return Err(SecurityError::Encryption("box shorter than its MAC".into()));
  }
  let mut mac = [0u8; CRYPTO_BOX_MACBYTES];
  mac.copy_from_slice(&sealed[..CRYPTO_BOX_MACBYTES]);
  let ciphertext = &sealed[CRYPTO_BOX_MACBYTES..];
  let mut plaintext = vec![0u8; ciphertext.len()];
  crypto_box_open_detached_afternm(&mut plaintext, &mac, ciphertext, nonce, key)?;
  Ok(plaintext)
}
