//! # Key Exchange
//!
//! Ephemeral X25519 identities and sealed payloads for the
//! orchestrator ↔ sidecar handshake.
//!
//! ## Sealing
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         seal_message()                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  sender private key × recipient public key  (X25519)                   │
//! │           ↓                                                             │
//! │  HKDF-SHA256(ikm = shared point, info = "keyvault-key-exchange-v1")    │
//! │           ↓                                                             │
//! │  session key (32 bytes)                                                │
//! │           ↓                                                             │
//! │  AES-256-GCM(session key, message, aad = recipient key id)             │
//! │           ↓                                                             │
//! │  SealedPayload { ciphertext, nonce, tag, recipientKeyId }              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The recipient computes the same session key from its private key and the
//! sender's public key. Binding the key id as associated data means a
//! payload relabelled for another recipient fails to open.
//!
//! ## Key Ids
//!
//! `base64url(SHA-256(public key)[..16])`, 22 characters, no padding.

pub mod delivery;
pub mod handshake;

use hkdf::Hkdf;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::{
    decode_base64, decrypt_with_aad, encode_base64, encode_base64url, encrypt_with_aad, DataKey,
    EncryptionResult, KEY_SIZE,
};
use crate::error::{Error, Result};

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Length of a key id in characters
pub const KEY_ID_LEN: usize = 22;

/// Number of SHA-256 bytes that make up a key id
const KEY_ID_HASH_BYTES: usize = 16;

/// HKDF info string for the handshake session key
const KEY_EXCHANGE_INFO: &[u8] = b"keyvault-key-exchange-v1";

/// Required string fields of a sealed payload
const SEALED_PAYLOAD_FIELDS: [&str; 4] = ["ciphertext", "nonce", "tag", "recipientKeyId"];

// ============================================================================
// KEYS
// ============================================================================

/// An X25519 public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangePublicKey([u8; PUBLIC_KEY_SIZE]);

impl ExchangePublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from base64
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = decode_base64(encoded)?.try_into().map_err(|_| {
            Error::InvalidInput(format!("public key must be {} bytes", PUBLIC_KEY_SIZE))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        encode_base64(&self.0)
    }

    /// Key id derived from this public key
    pub fn key_id(&self) -> String {
        key_id_for(self)
    }
}

/// An X25519 private key
///
/// Never serialized or persisted; zeroized by `x25519-dalek` on drop.
pub struct ExchangePrivateKey(StaticSecret);

impl ExchangePrivateKey {
    /// Generate a fresh private key
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    /// The matching public key
    pub fn public_key(&self) -> ExchangePublicKey {
        ExchangePublicKey(X25519PublicKey::from(&self.0).to_bytes())
    }
}

impl std::fmt::Debug for ExchangePrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExchangePrivateKey([REDACTED])")
    }
}

/// Single-use identity for one registration handshake
#[derive(Debug)]
pub struct EphemeralKeyPair {
    public_key: ExchangePublicKey,
    private_key: ExchangePrivateKey,
    key_id: String,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair
    pub fn generate() -> Self {
        let private_key = ExchangePrivateKey::generate();
        let public_key = private_key.public_key();
        let key_id = key_id_for(&public_key);
        Self {
            public_key,
            private_key,
            key_id,
        }
    }

    /// Public half
    pub fn public_key(&self) -> &ExchangePublicKey {
        &self.public_key
    }

    /// Private half
    pub fn private_key(&self) -> &ExchangePrivateKey {
        &self.private_key
    }

    /// URL-safe id of the public key
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Generate a fresh ephemeral key pair
pub fn generate_ephemeral_key_pair() -> EphemeralKeyPair {
    EphemeralKeyPair::generate()
}

/// Key id for a public key
pub fn key_id_for(public_key: &ExchangePublicKey) -> String {
    let digest = Sha256::digest(public_key.as_bytes());
    encode_base64url(&digest[..KEY_ID_HASH_BYTES])
}

/// X25519 agreement followed by HKDF-SHA256
///
/// Fails with `KeyExchangeFailed` if the peer key is a low-order point
/// (the agreement would be all zeros).
pub fn derive_shared_secret(
    private_key: &ExchangePrivateKey,
    peer_public_key: &ExchangePublicKey,
) -> Result<DataKey> {
    let shared = private_key
        .0
        .diffie_hellman(&X25519PublicKey::from(peer_public_key.0));
    if !shared.was_contributory() {
        return Err(Error::KeyExchangeFailed(
            "peer public key is a low-order point".into(),
        ));
    }

    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha256>::new(None, shared.as_bytes())
        .expand(KEY_EXCHANGE_INFO, &mut okm[..])
        .map_err(|_| Error::KeyExchangeFailed("HKDF expansion failed".into()))?;
    Ok(DataKey::from_bytes(*okm))
}

// ============================================================================
// SEALED PAYLOADS
// ============================================================================

/// A message sealed to one recipient's ephemeral key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedPayload {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 nonce
    pub nonce: String,
    /// Base64 tag
    pub tag: String,
    /// Key id of the intended recipient
    pub recipient_key_id: String,
}

/// Seal `message` so that only the holder of the private key matching
/// `recipient_public_key` can open it
///
/// `recipient_key_id` must be the id of `recipient_public_key`.
pub fn seal_message(
    message: &[u8],
    recipient_public_key: &ExchangePublicKey,
    sender_private_key: &ExchangePrivateKey,
    recipient_key_id: &str,
) -> Result<SealedPayload> {
    if recipient_key_id != key_id_for(recipient_public_key) {
        return Err(Error::InvalidInput(
            "recipient key id does not match recipient public key".into(),
        ));
    }

    let session_key = derive_shared_secret(sender_private_key, recipient_public_key)?;
    let sealed = encrypt_with_aad(&session_key, message, recipient_key_id.as_bytes(), None)?;

    Ok(SealedPayload {
        ciphertext: sealed.ciphertext_base64(),
        nonce: sealed.nonce_base64(),
        tag: sealed.tag_base64(),
        recipient_key_id: recipient_key_id.to_string(),
    })
}

/// Open a payload sealed by [`seal_message`]
///
/// Fails with `DecryptionFailed` on any tampering, on a payload addressed
/// to another key, or when the sender key does not match.
pub fn open_message(
    payload: &SealedPayload,
    recipient_private_key: &ExchangePrivateKey,
    sender_public_key: &ExchangePublicKey,
) -> Result<Zeroizing<Vec<u8>>> {
    if !validate_key_id(&payload.recipient_key_id) {
        return Err(Error::InvalidEnvelope("recipient key id is malformed".into()));
    }
    if payload.recipient_key_id != recipient_private_key.public_key().key_id() {
        return Err(Error::DecryptionFailed);
    }

    let sealed = EncryptionResult::from_encoded(&payload.ciphertext, &payload.nonce, &payload.tag)?;
    let session_key = derive_shared_secret(recipient_private_key, sender_public_key)?;
    decrypt_with_aad(&session_key, &sealed, payload.recipient_key_id.as_bytes()).map(Zeroizing::new)
}

// ============================================================================
// STRUCTURAL VALIDATION
// ============================================================================

/// Whether `candidate` is base64 of a 32-byte public key
pub fn validate_public_key(candidate: &str) -> bool {
    decode_base64(candidate)
        .map(|bytes| bytes.len() == PUBLIC_KEY_SIZE)
        .unwrap_or(false)
}

/// Whether `candidate` has the shape of a key id
pub fn validate_key_id(candidate: &str) -> bool {
    candidate.len() == KEY_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Whether `candidate` has every sealed payload field as a non-empty
/// string and a well-formed recipient key id
pub fn validate_sealed_payload(candidate: &Value) -> bool {
    let Some(payload) = candidate.as_object() else {
        return false;
    };

    let fields_present = SEALED_PAYLOAD_FIELDS.iter().all(|field| {
        payload
            .get(*field)
            .and_then(Value::as_str)
            .map_or(false, |value| !value.is_empty())
    });

    fields_present
        && payload
            .get("recipientKeyId")
            .and_then(Value::as_str)
            .map_or(false, validate_key_id)
}

/// Narrow an untyped JSON value to a [`SealedPayload`]
pub fn parse_sealed_payload(candidate: &Value) -> Result<SealedPayload> {
    if !validate_sealed_payload(candidate) {
        return Err(Error::InvalidEnvelope("sealed payload is malformed".into()));
    }
    SealedPayload::deserialize(candidate)
        .map_err(|_| Error::InvalidEnvelope("sealed payload is malformed".into()))
}

// ============================================================================
// TESTS
// ============================================================================
