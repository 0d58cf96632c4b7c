//! # AEAD Primitives
//!
//! AES-256-GCM encryption with the authentication tag kept separate from the
//! ciphertext, plus key and nonce generation.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      encrypt_with_key()                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  key (32 bytes) ──┐                                                     │
//! │  nonce (12 bytes, caller-supplied or fresh from OsRng) ──┐              │
//! │  plaintext ───────┴──────────────────────────────────────┴──► AES-GCM   │
//! │                                                                │        │
//! │                                   ciphertext || tag (16 bytes) ◄┘        │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                  EncryptionResult { ciphertext, nonce, tag }            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      decrypt_with_key()                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ciphertext || tag ──► AES-GCM open ──► plaintext                       │
//! │                              │                                          │
//! │                              └──► DecryptionFailed (any mismatch,       │
//! │                                   nothing is ever partially returned)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Nonce Uniqueness
//!
//! A `Nonce` is not `Clone` or `Copy`: encryption takes it by value, so a
//! nonce object can be used for exactly one encryption. When no nonce is
//! supplied a fresh one is drawn from the OS CSPRNG for every call.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::codec::{decode_base64, encode_base64};
use crate::error::{Error, Result};

/// Size of an AES-256 key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Largest request accepted by [`generate_random_bytes`]
pub const MAX_RANDOM_BYTES: usize = 1024;

/// A nonce for a single AES-GCM encryption
///
/// Not `Clone`: a nonce value is consumed by the encryption that uses it.
#[derive(Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draw a fresh nonce from the OS CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Use caller-supplied bytes
    ///
    /// The caller is responsible for never repeating these bytes under the
    /// same key.
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A 256-bit AES-GCM key (data key, master key or derived session key)
///
/// Zeroized when dropped. Cloning produces an independent copy that is
/// zeroized on its own drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_SIZE]);

impl DataKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    ///
    /// ## Security Warning
    ///
    /// Only use this for wrapping or export. Never log or persist these bytes
    /// in the clear.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// Output of one AEAD encryption
///
/// The tag and ciphertext are only meaningful together; decryption always
/// recombines and authenticates them as a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionResult {
    /// Ciphertext without the authentication tag
    pub ciphertext: Vec<u8>,
    /// Nonce used for this encryption
    pub nonce: [u8; NONCE_SIZE],
    /// 128-bit authentication tag
    pub tag: [u8; TAG_SIZE],
}

impl EncryptionResult {
    /// Rebuild a result from its base64-encoded parts
    ///
    /// An invalid base64 alphabet is a malformed record (`InvalidEnvelope`).
    /// A nonce or tag of the wrong length is reported as `DecryptionFailed`,
    /// the same as a flipped bit, so length games reveal nothing extra.
    pub fn from_encoded(ciphertext: &str, nonce: &str, tag: &str) -> Result<Self> {
        let decode = |field: &str, value: &str| {
            decode_base64(value)
                .map_err(|_| Error::InvalidEnvelope(format!("{} is not valid base64", field)))
        };

        let ciphertext = decode("ciphertext", ciphertext)?;
        let nonce: [u8; NONCE_SIZE] = decode("nonce", nonce)?
            .try_into()
            .map_err(|_| Error::DecryptionFailed)?;
        let tag: [u8; TAG_SIZE] = decode("tag", tag)?
            .try_into()
            .map_err(|_| Error::DecryptionFailed)?;

        Ok(Self {
            ciphertext,
            nonce,
            tag,
        })
    }

    /// Rebuild a result from `ciphertext || tag` and a separate nonce
    pub fn from_combined(mut combined: Vec<u8>, nonce: [u8; NONCE_SIZE]) -> Result<Self> {
        if combined.len() < TAG_SIZE {
            return Err(Error::DecryptionFailed);
        }
        let tag_bytes = combined.split_off(combined.len() - TAG_SIZE);
        let tag: [u8; TAG_SIZE] = tag_bytes
            .try_into()
            .map_err(|_| Error::DecryptionFailed)?;

        Ok(Self {
            ciphertext: combined,
            nonce,
            tag,
        })
    }

    /// `ciphertext || tag`, the layout AES-GCM itself produces
    pub fn to_combined(&self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(self.ciphertext.len() + TAG_SIZE);
        combined.extend_from_slice(&self.ciphertext);
        combined.extend_from_slice(&self.tag);
        combined
    }

    /// Base64 of the ciphertext
    pub fn ciphertext_base64(&self) -> String {
        encode_base64(&self.ciphertext)
    }

    /// Base64 of the nonce
    pub fn nonce_base64(&self) -> String {
        encode_base64(&self.nonce)
    }

    /// Base64 of the tag
    pub fn tag_base64(&self) -> String {
        encode_base64(&self.tag)
    }
}

/// Generate `len` random bytes from the OS CSPRNG
///
/// `len` must be between 1 and [`MAX_RANDOM_BYTES`].
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>> {
    if len == 0 || len > MAX_RANDOM_BYTES {
        return Err(Error::InvalidInput(format!(
            "random byte length must be between 1 and {}, got {}",
            MAX_RANDOM_BYTES, len
        )));
    }

    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    Ok(bytes)
}

/// Generate a fresh 96-bit nonce
pub fn generate_secure_nonce() -> Nonce {
    Nonce::random()
}

/// Generate a fresh 256-bit data key
pub fn generate_data_key() -> DataKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let key = DataKey::from_bytes(bytes);
    bytes.zeroize();
    key
}

/// Export a key as base64
///
/// The returned string is key material; it is zeroized on drop.
pub fn export_key(key: &DataKey) -> zeroize::Zeroizing<String> {
    zeroize::Zeroizing::new(encode_base64(key.as_bytes()))
}

/// Import a key from base64
///
/// Fails with `KeyImport` if the input is not base64 or not 32 bytes long.
pub fn import_key(encoded: &str) -> Result<DataKey> {
    let bytes = zeroize::Zeroizing::new(
        decode_base64(encoded).map_err(|_| Error::KeyImport("key is not valid base64".into()))?,
    );
    import_key_bytes(&bytes)
}

/// Import a key from raw bytes
pub fn import_key_bytes(bytes: &[u8]) -> Result<DataKey> {
    let mut raw: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
        Error::KeyImport(format!(
            "key must be {} bytes, got {} bytes",
            KEY_SIZE,
            bytes.len()
        ))
    })?;
    let key = DataKey::from_bytes(raw);
    raw.zeroize();
    Ok(key)
}

/// Encrypt with AES-256-GCM and no associated data
///
/// Uses `nonce` if supplied, otherwise draws a fresh one.
pub fn encrypt_with_key(
    key: &DataKey,
    plaintext: &[u8],
    nonce: Option<Nonce>,
) -> Result<EncryptionResult> {
    encrypt_with_aad(key, plaintext, &[], nonce)
}

/// Encrypt with AES-256-GCM, authenticating `aad` alongside the plaintext
pub fn encrypt_with_aad(
    key: &DataKey,
    plaintext: &[u8],
    aad: &[u8],
    nonce: Option<Nonce>,
) -> Result<EncryptionResult> {
    let nonce = nonce.unwrap_or_else(Nonce::random);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let sealed = cipher
        .encrypt(
            AesNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::EncryptionFailed(format!("AEAD seal failed: {}", e)))?;

    EncryptionResult::from_combined(sealed, nonce.0)
        .map_err(|_| Error::EncryptionFailed("AEAD output shorter than tag".into()))
}

/// Authenticate and decrypt a result produced by [`encrypt_with_key`]
///
/// Fails with `DecryptionFailed` on any mismatch of key, nonce, ciphertext
/// or tag.
pub fn decrypt_with_key(key: &DataKey, encrypted: &EncryptionResult) -> Result<Vec<u8>> {
    decrypt_with_aad(key, encrypted, &[])
}

/// Authenticate and decrypt a result produced by [`encrypt_with_aad`]
pub fn decrypt_with_aad(key: &DataKey, encrypted: &EncryptionResult, aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| Error::DecryptionFailed)?;
    let combined = encrypted.to_combined();

    cipher
        .decrypt(
            AesNonce::from_slice(&encrypted.nonce),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = generate_data_key();
        let plaintext = b"sk-live-provider-secret";

        let encrypted = encrypt_with_key(&key, plaintext, None).unwrap();
        assert_eq!(encrypted.ciphertext.len(), plaintext.len());

        let decrypted = decrypt_with_key(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = generate_data_key();
        let encrypted = encrypt_with_key(&key, b"", None).unwrap();
        assert!(encrypted.ciphertext.is_empty());
        assert_eq!(decrypt_with_key(&key, &encrypted).unwrap(), b"");
    }

    #[test]
    fn test_caller_supplied_nonce_is_used() {
        let key = generate_data_key();
        let encrypted = encrypt_with_key(&key, b"hello", Some(Nonce::from_bytes([9u8; 12]))).unwrap();
        assert_eq!(encrypted.nonce, [9u8; 12]);
        assert_eq!(decrypt_with_key(&key, &encrypted).unwrap(), b"hello");
    }

    #[test]
    fn test_nonces_never_repeat() {
        let key = generate_data_key();
        let mut seen = HashSet::new();

        for _ in 0..1000 {
            let encrypted = encrypt_with_key(&key, b"same plaintext", None).unwrap();
            assert!(seen.insert(encrypted.nonce), "nonce repeated");
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_data_key();
        let mut encrypted = encrypt_with_key(&key, b"Hello, World!", None).unwrap();
        encrypted.ciphertext[0] ^= 0xFF;

        assert!(matches!(
            decrypt_with_key(&key, &encrypted),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = generate_data_key();
        let mut encrypted = encrypt_with_key(&key, b"Hello, World!", None).unwrap();
        encrypted.tag[15] ^= 0x01;

        assert!(matches!(
            decrypt_with_key(&key, &encrypted),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let key = generate_data_key();
        let mut encrypted = encrypt_with_key(&key, b"Hello, World!", None).unwrap();
        encrypted.nonce[0] ^= 0x80;

        assert!(decrypt_with_key(&key, &encrypted).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = DataKey::from_bytes([42u8; 32]);
        let key2 = DataKey::from_bytes([99u8; 32]);
        let encrypted = encrypt_with_key(&key1, b"secret", None).unwrap();

        assert!(matches!(
            decrypt_with_key(&key2, &encrypted),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = generate_data_key();
        let encrypted = encrypt_with_aad(&key, b"secret", b"recipient-a", None).unwrap();

        assert!(decrypt_with_aad(&key, &encrypted, b"recipient-a").is_ok());
        assert!(decrypt_with_aad(&key, &encrypted, b"recipient-b").is_err());
        assert!(decrypt_with_key(&key, &encrypted).is_err());
    }

    #[test]
    fn test_random_bytes_bounds() {
        assert_eq!(generate_random_bytes(1).unwrap().len(), 1);
        assert_eq!(generate_random_bytes(1024).unwrap().len(), 1024);
        assert!(matches!(generate_random_bytes(0), Err(Error::InvalidInput(_))));
        assert!(matches!(generate_random_bytes(1025), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_data_keys_are_unique() {
        let a = generate_data_key();
        let b = generate_data_key();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_export_import_round_trip() {
        let key = generate_data_key();
        let exported = export_key(&key);
        let imported = import_key(&exported).unwrap();
        assert_eq!(key.as_bytes(), imported.as_bytes());
    }

    #[test]
    fn test_import_rejects_malformed_keys() {
        assert!(matches!(import_key("not base64!!"), Err(Error::KeyImport(_))));
        assert!(matches!(
            import_key(&encode_base64(&[1u8; 16])),
            Err(Error::KeyImport(_))
        ));
    }

    #[test]
    fn test_from_encoded_round_trip() {
        let key = generate_data_key();
        let encrypted = encrypt_with_key(&key, b"payload", None).unwrap();

        let rebuilt = EncryptionResult::from_encoded(
            &encrypted.ciphertext_base64(),
            &encrypted.nonce_base64(),
            &encrypted.tag_base64(),
        )
        .unwrap();
        assert_eq!(rebuilt, encrypted);
    }

    #[test]
    fn test_from_encoded_wrong_tag_length_is_auth_failure() {
        let key = generate_data_key();
        let encrypted = encrypt_with_key(&key, b"payload", None).unwrap();

        let result = EncryptionResult::from_encoded(
            &encrypted.ciphertext_base64(),
            &encrypted.nonce_base64(),
            &encode_base64(&[0u8; 22]),
        );
        assert!(matches!(result, Err(Error::DecryptionFailed)));

        let result = EncryptionResult::from_encoded(
            &encrypted.ciphertext_base64(),
            "%%%",
            &encrypted.tag_base64(),
        );
        assert!(matches!(result, Err(Error::InvalidEnvelope(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = DataKey::from_bytes([7u8; 32]);
        assert_eq!(format!("{:?}", key), "DataKey([REDACTED])");
    }
}
