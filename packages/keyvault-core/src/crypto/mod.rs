//! # Cryptography Module
//!
//! This module provides the symmetric primitives used by KeyVault Core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY HIERARCHY                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Master Key / KEK (256 bits, from MasterKeyProvider)           │   │
//! │  │                          │                                      │   │
//! │  │                          │ wraps (AES-256-GCM)                  │   │
//! │  │                          ▼                                      │   │
//! │  │  Data Key / DEK (256 bits, fresh per secret)                   │   │
//! │  │                          │                                      │   │
//! │  │                          │ encrypts (AES-256-GCM)               │   │
//! │  │                          ▼                                      │   │
//! │  │  Provider API key                                              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SIDECAR HANDSHAKE                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  X25519(ephemeral_a, ephemeral_b) → HKDF-SHA256 → session key  │   │
//! │  │  session key → AES-256-GCM(aad = recipient key id)             │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | AES-256-GCM | Secret encryption, DEK wrapping, sealed payloads |
//! | X25519 | Ephemeral key exchange |
//! | HKDF-SHA256 | Session key derivation, passphrase stretching |
//! | SHA-256 | Key ids |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: `DataKey` and X25519 secrets are zeroized on drop
//! 2. **Secure Random**: `rand::rngs::OsRng` for keys and nonces
//! 3. **No Nonce Reuse**: fresh random nonce per encryption unless the caller
//!    hands over a `Nonce` value, which is consumed by that one call

mod codec;
mod primitives;

pub use codec::{decode_base64, decode_base64url, encode_base64, encode_base64url};
pub use primitives::{
    decrypt_with_aad, decrypt_with_key, encrypt_with_aad, encrypt_with_key, export_key,
    generate_data_key, generate_random_bytes, generate_secure_nonce, import_key,
    import_key_bytes, DataKey, EncryptionResult, Nonce, KEY_SIZE, MAX_RANDOM_BYTES, NONCE_SIZE,
    TAG_SIZE,
};
