//! # Error Handling
//!
//! This module provides the single error family used across KeyVault Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Input / Encoding Errors                                           │
//! │  │   ├── InvalidInput          - Argument out of range                 │
//! │  │   ├── InvalidEncoding       - Bad base64 / base64url alphabet       │
//! │  │   ├── InvalidEnvelope       - Malformed stored record or payload    │
//! │  │   └── Serialization         - JSON encode/decode failure            │
//! │  │                                                                      │
//! │  ├── Key Management Errors                                             │
//! │  │   ├── KeyImport             - Raw key could not be imported         │
//! │  │   ├── KeyUnavailable        - KEK provider cannot supply a key      │
//! │  │   ├── UnsupportedAlgorithm  - Unknown version / unimplemented       │
//! │  │   └── Configuration         - Bad configuration value               │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── EncryptionFailed      - AEAD encryption failed                │
//! │  │   ├── DecryptionFailed      - Authentication failed (uniform)       │
//! │  │   └── KeyExchangeFailed     - X25519 agreement rejected             │
//! │  │                                                                      │
//! │  ├── Policy Errors                                                     │
//! │  │   ├── WeakKey               - Secret fails strength requirements    │
//! │  │   └── RateLimitExceeded     - Operation throttled                   │
//! │  │                                                                      │
//! │  ├── Memory Errors                                                     │
//! │  │   └── BufferWiped           - SecureBuffer accessed after wipe      │
//! │  │                                                                      │
//! │  └── Operation { action, source }                                      │
//! │      Wraps any of the above with an action-describing message          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! ```text
//! primitive failure              envelope layer                   caller
//! ─────────────────────────────────────────────────────────────────────────
//! Err(DecryptionFailed)  ──►  Operation {                 ──►  root_cause()
//!                               action: "Failed to decrypt      == DecryptionFailed
//!                                        provider key",
//!                               source: DecryptionFailed }
//! ```
//!
//! `DecryptionFailed` carries no detail: corrupted ciphertext,
//! a wrong key and a wrong tag are indistinguishable to the caller.

use thiserror::Error;

/// Result type alias for KeyVault Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for KeyVault Core
///
/// Messages never include plaintext, key bytes or ciphertext.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Input / Encoding Errors (100-199)
    // ========================================================================

    /// An argument was outside its allowed range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Base64 / base64url input used an invalid alphabet or padding
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A stored envelope record or sealed payload is malformed or incomplete
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ========================================================================
    // Key Management Errors (200-299)
    // ========================================================================

    /// A raw key could not be imported
    #[error("Failed to import key: {0}")]
    KeyImport(String),

    /// The master key provider cannot supply a key
    #[error("Master key unavailable: {0}")]
    KeyUnavailable(String),

    /// Unknown key version or unimplemented provider
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Configuration value missing or malformed
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// AEAD encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication tag mismatch
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// Key agreement was rejected
    #[error("Key exchange failed: {0}")]
    KeyExchangeFailed(String),

    // ========================================================================
    // Policy Errors (400-499)
    // ========================================================================

    /// The secret does not meet security requirements
    #[error("Provider key does not meet security requirements: {0}")]
    WeakKey(String),

    /// Too many attempts for this operation in the current window
    #[error("Rate limit exceeded for {operation}; retry in {retry_after_ms} ms")]
    RateLimitExceeded {
        /// Operation identifier that was throttled
        operation: String,
        /// Milliseconds until the current window resets
        retry_after_ms: u64,
    },

    // ========================================================================
    // Memory Errors (500-599)
    // ========================================================================

    /// A SecureBuffer was read after it had been wiped
    #[error("Secure buffer has been wiped")]
    BufferWiped,

    // ========================================================================
    // Wrapped Errors (900-999)
    // ========================================================================

    /// A lower-level failure wrapped with the action that was being attempted
    #[error("{action}: {source}")]
    Operation {
        /// Human-readable action, e.g. "Failed to encrypt provider key"
        action: &'static str,
        /// The underlying cause
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with an action-describing message
    pub fn context(self, action: &'static str) -> Self {
        Error::Operation {
            action,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any `Operation` wrappers
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::Operation { source, .. } = current {
            current = source;
        }
        current
    }

    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Input / encoding
    /// - 200-299: Key management
    /// - 300-399: Crypto
    /// - 400-499: Policy
    /// - 500-599: Memory
    /// - 900-999: Wrapped (the code of the root cause is usually more useful)
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => 100,
            Error::InvalidEncoding(_) => 101,
            Error::InvalidEnvelope(_) => 102,
            Error::Serialization(_) => 103,

            Error::KeyImport(_) => 200,
            Error::KeyUnavailable(_) => 201,
            Error::UnsupportedAlgorithm(_) => 202,
            Error::Configuration(_) => 203,

            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed => 301,
            Error::KeyExchangeFailed(_) => 302,

            Error::WeakKey(_) => 400,
            Error::RateLimitExceeded { .. } => 401,

            Error::BufferWiped => 500,

            Error::Operation { .. } => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors may succeed if the caller retries later.
    /// Nothing inside this crate retries on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::RateLimitExceeded { .. } | Error::KeyUnavailable(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
