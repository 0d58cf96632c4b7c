//! # KeyVault Core
//!
//! Envelope encryption, master key management and ephemeral key exchange
//! for AI-provider API keys shared between an orchestrator and its sidecars.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEYVAULT CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │          Envelope            │   │          Exchange            │   │
//! │  │                              │   │                              │   │
//! │  │ - encrypt / decrypt / rotate │   │ - ephemeral X25519 pairs     │   │
//! │  │ - stored record validation   │   │ - seal / open payloads       │   │
//! │  │ - key strength, audit log    │   │ - provider key delivery      │   │
//! │  └───┬─────────┬─────────┬──────┘   │ - registration handshake     │   │
//! │      │         │         │          └──────────────┬───────────────┘   │
//! │      ▼         ▼         ▼                         │                   │
//! │  ┌────────┐ ┌────────┐ ┌────────────┐              │                   │
//! │  │  Rate  │ │ Secure │ │ KeyManager │              │                   │
//! │  │ Limit  │ │ Memory │ │ (KEK)      │              │                   │
//! │  └────────┘ └────────┘ └─────┬──────┘              │                   │
//! │                              │                     │                   │
//! │                              ▼                     ▼                   │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                           Crypto                                 │  │
//! │  │  AES-256-GCM · random keys and nonces · base64 / base64url       │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type for the entire library
//! - [`crypto`] - AEAD primitives and codecs
//! - [`memory`] - Wipe-on-use buffers for transient key material
//! - [`rate_limit`] - Fixed-window attempt counting
//! - [`key_manager`] - Master key (KEK) providers
//! - [`envelope`] - Two-tier encryption of provider keys at rest
//! - [`exchange`] - Ephemeral key exchange and sealed delivery
//! - [`protocol`] - Registration and rotation wire messages
//! - [`config`] - Environment configuration
//!
//! ## Example
//!
//! ```ignore
//! use keyvault_core::{EnvelopeEncryption, VaultConfig};
//!
//! let envelope = EnvelopeEncryption::from_config(&VaultConfig::from_env()?)?;
//! let stored = envelope.encrypt_provider_key("sk-ant-...").await?;
//! let secret = envelope.decrypt_provider_key(&stored).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod key_manager;
pub mod memory;
pub mod protocol;
pub mod rate_limit;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::VaultConfig;
pub use envelope::{
    parse_stored_key, validate_key_strength, validate_stored_key, AuditLog, AuditLogEntry,
    EnvelopeEncryption, StoredProviderKey,
};
pub use error::{Error, Result};
pub use exchange::delivery::{
    package_key_updates, package_provider_keys, unpack_key_updates, unpack_provider_keys,
    ProviderSecrets,
};
pub use exchange::handshake::{OrchestratorHandshake, SidecarHandshake};
pub use exchange::{
    derive_shared_secret, generate_ephemeral_key_pair, open_message, seal_message,
    EphemeralKeyPair, ExchangePrivateKey, ExchangePublicKey, SealedPayload,
};
pub use key_manager::{
    EnvMasterKeyProvider, KmsMasterKeyProvider, MasterKeyManager, MasterKeyProvider, ProviderKind,
};
pub use memory::{SecureBuffer, SecureOperation};
pub use protocol::{
    EncryptedProviderKeyUpdate, KeyRotationUpdate, SidecarRegistrationRequest,
    SidecarRegistrationResponse,
};
pub use rate_limit::{RateLimitConfig, RateLimiter};

// ============================================================================
// DEFAULT INSTANCE
// ============================================================================

use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Process-wide envelope built from the environment
static DEFAULT_ENVELOPE: OnceCell<Arc<EnvelopeEncryption>> = OnceCell::new();

/// Get the process-wide [`EnvelopeEncryption`]
///
/// Built from [`VaultConfig::from_env`] on first call. A configuration
/// error is returned and not cached, so a later call can succeed. The
/// master key itself is read lazily on the first encrypt or decrypt.
///
/// Nothing in this crate requires the default instance; construct
/// [`EnvelopeEncryption`] directly when you need control over its lifetime.
pub fn default_envelope() -> Result<Arc<EnvelopeEncryption>> {
    DEFAULT_ENVELOPE
        .get_or_try_init(|| {
            let config = VaultConfig::from_env()?;
            tracing::info!(
                "Initializing default envelope (KeyVault Core v{}, key version {})",
                version(),
                config.key_version
            );
            Ok(Arc::new(EnvelopeEncryption::from_config(&config)?))
        })
        .cloned()
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of KeyVault Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::OS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================
