//! # Master Key Management
//!
//! Supplies the key-encryption key (KEK) that wraps every data key.
//!
//! ## Provider Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       MASTER KEY PROVIDERS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  MasterKeyManager                                                      │
//! │  ├── key_version: AtomicU32        (active KEK generation)             │
//! │  └── provider: RwLock<Arc<MasterKeyProvider>>                          │
//! │                     │                                                   │
//! │                     ├── Environment(EnvMasterKeyProvider)              │
//! │                     │     secret from env var or value                 │
//! │                     │     ──► parse (hex / base64 / HKDF passphrase)   │
//! │                     │     ──► cached DataKey                           │
//! │                     │                                                   │
//! │                     └── Kms(KmsMasterKeyProvider)                      │
//! │                           always UnsupportedAlgorithm                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The manager clones the provider `Arc` and releases the lock before
//! awaiting the key fetch, so a slow provider never blocks substitution.
//!
//! ## Accepted Master Key Formats
//!
//! | Input | Handling |
//! |-------|----------|
//! | 64 hex characters | decoded, used verbatim |
//! | base64 of exactly 32 bytes | decoded, used verbatim |
//! | any other string of 32+ characters | HKDF-SHA256 stretched to 32 bytes |
//! | shorter than 32 characters | rejected (`KeyUnavailable`) |

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hkdf::Hkdf;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::crypto::{decode_base64, import_key_bytes, DataKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Minimum length of a configured master key secret (256 bits of hex/base64)
pub const MIN_SECRET_LEN: usize = 32;

/// HKDF info string for stretching a passphrase into a KEK
const MASTER_KEY_INFO: &[u8] = b"keyvault-master-key-v1";

/// Which kind of provider supplies the KEK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Pre-shared key from configuration
    Environment,
    /// External key management service
    Kms,
}

impl ProviderKind {
    /// Short name for logs and audit metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Environment => "environment",
            ProviderKind::Kms => "kms",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENVIRONMENT PROVIDER
// ============================================================================

enum SecretSource {
    /// Read from this environment variable on first use
    Variable(String),
    /// Supplied directly
    Value(Zeroizing<String>),
}

/// Master key provider backed by a pre-shared secret
///
/// The secret is imported once; later calls return the cached key.
/// A failed import is not cached, so fixing the environment and retrying
/// works without a restart.
pub struct EnvMasterKeyProvider {
    source: SecretSource,
    key_id: String,
    cached: OnceCell<DataKey>,
}

impl EnvMasterKeyProvider {
    /// Read the secret from environment variable `var` on first use
    pub fn from_env(var: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            source: SecretSource::Variable(var.into()),
            key_id: key_id.into(),
            cached: OnceCell::new(),
        }
    }

    /// Use `secret` directly
    pub fn with_secret(secret: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            source: SecretSource::Value(Zeroizing::new(secret.into())),
            key_id: key_id.into(),
            cached: OnceCell::new(),
        }
    }

    /// Stable identifier of this key
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Import (or return the cached) master key
    pub fn master_key(&self) -> Result<DataKey> {
        self.cached
            .get_or_try_init(|| {
                let secret = self.load_secret()?;
                let key = parse_master_key(&secret)?;
                tracing::info!(key_id = %self.key_id, "Imported master key");
                Ok(key)
            })
            .cloned()
    }

    fn load_secret(&self) -> Result<Zeroizing<String>> {
        match &self.source {
            SecretSource::Variable(name) => std::env::var(name)
                .map(Zeroizing::new)
                .map_err(|_| Error::KeyUnavailable(format!("{} is not set", name))),
            SecretSource::Value(value) => Ok(value.clone()),
        }
    }
}

impl std::fmt::Debug for EnvMasterKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            SecretSource::Variable(name) => name.as_str(),
            SecretSource::Value(_) => "[REDACTED]",
        };
        f.debug_struct("EnvMasterKeyProvider")
            .field("source", &source)
            .field("key_id", &self.key_id)
            .field("cached", &self.cached.get().is_some())
            .finish()
    }
}

/// Turn a configured secret into a 256-bit key
///
/// See the module docs for the accepted formats.
pub fn parse_master_key(secret: &str) -> Result<DataKey> {
    let secret = secret.trim();
    if secret.len() < MIN_SECRET_LEN {
        return Err(Error::KeyUnavailable(format!(
            "master key must be at least {} characters",
            MIN_SECRET_LEN
        )));
    }

    if secret.len() == KEY_SIZE * 2 && secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        let bytes = Zeroizing::new(
            hex::decode(secret)
                .map_err(|_| Error::KeyUnavailable("master key is not valid hex".into()))?,
        );
        return import_key_bytes(&bytes)
            .map_err(|_| Error::KeyUnavailable("master key has the wrong length".into()));
    }

    if let Ok(bytes) = decode_base64(secret) {
        let bytes = Zeroizing::new(bytes);
        if bytes.len() == KEY_SIZE {
            return import_key_bytes(&bytes)
                .map_err(|_| Error::KeyUnavailable("master key has the wrong length".into()));
        }
    }

    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha256>::new(None, secret.as_bytes())
        .expand(MASTER_KEY_INFO, &mut okm[..])
        .map_err(|_| Error::KeyUnavailable("master key derivation failed".into()))?;
    Ok(DataKey::from_bytes(*okm))
}

// ============================================================================
// KMS PROVIDER
// ============================================================================

/// Placeholder for a KMS-backed provider
///
/// Key fetch is not implemented and always fails with
/// `UnsupportedAlgorithm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsMasterKeyProvider {
    key_id: String,
    region: Option<String>,
}

impl KmsMasterKeyProvider {
    /// Create a provider for the KMS key `key_id`
    pub fn new(key_id: impl Into<String>, region: Option<String>) -> Self {
        Self {
            key_id: key_id.into(),
            region,
        }
    }

    /// KMS key identifier
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Configured region, if any
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Always fails: there is no KMS integration
    pub async fn master_key(&self) -> Result<DataKey> {
        tracing::warn!(key_id = %self.key_id, "KMS master key provider invoked");
        Err(Error::UnsupportedAlgorithm(
            "KMS master key provider is not implemented".into(),
        ))
    }
}

// ============================================================================
// PROVIDER
// ============================================================================

/// The source of the KEK, dispatched by variant
#[derive(Debug)]
pub enum MasterKeyProvider {
    /// Pre-shared key from configuration
    Environment(EnvMasterKeyProvider),
    /// External KMS (not implemented)
    Kms(KmsMasterKeyProvider),
}

impl MasterKeyProvider {
    /// Which kind of provider this is
    pub fn kind(&self) -> ProviderKind {
        match self {
            MasterKeyProvider::Environment(_) => ProviderKind::Environment,
            MasterKeyProvider::Kms(_) => ProviderKind::Kms,
        }
    }

    /// Stable key id used for audit and version binding
    pub fn key_id(&self) -> &str {
        match self {
            MasterKeyProvider::Environment(p) => p.key_id(),
            MasterKeyProvider::Kms(p) => p.key_id(),
        }
    }

    /// Fetch the KEK
    pub async fn get_master_key(&self) -> Result<DataKey> {
        match self {
            MasterKeyProvider::Environment(p) => p.master_key(),
            MasterKeyProvider::Kms(p) => p.master_key().await,
        }
    }
}

impl From<EnvMasterKeyProvider> for MasterKeyProvider {
    fn from(provider: EnvMasterKeyProvider) -> Self {
        MasterKeyProvider::Environment(provider)
    }
}

impl From<KmsMasterKeyProvider> for MasterKeyProvider {
    fn from(provider: KmsMasterKeyProvider) -> Self {
        MasterKeyProvider::Kms(provider)
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Holds the active provider and key version
#[derive(Debug)]
pub struct MasterKeyManager {
    provider: RwLock<Arc<MasterKeyProvider>>,
    key_version: AtomicU32,
}

impl MasterKeyManager {
    /// Create a manager; `key_version` must be at least 1
    pub fn new(provider: impl Into<MasterKeyProvider>, key_version: u32) -> Result<Self> {
        if key_version == 0 {
            return Err(Error::InvalidInput("key version must be at least 1".into()));
        }
        Ok(Self {
            provider: RwLock::new(Arc::new(provider.into())),
            key_version: AtomicU32::new(key_version),
        })
    }

    /// Environment-backed manager from configuration
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            EnvMasterKeyProvider::from_env(&config.master_key_env, &config.master_key_id),
            config.key_version,
        )
    }

    /// Fetch the KEK from the active provider
    pub async fn get_master_key(&self) -> Result<DataKey> {
        let provider = self.provider();
        provider.get_master_key().await
    }

    /// The active provider
    pub fn provider(&self) -> Arc<MasterKeyProvider> {
        self.provider.read().clone()
    }

    /// Key id of the active provider
    pub fn key_id(&self) -> String {
        self.provider.read().key_id().to_string()
    }

    /// Kind of the active provider
    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.read().kind()
    }

    /// Replace the active provider
    ///
    /// Calls already awaiting the old provider finish against it.
    pub fn set_provider(&self, provider: impl Into<MasterKeyProvider>) {
        let provider = Arc::new(provider.into());
        tracing::info!(
            kind = %provider.kind(),
            key_id = %provider.key_id(),
            "Master key provider replaced"
        );
        *self.provider.write() = provider;
    }

    /// Active key version
    pub fn current_version(&self) -> u32 {
        self.key_version.load(Ordering::SeqCst)
    }

    /// Change the active key version (>= 1)
    pub fn set_key_version(&self, version: u32) -> Result<()> {
        if version == 0 {
            return Err(Error::InvalidInput("key version must be at least 1".into()));
        }
        let previous = self.key_version.swap(version, Ordering::SeqCst);
        tracing::info!(previous, current = version, "Master key version changed");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
