//! # Envelope Encryption
//!
//! Two-tier encryption of provider API keys at rest.
//!
//! ## Envelope Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    encrypt_provider_key(secret)                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. RateLimiter("encrypt_provider_key")  ──► RateLimitExceeded         │
//! │  2. validate_key_strength(secret)        ──► WeakKey                   │
//! │  3. DEK = generate_data_key()            (fresh per call)              │
//! │  4. AES-GCM(DEK, secret)        ──► encryptedKey, nonce, tag           │
//! │  5. KEK = MasterKeyManager::get_master_key().await                     │
//! │  6. AES-GCM(KEK, DEK bytes)     ──► encryptedDataKey,                  │
//! │                                     dataKeyNonce, dataKeyTag           │
//! │  7. stamp keyVersion + masterKeyId                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    decrypt_provider_key(stored)                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. RateLimiter("decrypt_provider_key")                                │
//! │  2. keyVersion == active version?  no ──► UnsupportedAlgorithm         │
//! │  3. KEK ──► unwrap DEK      (tamper in data key fields fails here)     │
//! │  4. DEK ──► open secret     (tamper in secret fields fails here)       │
//! │  5. SecureOperation wipes raw DEK bytes and plaintext copy             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Format
//!
//! ```json
//! {
//!   "encryptedKey": "<base64>", "nonce": "<base64>", "tag": "<base64>",
//!   "encryptedDataKey": "<base64>", "dataKeyNonce": "<base64>",
//!   "dataKeyTag": "<base64>", "keyVersion": 1, "masterKeyId": "env-master-key-v1"
//! }
//! ```
//!
//! Records are never mutated: rotation returns a new record and leaves the
//! input untouched, so a failed rotation can be retried against the original.

mod audit;
mod strength;

pub use audit::{AuditLog, AuditLogEntry};
pub use strength::{validate_key_strength, MIN_KEY_LENGTH};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::crypto::{
    decrypt_with_key, encrypt_with_key, generate_data_key, import_key_bytes, EncryptionResult,
};
use crate::error::{Error, Result};
use crate::key_manager::MasterKeyManager;
use crate::memory::SecureOperation;
use crate::rate_limit::RateLimiter;

/// Rate-limit and audit identifier for encryption
pub const ENCRYPT_OPERATION: &str = "encrypt_provider_key";

/// Rate-limit and audit identifier for decryption
pub const DECRYPT_OPERATION: &str = "decrypt_provider_key";

/// Audit identifier for rotation (rate limited through encrypt/decrypt)
pub const ROTATE_OPERATION: &str = "rotate_provider_key";

const ENCRYPT_FAILED: &str = "Failed to encrypt provider key";
const DECRYPT_FAILED: &str = "Failed to decrypt provider key";
const ROTATE_FAILED: &str = "Failed to rotate provider key";

/// JSON field names a stored record must carry, all non-null
pub const REQUIRED_FIELDS: [&str; 8] = [
    "encryptedKey",
    "nonce",
    "tag",
    "encryptedDataKey",
    "dataKeyNonce",
    "dataKeyTag",
    "keyVersion",
    "masterKeyId",
];

/// A provider secret wrapped under a data key, itself wrapped under the KEK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProviderKey {
    /// Base64 ciphertext of the secret under the DEK
    pub encrypted_key: String,
    /// Base64 nonce for the secret
    pub nonce: String,
    /// Base64 tag for the secret
    pub tag: String,
    /// Base64 ciphertext of the DEK under the KEK
    pub encrypted_data_key: String,
    /// Base64 nonce for the DEK wrap
    pub data_key_nonce: String,
    /// Base64 tag for the DEK wrap
    pub data_key_tag: String,
    /// KEK generation that produced the wrap
    pub key_version: u32,
    /// KEK provider instance
    pub master_key_id: String,
}

impl StoredProviderKey {
    fn secret_part(&self) -> Result<EncryptionResult> {
        EncryptionResult::from_encoded(&self.encrypted_key, &self.nonce, &self.tag)
    }

    fn data_key_part(&self) -> Result<EncryptionResult> {
        EncryptionResult::from_encoded(
            &self.encrypted_data_key,
            &self.data_key_nonce,
            &self.data_key_tag,
        )
    }
}

/// Whether `candidate` has every required field, none of them null
///
/// A structural pre-check only; it does not look at field contents.
pub fn validate_stored_key(candidate: &Value) -> bool {
    candidate.as_object().map_or(false, |record| {
        REQUIRED_FIELDS
            .iter()
            .all(|field| record.get(*field).map_or(false, |value| !value.is_null()))
    })
}

/// Narrow an untyped JSON value to a [`StoredProviderKey`]
///
/// Fails with `InvalidEnvelope` when fields are missing, null or of the
/// wrong type.
pub fn parse_stored_key(candidate: &Value) -> Result<StoredProviderKey> {
    if !validate_stored_key(candidate) {
        return Err(Error::InvalidEnvelope(
            "stored provider key is missing required fields".into(),
        ));
    }
    StoredProviderKey::deserialize(candidate)
        .map_err(|_| Error::InvalidEnvelope("stored provider key has malformed fields".into()))
}

/// Encrypts, decrypts and rotates provider keys
///
/// Explicitly constructed; share one instance behind an `Arc` or use
/// [`crate::default_envelope`] for a process-wide default.
#[derive(Debug)]
pub struct EnvelopeEncryption {
    key_manager: Arc<MasterKeyManager>,
    rate_limiter: Arc<RateLimiter>,
    audit_log: Arc<AuditLog>,
}

impl EnvelopeEncryption {
    /// Create from explicit collaborators
    pub fn new(
        key_manager: Arc<MasterKeyManager>,
        rate_limiter: Arc<RateLimiter>,
        audit_log: Arc<AuditLog>,
    ) -> Self {
        Self {
            key_manager,
            rate_limiter,
            audit_log,
        }
    }

    /// Create with the default rate limiter and audit log
    pub fn with_key_manager(key_manager: MasterKeyManager) -> Self {
        Self::new(
            Arc::new(key_manager),
            Arc::new(RateLimiter::default()),
            Arc::new(AuditLog::default()),
        )
    }

    /// Create from configuration (environment-backed KEK)
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(MasterKeyManager::from_config(config)?),
            Arc::new(RateLimiter::new(config.rate_limit())),
            Arc::new(AuditLog::new(config.audit_log_capacity)),
        ))
    }

    /// The master key manager
    pub fn key_manager(&self) -> &Arc<MasterKeyManager> {
        &self.key_manager
    }

    /// The shared rate limiter
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// The audit log
    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    /// Active key version
    pub fn current_key_version(&self) -> u32 {
        self.key_manager.current_version()
    }

    /// Key id of the active master key provider
    pub fn master_key_id(&self) -> String {
        self.key_manager.key_id()
    }

    // ========================================================================
    // ENCRYPT
    // ========================================================================

    /// Encrypt a provider secret into a new envelope record
    ///
    /// Every call uses a fresh data key and fresh nonces, so encrypting the
    /// same secret twice yields unrelated records.
    pub async fn encrypt_provider_key(&self, plaintext: &str) -> Result<StoredProviderKey> {
        let result = self.encrypt_inner(plaintext).await;
        self.audit(ENCRYPT_OPERATION, &result, result.as_ref().ok());
        result
    }

    async fn encrypt_inner(&self, plaintext: &str) -> Result<StoredProviderKey> {
        self.rate_limiter.enforce(ENCRYPT_OPERATION)?;

        if plaintext.is_empty() {
            return Err(Error::InvalidInput("provider key must not be empty".into()));
        }
        validate_key_strength(plaintext)?;

        self.seal(plaintext).await.map_err(|e| e.context(ENCRYPT_FAILED))
    }

    async fn seal(&self, plaintext: &str) -> Result<StoredProviderKey> {
        let key_version = self.key_manager.current_version();
        let provider = self.key_manager.provider();

        let data_key = generate_data_key();
        let secret = encrypt_with_key(&data_key, plaintext.as_bytes(), None)?;

        let kek = provider.get_master_key().await?;
        let wrapped = encrypt_with_key(&kek, data_key.as_bytes(), None)?;

        tracing::debug!(
            key_version,
            master_key_id = provider.key_id(),
            "Provider key encrypted"
        );

        Ok(StoredProviderKey {
            encrypted_key: secret.ciphertext_base64(),
            nonce: secret.nonce_base64(),
            tag: secret.tag_base64(),
            encrypted_data_key: wrapped.ciphertext_base64(),
            data_key_nonce: wrapped.nonce_base64(),
            data_key_tag: wrapped.tag_base64(),
            key_version,
            master_key_id: provider.key_id().to_string(),
        })
    }

    // ========================================================================
    // DECRYPT
    // ========================================================================

    /// Decrypt an envelope record back to the provider secret
    ///
    /// Any tampering with any field fails with `DecryptionFailed` (wrapped
    /// as "Failed to decrypt provider key"). A record from another key
    /// version fails with `UnsupportedAlgorithm`.
    pub async fn decrypt_provider_key(
        &self,
        stored: &StoredProviderKey,
    ) -> Result<Zeroizing<String>> {
        let result = self.decrypt_inner(stored).await;
        self.audit(DECRYPT_OPERATION, &result, Some(stored));
        result
    }

    async fn decrypt_inner(&self, stored: &StoredProviderKey) -> Result<Zeroizing<String>> {
        self.rate_limiter.enforce(DECRYPT_OPERATION)?;
        self.open(stored).await.map_err(|e| e.context(DECRYPT_FAILED))
    }

    async fn open(&self, stored: &StoredProviderKey) -> Result<Zeroizing<String>> {
        let active = self.key_manager.current_version();
        if stored.key_version != active {
            return Err(Error::UnsupportedAlgorithm(format!(
                "key version {} does not match active version {}",
                stored.key_version, active
            )));
        }

        let wrapped = stored.data_key_part()?;
        let secret = stored.secret_part()?;
        let kek = self.key_manager.get_master_key().await?;

        let mut op = SecureOperation::new(DECRYPT_OPERATION);
        let raw_data_key = op.register(decrypt_with_key(&kek, &wrapped)?);
        let data_key = import_key_bytes(op.get(&raw_data_key)?).map_err(|_| Error::DecryptionFailed)?;
        let plaintext = op.register(decrypt_with_key(&data_key, &secret)?);
        let value = Zeroizing::new(
            op.get_str(&plaintext)
                .map_err(|_| Error::DecryptionFailed)?
                .to_string(),
        );
        op.cleanup();

        tracing::debug!(key_version = stored.key_version, "Provider key decrypted");
        Ok(value)
    }

    // ========================================================================
    // ROTATE
    // ========================================================================

    /// Re-encrypt a record under the current KEK with a fresh data key
    ///
    /// When `new_version` is given the returned record is stamped with it.
    /// The input record is never modified; on failure the caller retries
    /// against it.
    pub async fn rotate_key(
        &self,
        stored: &StoredProviderKey,
        new_version: Option<u32>,
    ) -> Result<StoredProviderKey> {
        let result = self
            .rotate_inner(stored, new_version)
            .await
            .map_err(|e| e.context(ROTATE_FAILED));
        self.audit(ROTATE_OPERATION, &result, result.as_ref().ok().or(Some(stored)));

        if let Ok(rotated) = &result {
            tracing::info!(
                from_version = stored.key_version,
                to_version = rotated.key_version,
                "Provider key rotated"
            );
        }
        result
    }

    async fn rotate_inner(
        &self,
        stored: &StoredProviderKey,
        new_version: Option<u32>,
    ) -> Result<StoredProviderKey> {
        if new_version == Some(0) {
            return Err(Error::InvalidInput("key version must be at least 1".into()));
        }

        let plaintext = self.decrypt_provider_key(stored).await?;
        let mut rotated = self.encrypt_provider_key(&plaintext).await?;
        if let Some(version) = new_version {
            rotated.key_version = version;
        }
        Ok(rotated)
    }

    fn audit<T>(&self, operation: &str, result: &Result<T>, record: Option<&StoredProviderKey>) {
        let metadata = record.map(|record| {
            json!({
                "keyVersion": record.key_version,
                "masterKeyId": record.master_key_id,
            })
        });

        match result {
            Ok(_) => self.audit_log.record_success(operation, metadata),
            Err(e) => self.audit_log.record_failure(operation, &e.to_string(), metadata),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
