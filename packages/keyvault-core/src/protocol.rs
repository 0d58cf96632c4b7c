//! Sidecar registration and key rotation messages.
//!
//! Wire types exchanged between the orchestrator and a sidecar. All field
//! names are camelCase on the wire. Tokens are redacted from `Debug` output.

use serde::{Deserialize, Serialize};

use crate::exchange::SealedPayload;

/// Sent by a sidecar when it registers with the orchestrator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRegistrationRequest {
    /// Session the sidecar belongs to.
    pub session_id: String,
    /// One-time token issued when the sidecar was launched.
    pub registration_token: String,
    /// Sidecar's ephemeral X25519 public key (base64).
    pub public_key: String,
    /// Key id derived from `public_key`.
    pub key_id: String,
}

impl std::fmt::Debug for SidecarRegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarRegistrationRequest")
            .field("session_id", &self.session_id)
            .field("registration_token", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Orchestrator's answer to a registration request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRegistrationResponse {
    /// Token the sidecar presents on later calls.
    pub sidecar_auth_token: String,
    /// Orchestrator's ephemeral X25519 public key (base64).
    pub orchestrator_public_key: String,
    /// Key id derived from `orchestrator_public_key`.
    pub orchestrator_key_id: String,
    /// Port of the agent server inside the sidecar's container.
    pub opencode_port: u16,
    /// Provider secrets sealed to the sidecar's key.
    pub encrypted_provider_keys: SealedPayload,
}

impl std::fmt::Debug for SidecarRegistrationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarRegistrationResponse")
            .field("sidecar_auth_token", &"[REDACTED]")
            .field("orchestrator_public_key", &self.orchestrator_public_key)
            .field("orchestrator_key_id", &self.orchestrator_key_id)
            .field("opencode_port", &self.opencode_port)
            .field("encrypted_provider_keys", &self.encrypted_provider_keys)
            .finish()
    }
}

/// Incremental provider key update pushed after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotationUpdate {
    /// One entry per changed provider.
    pub encrypted_provider_keys: Vec<EncryptedProviderKeyUpdate>,
}

/// One provider's secret, encrypted under the handshake session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedProviderKeyUpdate {
    /// Provider name, e.g. `anthropic`. Bound as associated data.
    pub provider: String,
    /// Base64 of `ciphertext || tag`.
    pub encrypted_key: String,
    /// Base64 nonce.
    pub nonce: String,
}
