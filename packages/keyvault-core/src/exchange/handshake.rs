//! Sidecar registration handshake.
//!
//! ```text
//!  Sidecar                                          Orchestrator
//!  ───────                                          ────────────
//!  SidecarHandshake::new()
//!    ephemeral pair S
//!  registration_request(session, token) ───────►  OrchestratorHandshake::accept()
//!    { sessionId, registrationToken,                 checks shape + key id of S
//!      publicKey: S.pub, keyId: id(S) }              ephemeral pair O
//!                                                  respond(secrets, auth token, port)
//!  complete(response)                   ◄───────     package_provider_keys(→ S, by O)
//!    checks id(O), unpacks secrets
//!
//!  later: apply_key_update(update)      ◄───────   key_update(changed secrets)
//! ```
//!
//! Registration token verification belongs to the orchestrator's session
//! store and happens before [`OrchestratorHandshake::accept`].

use std::collections::BTreeMap;

use super::delivery::{
    package_key_updates, package_provider_keys, unpack_key_updates, unpack_provider_keys,
    ProviderSecrets,
};
use super::{validate_key_id, validate_public_key, EphemeralKeyPair, ExchangePublicKey};
use crate::error::{Error, Result};
use crate::protocol::{KeyRotationUpdate, SidecarRegistrationRequest, SidecarRegistrationResponse};

/// Parse a peer's public key and check it against its claimed key id
fn peer_key(public_key: &str, key_id: &str) -> Result<ExchangePublicKey> {
    if !validate_public_key(public_key) {
        return Err(Error::InvalidInput("peer public key is malformed".into()));
    }
    if !validate_key_id(key_id) {
        return Err(Error::InvalidInput("peer key id is malformed".into()));
    }

    let key = ExchangePublicKey::from_base64(public_key)?;
    if key.key_id() != key_id {
        return Err(Error::KeyExchangeFailed(
            "peer key id does not match its public key".into(),
        ));
    }
    Ok(key)
}

// ============================================================================
// SIDECAR SIDE
// ============================================================================

/// Sidecar half of the handshake
///
/// Holds the sidecar's ephemeral private key for the lifetime of the
/// process; it is never written anywhere.
#[derive(Debug)]
pub struct SidecarHandshake {
    key_pair: EphemeralKeyPair,
    orchestrator_key: Option<ExchangePublicKey>,
}

impl SidecarHandshake {
    /// Generate the sidecar's ephemeral identity
    pub fn new() -> Self {
        Self {
            key_pair: EphemeralKeyPair::generate(),
            orchestrator_key: None,
        }
    }

    /// The sidecar's key id
    pub fn key_id(&self) -> &str {
        self.key_pair.key_id()
    }

    /// Whether [`complete`](Self::complete) has succeeded
    pub fn is_complete(&self) -> bool {
        self.orchestrator_key.is_some()
    }

    /// Build the registration request
    pub fn registration_request(
        &self,
        session_id: impl Into<String>,
        registration_token: impl Into<String>,
    ) -> SidecarRegistrationRequest {
        SidecarRegistrationRequest {
            session_id: session_id.into(),
            registration_token: registration_token.into(),
            public_key: self.key_pair.public_key().to_base64(),
            key_id: self.key_pair.key_id().to_string(),
        }
    }

    /// Verify the orchestrator's response and unpack the provider secrets
    pub fn complete(&mut self, response: &SidecarRegistrationResponse) -> Result<ProviderSecrets> {
        let orchestrator_key = peer_key(
            &response.orchestrator_public_key,
            &response.orchestrator_key_id,
        )?;

        let secrets = unpack_provider_keys(
            &response.encrypted_provider_keys,
            self.key_pair.private_key(),
            &orchestrator_key,
        )?;

        self.orchestrator_key = Some(orchestrator_key);
        tracing::info!(
            key_id = self.key_pair.key_id(),
            orchestrator_key_id = %response.orchestrator_key_id,
            providers = secrets.len(),
            "Sidecar handshake completed"
        );
        Ok(secrets)
    }

    /// Decrypt a rotation update from the orchestrator
    pub fn apply_key_update(&self, update: &KeyRotationUpdate) -> Result<ProviderSecrets> {
        let orchestrator_key = self.orchestrator_key.as_ref().ok_or_else(|| {
            Error::KeyExchangeFailed("handshake has not been completed".into())
        })?;
        unpack_key_updates(update, self.key_pair.private_key(), orchestrator_key)
    }
}

impl Default for SidecarHandshake {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ORCHESTRATOR SIDE
// ============================================================================

/// Orchestrator half of the handshake for one sidecar
#[derive(Debug)]
pub struct OrchestratorHandshake {
    key_pair: EphemeralKeyPair,
    session_id: String,
    sidecar_key: ExchangePublicKey,
    sidecar_key_id: String,
}

impl OrchestratorHandshake {
    /// Validate a registration request and generate the orchestrator's
    /// ephemeral identity for this sidecar
    pub fn accept(request: &SidecarRegistrationRequest) -> Result<Self> {
        if request.session_id.trim().is_empty() {
            return Err(Error::InvalidInput("session id must not be empty".into()));
        }
        if request.registration_token.is_empty() {
            return Err(Error::InvalidInput(
                "registration token must not be empty".into(),
            ));
        }
        let sidecar_key = peer_key(&request.public_key, &request.key_id)?;

        tracing::debug!(
            session_id = %request.session_id,
            sidecar_key_id = %request.key_id,
            "Accepted sidecar registration"
        );
        Ok(Self {
            key_pair: EphemeralKeyPair::generate(),
            session_id: request.session_id.clone(),
            sidecar_key,
            sidecar_key_id: request.key_id.clone(),
        })
    }

    /// Session the sidecar registered for
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The sidecar's key id
    pub fn sidecar_key_id(&self) -> &str {
        &self.sidecar_key_id
    }

    /// The orchestrator's key id for this handshake
    pub fn orchestrator_key_id(&self) -> &str {
        self.key_pair.key_id()
    }

    /// Seal the provider secrets and build the registration response
    pub fn respond<V: AsRef<str>>(
        &self,
        secrets: &BTreeMap<String, V>,
        sidecar_auth_token: impl Into<String>,
        opencode_port: u16,
    ) -> Result<SidecarRegistrationResponse> {
        let encrypted_provider_keys = package_provider_keys(
            secrets,
            &self.sidecar_key,
            self.key_pair.private_key(),
            &self.sidecar_key_id,
        )?;

        tracing::info!(
            session_id = %self.session_id,
            sidecar_key_id = %self.sidecar_key_id,
            providers = secrets.len(),
            "Provider keys delivered to sidecar"
        );
        Ok(SidecarRegistrationResponse {
            sidecar_auth_token: sidecar_auth_token.into(),
            orchestrator_public_key: self.key_pair.public_key().to_base64(),
            orchestrator_key_id: self.key_pair.key_id().to_string(),
            opencode_port,
            encrypted_provider_keys,
        })
    }

    /// Encrypt changed provider secrets for this sidecar
    pub fn key_update<V: AsRef<str>>(
        &self,
        secrets: &BTreeMap<String, V>,
    ) -> Result<KeyRotationUpdate> {
        package_key_updates(secrets, &self.sidecar_key, self.key_pair.private_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::generate_ephemeral_key_pair;

    fn secrets() -> BTreeMap<String, String> {
        BTreeMap::from([(
            "anthropic".to_string(),
            "sk-ant-REDACTED".to_string(),
        )])
    }

    #[test]
    fn test_full_handshake() {
        let mut sidecar = SidecarHandshake::new();
        let request = sidecar.registration_request("session-42", "reg-token");

        let orchestrator = OrchestratorHandshake::accept(&request).unwrap();
        assert_eq!(orchestrator.session_id(), "session-42");
        assert_eq!(orchestrator.sidecar_key_id(), sidecar.key_id());

        let response = orchestrator.respond(&secrets(), "auth-token", 4096).unwrap();
        assert_eq!(response.orchestrator_key_id, orchestrator.orchestrator_key_id());
        assert_eq!(response.encrypted_provider_keys.recipient_key_id, sidecar.key_id());

        assert!(!sidecar.is_complete());
        let delivered = sidecar.complete(&response).unwrap();
        assert!(sidecar.is_complete());
        assert_eq!(
            delivered["anthropic"].as_str(),
            "sk-ant-REDACTED"
        );

        let rotated = BTreeMap::from([(
            "anthropic".to_string(),
            "sk-ant-REDACTED",
        )]);
        let update = orchestrator.key_update(&rotated).unwrap();
        let updated = sidecar.apply_key_update(&update).unwrap();
        assert_eq!(updated["anthropic"].as_str(), "sk-ant-REDACTED");
    }

    #[test]
    fn test_accept_rejects_bad_requests() {
        let sidecar = SidecarHandshake::new();
        let good = sidecar.registration_request("session", "token");

        let mut empty_session = good.clone();
        empty_session.session_id = " ".into();
        assert!(matches!(
            OrchestratorHandshake::accept(&empty_session),
            Err(Error::InvalidInput(_))
        ));

        let mut empty_token = good.clone();
        empty_token.registration_token.clear();
        assert!(OrchestratorHandshake::accept(&empty_token).is_err());

        let mut bad_key = good.clone();
        bad_key.public_key = "not-a-key".into();
        assert!(matches!(
            OrchestratorHandshake::accept(&bad_key),
            Err(Error::InvalidInput(_))
        ));

        let mut wrong_id = good;
        wrong_id.key_id = generate_ephemeral_key_pair().key_id().to_string();
        assert!(matches!(
            OrchestratorHandshake::accept(&wrong_id),
            Err(Error::KeyExchangeFailed(_))
        ));
    }

    #[test]
    fn test_response_for_other_sidecar_fails() {
        let mut sidecar = SidecarHandshake::new();
        let other = SidecarHandshake::new();

        let orchestrator =
            OrchestratorHandshake::accept(&other.registration_request("s", "t")).unwrap();
        let response = orchestrator.respond(&secrets(), "auth", 4096).unwrap();

        assert!(matches!(
            sidecar.complete(&response),
            Err(Error::DecryptionFailed)
        ));
        assert!(!sidecar.is_complete());
    }

    #[test]
    fn test_substituted_orchestrator_key_fails() {
        let mut sidecar = SidecarHandshake::new();
        let orchestrator =
            OrchestratorHandshake::accept(&sidecar.registration_request("s", "t")).unwrap();
        let mut response = orchestrator.respond(&secrets(), "auth", 4096).unwrap();

        let impostor = generate_ephemeral_key_pair();
        response.orchestrator_public_key = impostor.public_key().to_base64();
        assert!(matches!(
            sidecar.complete(&response),
            Err(Error::KeyExchangeFailed(_))
        ));

        response.orchestrator_key_id = impostor.key_id().to_string();
        assert!(matches!(
            sidecar.complete(&response),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_key_update_before_completion_fails() {
        let sidecar = SidecarHandshake::new();
        let update = KeyRotationUpdate {
            encrypted_provider_keys: Vec::new(),
        };
        assert!(matches!(
            sidecar.apply_key_update(&update),
            Err(Error::KeyExchangeFailed(_))
        ));
    }
}
