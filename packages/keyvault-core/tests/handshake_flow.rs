//! Sidecar registration and key rotation across a JSON wire.

use std::collections::BTreeMap;
use std::sync::Arc;

use keyvault_core::crypto::encode_base64;
use keyvault_core::{
    generate_ephemeral_key_pair, AuditLog, EnvMasterKeyProvider, EnvelopeEncryption, Error,
    KeyRotationUpdate, MasterKeyManager, OrchestratorHandshake, RateLimiter, SidecarHandshake,
    SidecarRegistrationRequest, SidecarRegistrationResponse,
};

const ANTHROPIC: &str = "sk-ant-REDACTED";
const OPENAI: &str = "sk-abcdefghijklmnopqrstuvwxyz123456";

fn provider_secrets() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("anthropic".to_string(), ANTHROPIC.to_string()),
        ("openai".to_string(), OPENAI.to_string()),
    ])
}

/// Send a message through serde_json the way an HTTP body would travel
fn over_the_wire<T>(message: &T) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let body = serde_json::to_string(message).unwrap();
    serde_json::from_str(&body).unwrap()
}

#[test]
fn test_registration_over_json() {
    let mut sidecar = SidecarHandshake::new();
    let request = over_the_wire(&sidecar.registration_request("session-1", "reg-token"));

    let orchestrator = OrchestratorHandshake::accept(&request).unwrap();
    assert_eq!(orchestrator.session_id(), "session-1");
    assert_eq!(orchestrator.sidecar_key_id(), sidecar.key_id());

    let response = over_the_wire(
        &orchestrator
            .respond(&provider_secrets(), "auth-token", 4096)
            .unwrap(),
    );
    assert_eq!(response.opencode_port, 4096);
    assert_eq!(response.orchestrator_key_id, orchestrator.orchestrator_key_id());

    let delivered = sidecar.complete(&response).unwrap();
    assert!(sidecar.is_complete());
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered["anthropic"].as_str(), ANTHROPIC);
    assert_eq!(delivered["openai"].as_str(), OPENAI);
}

#[test]
fn test_wire_body_has_no_plaintext() {
    let sidecar = SidecarHandshake::new();
    let request = sidecar.registration_request("session-2", "reg-token");
    let orchestrator = OrchestratorHandshake::accept(&request).unwrap();
    let response = orchestrator
        .respond(&provider_secrets(), "auth-token", 4096)
        .unwrap();

    let body = serde_json::to_string(&response).unwrap();
    assert!(!body.contains(ANTHROPIC));
    assert!(!body.contains(OPENAI));
    assert!(body.contains("\"encryptedProviderKeys\""));
    assert!(body.contains("\"recipientKeyId\""));
}

#[test]
fn test_request_with_mismatched_key_id_is_rejected() {
    let sidecar = SidecarHandshake::new();
    let mut request = sidecar.registration_request("session-3", "reg-token");
    request.key_id = generate_ephemeral_key_pair().key_id().to_string();

    let err = OrchestratorHandshake::accept(&request).err().unwrap();
    assert!(matches!(err, Error::KeyExchangeFailed(_)));
}

#[test]
fn test_substituted_orchestrator_key_cannot_open_payload() {
    let mut sidecar = SidecarHandshake::new();
    let request = sidecar.registration_request("session-4", "reg-token");
    let orchestrator = OrchestratorHandshake::accept(&request).unwrap();
    let mut response: SidecarRegistrationResponse = orchestrator
        .respond(&provider_secrets(), "auth-token", 4096)
        .unwrap();

    // An intermediary swaps in its own key and a consistent key id
    let intruder = generate_ephemeral_key_pair();
    response.orchestrator_public_key = intruder.public_key().to_base64();
    response.orchestrator_key_id = intruder.key_id().to_string();

    let err = sidecar.complete(&response).unwrap_err();
    assert!(matches!(err, Error::DecryptionFailed));
    assert!(!sidecar.is_complete());
}

#[test]
fn test_payload_for_one_sidecar_is_useless_to_another() {
    let first = SidecarHandshake::new();
    let mut second = SidecarHandshake::new();

    let orchestrator =
        OrchestratorHandshake::accept(&first.registration_request("session-5", "reg-token"))
            .unwrap();
    let response = orchestrator
        .respond(&provider_secrets(), "auth-token", 4096)
        .unwrap();

    let err = second.complete(&response).unwrap_err();
    assert!(matches!(err, Error::DecryptionFailed));
}

#[test]
fn test_rotation_update_over_json() {
    let mut sidecar = SidecarHandshake::new();
    let request: SidecarRegistrationRequest =
        over_the_wire(&sidecar.registration_request("session-6", "reg-token"));
    let orchestrator = OrchestratorHandshake::accept(&request).unwrap();
    sidecar
        .complete(&over_the_wire(
            &orchestrator
                .respond(&provider_secrets(), "auth-token", 4096)
                .unwrap(),
        ))
        .unwrap();

    let rotated = BTreeMap::from([("openai".to_string(), "sk-proj-N3wK3yR0t4t3dXq9".to_string())]);
    let update: KeyRotationUpdate = over_the_wire(&orchestrator.key_update(&rotated).unwrap());
    assert_eq!(update.encrypted_provider_keys.len(), 1);

    let applied = sidecar.apply_key_update(&update).unwrap();
    assert_eq!(applied["openai"].as_str(), "sk-proj-N3wK3yR0t4t3dXq9");

    // Relabelling an entry breaks its binding to the provider name
    let mut relabelled = update.clone();
    relabelled.encrypted_provider_keys[0].provider = "anthropic".to_string();
    assert!(matches!(
        sidecar.apply_key_update(&relabelled),
        Err(Error::DecryptionFailed)
    ));
}

#[tokio::test]
async fn test_stored_keys_delivered_to_sidecar() {
    let provider = EnvMasterKeyProvider::with_secret(encode_base64(&[9u8; 32]), "delivery-key");
    let envelope = EnvelopeEncryption::new(
        Arc::new(MasterKeyManager::new(provider, 1).unwrap()),
        Arc::new(RateLimiter::default()),
        Arc::new(AuditLog::new(16)),
    );

    // Orchestrator keeps provider keys encrypted at rest
    let stored = envelope.encrypt_provider_key(ANTHROPIC).await.unwrap();

    let mut sidecar = SidecarHandshake::new();
    let orchestrator =
        OrchestratorHandshake::accept(&sidecar.registration_request("session-7", "reg-token"))
            .unwrap();

    let secret = envelope.decrypt_provider_key(&stored).await.unwrap();
    let outgoing = BTreeMap::from([("anthropic".to_string(), secret.as_str())]);
    let response = orchestrator.respond(&outgoing, "auth-token", 4096).unwrap();

    let delivered = sidecar.complete(&over_the_wire(&response)).unwrap();
    assert_eq!(delivered["anthropic"].as_str(), ANTHROPIC);
}
