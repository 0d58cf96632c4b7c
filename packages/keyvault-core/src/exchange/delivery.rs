//! Provider secret delivery over the handshake channel.
//!
//! ```text
//! registration:   { "anthropic": "sk-ant-…", "openai": "sk-…" }
//!                       │ serde_json (BTreeMap: sorted, deterministic)
//!                       ▼
//!                 seal_message ──► one SealedPayload
//!
//! rotation:       per provider: AES-GCM(session key, secret, aad = provider)
//!                       ▼
//!                 KeyRotationUpdate { encryptedProviderKeys: [...] }
//! ```
//!
//! Unpacked secrets are returned as [`Zeroizing`] strings; the caller
//! drops them once they have been handed to their consumer.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use super::{
    derive_shared_secret, open_message, seal_message, ExchangePrivateKey, ExchangePublicKey,
    SealedPayload,
};
use crate::crypto::{
    decode_base64, decrypt_with_aad, encode_base64, encrypt_with_aad, EncryptionResult, NONCE_SIZE,
};
use crate::error::{Error, Result};
use crate::protocol::{EncryptedProviderKeyUpdate, KeyRotationUpdate};

/// Provider name → secret, wiped on drop
pub type ProviderSecrets = BTreeMap<String, Zeroizing<String>>;

/// Seal every provider secret into a single payload for `recipient_key_id`
///
/// Rejects an empty mapping, empty provider names and empty secrets.
pub fn package_provider_keys<V: AsRef<str>>(
    secrets: &BTreeMap<String, V>,
    recipient_public_key: &ExchangePublicKey,
    sender_private_key: &ExchangePrivateKey,
    recipient_key_id: &str,
) -> Result<SealedPayload> {
    validate_secrets(secrets)?;

    let bundle: BTreeMap<&str, &str> = secrets
        .iter()
        .map(|(provider, secret)| (provider.as_str(), secret.as_ref()))
        .collect();
    let serialized = Zeroizing::new(serde_json::to_vec(&bundle)?);

    let payload = seal_message(
        &serialized,
        recipient_public_key,
        sender_private_key,
        recipient_key_id,
    )?;
    tracing::debug!(
        providers = secrets.len(),
        recipient_key_id,
        "Packaged provider keys"
    );
    Ok(payload)
}

/// Open a payload produced by [`package_provider_keys`]
pub fn unpack_provider_keys(
    payload: &SealedPayload,
    recipient_private_key: &ExchangePrivateKey,
    sender_public_key: &ExchangePublicKey,
) -> Result<ProviderSecrets> {
    let serialized = open_message(payload, recipient_private_key, sender_public_key)?;
    let bundle: BTreeMap<String, String> = serde_json::from_slice(&serialized)
        .map_err(|_| Error::InvalidEnvelope("provider key bundle is malformed".into()))?;

    Ok(bundle
        .into_iter()
        .map(|(provider, secret)| (provider, Zeroizing::new(secret)))
        .collect())
}

/// Encrypt each changed provider secret for an established session
pub fn package_key_updates<V: AsRef<str>>(
    secrets: &BTreeMap<String, V>,
    recipient_public_key: &ExchangePublicKey,
    sender_private_key: &ExchangePrivateKey,
) -> Result<KeyRotationUpdate> {
    validate_secrets(secrets)?;
    let session_key = derive_shared_secret(sender_private_key, recipient_public_key)?;

    let encrypted_provider_keys = secrets
        .iter()
        .map(|(provider, secret)| {
            let sealed = encrypt_with_aad(
                &session_key,
                secret.as_ref().as_bytes(),
                provider.as_bytes(),
                None,
            )?;
            Ok(EncryptedProviderKeyUpdate {
                provider: provider.clone(),
                encrypted_key: encode_base64(&sealed.to_combined()),
                nonce: sealed.nonce_base64(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(KeyRotationUpdate {
        encrypted_provider_keys,
    })
}

/// Decrypt a [`KeyRotationUpdate`]
///
/// Fails with `DecryptionFailed` if any entry was tampered with, including
/// one whose provider name was changed.
pub fn unpack_key_updates(
    update: &KeyRotationUpdate,
    recipient_private_key: &ExchangePrivateKey,
    sender_public_key: &ExchangePublicKey,
) -> Result<ProviderSecrets> {
    let session_key = derive_shared_secret(recipient_private_key, sender_public_key)?;
    let mut secrets = ProviderSecrets::new();

    for entry in &update.encrypted_provider_keys {
        let combined = decode_base64(&entry.encrypted_key)
            .map_err(|_| Error::InvalidEnvelope("encryptedKey is not valid base64".into()))?;
        let nonce: [u8; NONCE_SIZE] = decode_base64(&entry.nonce)
            .map_err(|_| Error::InvalidEnvelope("nonce is not valid base64".into()))?
            .try_into()
            .map_err(|_| Error::DecryptionFailed)?;

        let sealed = EncryptionResult::from_combined(combined, nonce)?;
        let plaintext = Zeroizing::new(decrypt_with_aad(
            &session_key,
            &sealed,
            entry.provider.as_bytes(),
        )?);
        let secret = std::str::from_utf8(&plaintext).map_err(|_| Error::DecryptionFailed)?;

        if secrets
            .insert(entry.provider.clone(), Zeroizing::new(secret.to_string()))
            .is_some()
        {
            return Err(Error::InvalidEnvelope(format!(
                "duplicate update for provider {}",
                entry.provider
            )));
        }
    }

    Ok(secrets)
}

fn validate_secrets<V: AsRef<str>>(secrets: &BTreeMap<String, V>) -> Result<()> {
    if secrets.is_empty() {
        return Err(Error::InvalidInput("no provider keys to deliver".into()));
    }
    for (provider, secret) in secrets {
        if provider.trim().is_empty() {
            return Err(Error::InvalidInput("provider name must not be empty".into()));
        }
        if secret.as_ref().is_empty() {
            return Err(Error::InvalidInput(format!(
                "secret for provider {} is empty",
                provider
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::generate_ephemeral_key_pair;

    fn secrets() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("anthropic".to_string(), "sk-ant-REDACTED".to_string()),
            ("openai".to_string(), "sk-abcdefghijklmnopqrstuvwxyz123456".to_string()),
        ])
    }

    fn plain(unpacked: &ProviderSecrets) -> BTreeMap<String, String> {
        unpacked
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().to_string()))
            .collect()
    }

    #[test]
    fn test_package_and_unpack() {
        let orchestrator = generate_ephemeral_key_pair();
        let sidecar = generate_ephemeral_key_pair();

        let payload = package_provider_keys(
            &secrets(),
            sidecar.public_key(),
            orchestrator.private_key(),
            sidecar.key_id(),
        )
        .unwrap();
        assert!(!payload.ciphertext.contains("sk-"));

        let unpacked =
            unpack_provider_keys(&payload, sidecar.private_key(), orchestrator.public_key())
                .unwrap();
        assert_eq!(plain(&unpacked), secrets());
    }

    #[test]
    fn test_unpack_tampered_fails() {
        let orchestrator = generate_ephemeral_key_pair();
        let sidecar = generate_ephemeral_key_pair();
        let payload = package_provider_keys(
            &secrets(),
            sidecar.public_key(),
            orchestrator.private_key(),
            sidecar.key_id(),
        )
        .unwrap();

        let mut bytes = decode_base64(&payload.tag).unwrap();
        bytes[15] ^= 0xFF;
        let tampered = SealedPayload {
            tag: encode_base64(&bytes),
            ..payload
        };
        assert!(matches!(
            unpack_provider_keys(&tampered, sidecar.private_key(), orchestrator.public_key()),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_package_rejects_bad_input() {
        let orchestrator = generate_ephemeral_key_pair();
        let sidecar = generate_ephemeral_key_pair();
        let package = |m: &BTreeMap<String, String>| {
            package_provider_keys(
                m,
                sidecar.public_key(),
                orchestrator.private_key(),
                sidecar.key_id(),
            )
        };

        assert!(matches!(package(&BTreeMap::new()), Err(Error::InvalidInput(_))));
        assert!(package(&BTreeMap::from([(" ".to_string(), "sk-x".to_string())])).is_err());
        assert!(package(&BTreeMap::from([("openai".to_string(), String::new())])).is_err());
    }

    #[test]
    fn test_key_updates_round_trip() {
        let orchestrator = generate_ephemeral_key_pair();
        let sidecar = generate_ephemeral_key_pair();

        let update =
            package_key_updates(&secrets(), sidecar.public_key(), orchestrator.private_key())
                .unwrap();
        assert_eq!(update.encrypted_provider_keys.len(), 2);
        assert_eq!(update.encrypted_provider_keys[0].provider, "anthropic");

        let unpacked =
            unpack_key_updates(&update, sidecar.private_key(), orchestrator.public_key()).unwrap();
        assert_eq!(plain(&unpacked), secrets());
    }

    #[test]
    fn test_key_update_provider_swap_fails() {
        let orchestrator = generate_ephemeral_key_pair();
        let sidecar = generate_ephemeral_key_pair();

        let mut update =
            package_key_updates(&secrets(), sidecar.public_key(), orchestrator.private_key())
                .unwrap();
        update.encrypted_provider_keys[0].provider = "openai-evil".into();

        assert!(matches!(
            unpack_key_updates(&update, sidecar.private_key(), orchestrator.public_key()),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_key_update_duplicate_rejected() {
        let orchestrator = generate_ephemeral_key_pair();
        let sidecar = generate_ephemeral_key_pair();

        let mut update =
            package_key_updates(&secrets(), sidecar.public_key(), orchestrator.private_key())
                .unwrap();
        let first = update.encrypted_provider_keys[0].clone();
        update.encrypted_provider_keys.push(first);

        assert!(matches!(
            unpack_key_updates(&update, sidecar.private_key(), orchestrator.public_key()),
            Err(Error::InvalidEnvelope(_))
        ));
    }
}
