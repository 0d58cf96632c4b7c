//! # Envelope Encryption Demo
//!
//! Encrypts a provider API key at rest, decrypts it, rotates it to a new
//! key version and shows tamper detection.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=keyvault_core=debug cargo run --example envelope_demo
//! ```

use std::sync::Arc;

use keyvault_core::crypto::encode_base64;
use keyvault_core::{
    AuditLog, EnvMasterKeyProvider, EnvelopeEncryption, MasterKeyManager, RateLimiter,
};

#[tokio::main]
async fn main() -> keyvault_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyvault_core=info".into()),
        )
        .init();

    println!("=== KeyVault Core: Envelope Encryption Demo ===\n");

    // Step 1: Master key manager
    println!("Step 1: Loading master key (demo key, never use in production)...");
    let provider = EnvMasterKeyProvider::with_secret(encode_base64(&[7u8; 32]), "demo-master-key");
    let manager = MasterKeyManager::new(provider, 1)?;
    let envelope = EnvelopeEncryption::new(
        Arc::new(manager),
        Arc::new(RateLimiter::default()),
        Arc::new(AuditLog::new(100)),
    );
    println!("  Master key id:   {}", envelope.master_key_id());
    println!("  Active version:  {}", envelope.current_key_version());
    println!();

    // Step 2: Encrypt
    println!("Step 2: Encrypting provider key...");
    println!();
    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                    ENVELOPE LAYOUT                          │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │   provider key ──AES-GCM(DEK)──► encryptedKey, nonce, tag   │");
    println!("  │                                                             │");
    println!("  │   DEK ──AES-GCM(KEK)──► encryptedDataKey, dataKeyNonce,     │");
    println!("  │                         dataKeyTag                          │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    let secret = "sk-ant-REDACTED";
    let stored = envelope.encrypt_provider_key(secret).await?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    println!();

    // Step 3: Decrypt
    println!("Step 3: Decrypting...");
    let decrypted = envelope.decrypt_provider_key(&stored).await?;
    println!("  Round trip matches: {}", decrypted.as_str() == secret);
    println!();

    // Step 4: Tamper detection
    println!("Step 4: Tampering with the tag...");
    let mut tampered = stored.clone();
    tampered.tag = encode_base64(&[0u8; 16]);
    match envelope.decrypt_provider_key(&tampered).await {
        Ok(_) => println!("  Unexpected: tampered record decrypted"),
        Err(e) => println!("  Rejected: {}", e),
    }
    println!();

    // Step 5: Rotation
    println!("Step 5: Rotating to key version 2...");
    let rotated = envelope.rotate_key(&stored, Some(2)).await?;
    envelope.key_manager().set_key_version(2)?;
    println!("  New keyVersion:  {}", rotated.key_version);
    println!(
        "  Rotated decrypts: {}",
        envelope.decrypt_provider_key(&rotated).await?.as_str() == secret
    );
    match envelope.decrypt_provider_key(&stored).await {
        Ok(_) => println!("  Unexpected: version 1 record still decrypts"),
        Err(e) => println!("  Version 1 record: {}", e),
    }
    println!();

    // Step 6: Audit trail
    println!("Step 6: Audit log (no secret material)...");
    for entry in envelope.audit_log().entries() {
        println!(
            "  {} {:<22} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.operation,
            if entry.success { "ok" } else { "FAILED" }
        );
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
