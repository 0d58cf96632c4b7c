//! # Sidecar Handshake Demo
//!
//! Walks through sidecar registration: the sidecar sends its ephemeral
//! public key, the orchestrator answers with provider keys sealed to it,
//! and later pushes a rotation update over the same session.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example handshake_demo
//! ```

use std::collections::BTreeMap;

use keyvault_core::{OrchestratorHandshake, SidecarHandshake};

fn main() -> keyvault_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyvault_core=info".into()),
        )
        .init();

    println!("=== KeyVault Core: Sidecar Handshake Demo ===\n");

    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                  REGISTRATION HANDSHAKE                     │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │   Sidecar                            Orchestrator           │");
    println!("  │     │                                    │                  │");
    println!("  │     │── sessionId, token, publicKey ────►│                  │");
    println!("  │     │                                    │                  │");
    println!("  │     │◄── authToken, orchestratorKey, ────│                  │");
    println!("  │     │    encryptedProviderKeys           │                  │");
    println!("  │     ▼                                    ▼                  │");
    println!("  │  X25519(sidecar, orchestrator) → HKDF → AES-256-GCM         │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    // Step 1: Sidecar registers
    println!("Step 1: Sidecar generates an ephemeral key pair...");
    let mut sidecar = SidecarHandshake::new();
    let request = sidecar.registration_request("session-7f3a", "one-time-registration-token");
    println!("  Sidecar key id: {}", request.key_id);
    println!("  Request: {}", serde_json::to_string(&request)?);
    println!();

    // Step 2: Orchestrator responds
    println!("Step 2: Orchestrator seals provider keys to the sidecar...");
    let orchestrator = OrchestratorHandshake::accept(&request)?;
    let secrets = BTreeMap::from([
        ("anthropic".to_string(), "sk-ant-REDACTED".to_string()),
        ("openai".to_string(), "sk-abcdefghijklmnopqrstuvwxyz123456".to_string()),
    ]);
    let response = orchestrator.respond(&secrets, "sidecar-auth-token", 4096)?;
    println!("  Orchestrator key id: {}", response.orchestrator_key_id);
    println!(
        "  Sealed payload: {}",
        serde_json::to_string_pretty(&response.encrypted_provider_keys)?
    );
    println!();

    // Step 3: Sidecar unpacks
    println!("Step 3: Sidecar opens the payload...");
    let delivered = sidecar.complete(&response)?;
    for (provider, secret) in &delivered {
        println!("  {:<10} {}… ({} chars)", provider, &secret[..6], secret.len());
    }
    println!();

    // Step 4: Rotation update
    println!("Step 4: Orchestrator pushes a rotated key...");
    let rotated = BTreeMap::from([(
        "anthropic".to_string(),
        "sk-ant-REDACTED".to_string(),
    )]);
    let update = orchestrator.key_update(&rotated)?;
    println!("  Update: {}", serde_json::to_string(&update)?);
    let applied = sidecar.apply_key_update(&update)?;
    println!(
        "  Sidecar received new anthropic key: {}",
        applied["anthropic"].as_str() == rotated["anthropic"]
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
