//! Vault configuration.
//!
//! Master key source, key version, rate limiting and audit settings loaded
//! from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rate_limit::RateLimitConfig;

/// Default name of the variable holding the master key
pub const DEFAULT_MASTER_KEY_ENV: &str = "MASTER_ENCRYPTION_KEY";

/// Default master key id
pub const DEFAULT_MASTER_KEY_ID: &str = "env-master-key-v1";

/// Default number of audit entries kept in memory
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

/// Vault configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Name of the environment variable holding the master key (KEK).
    pub master_key_env: String,
    /// Stable identifier of the master key, stamped on every envelope.
    pub master_key_id: String,
    /// Active key version (>= 1).
    pub key_version: u32,
    /// Attempts allowed per operation per rate-limit window.
    pub rate_limit_max_attempts: u32,
    /// Rate-limit window length.
    pub rate_limit_window: Duration,
    /// Audit log ring-buffer capacity.
    pub audit_log_capacity: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let rate_limit = RateLimitConfig::default();
        Self {
            master_key_env: DEFAULT_MASTER_KEY_ENV.to_string(),
            master_key_id: DEFAULT_MASTER_KEY_ID.to_string(),
            key_version: 1,
            rate_limit_max_attempts: rate_limit.max_attempts,
            rate_limit_window: rate_limit.window,
            audit_log_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `MASTER_KEY_ID` | `master_key_id` |
    /// | `MASTER_KEY_VERSION` | `key_version` |
    /// | `KEYVAULT_RATE_LIMIT_MAX` | `rate_limit_max_attempts` |
    /// | `KEYVAULT_RATE_LIMIT_WINDOW_SECS` | `rate_limit_window` |
    /// | `KEYVAULT_AUDIT_CAPACITY` | `audit_log_capacity` |
    ///
    /// The master key itself is not read here; the provider reads
    /// `master_key_env` lazily on first use.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            master_key_env: defaults.master_key_env,
            master_key_id: lookup("MASTER_KEY_ID")
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(defaults.master_key_id),
            key_version: parse_var(&lookup, "MASTER_KEY_VERSION")?.unwrap_or(defaults.key_version),
            rate_limit_max_attempts: parse_var(&lookup, "KEYVAULT_RATE_LIMIT_MAX")?
                .unwrap_or(defaults.rate_limit_max_attempts),
            rate_limit_window: parse_var::<u64, _>(&lookup, "KEYVAULT_RATE_LIMIT_WINDOW_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            audit_log_capacity: parse_var(&lookup, "KEYVAULT_AUDIT_CAPACITY")?
                .unwrap_or(defaults.audit_log_capacity),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject zero or empty values.
    pub fn validate(&self) -> Result<()> {
        if self.master_key_env.trim().is_empty() {
            return Err(Error::Configuration("master key variable name is empty".into()));
        }
        if self.master_key_id.trim().is_empty() {
            return Err(Error::Configuration("master key id is empty".into()));
        }
        if self.key_version == 0 {
            return Err(Error::Configuration("key version must be at least 1".into()));
        }
        if self.rate_limit_max_attempts == 0 {
            return Err(Error::Configuration(
                "rate limit max attempts must be at least 1".into(),
            ));
        }
        if self.rate_limit_window.is_zero() {
            return Err(Error::Configuration("rate limit window must be non-zero".into()));
        }
        if self.audit_log_capacity == 0 {
            return Err(Error::Configuration("audit log capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Rate limiter settings.
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_attempts: self.rate_limit_max_attempts,
            window: self.rate_limit_window,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{} must be a non-negative integer", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = VaultConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.master_key_env, "MASTER_ENCRYPTION_KEY");
        assert_eq!(config.master_key_id, "env-master-key-v1");
        assert_eq!(config.key_version, 1);
        assert_eq!(config.rate_limit_max_attempts, 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.audit_log_capacity, 1000);
    }

    #[test]
    fn test_overrides() {
        let config = VaultConfig::from_lookup(lookup_from(&[
            ("MASTER_KEY_ID", "prod-kek"),
            ("MASTER_KEY_VERSION", "3"),
            ("KEYVAULT_RATE_LIMIT_MAX", " 10 "),
            ("KEYVAULT_RATE_LIMIT_WINDOW_SECS", "5"),
            ("KEYVAULT_AUDIT_CAPACITY", "50"),
        ]))
        .unwrap();

        assert_eq!(config.master_key_id, "prod-kek");
        assert_eq!(config.key_version, 3);
        assert_eq!(
            config.rate_limit(),
            RateLimitConfig {
                max_attempts: 10,
                window: Duration::from_secs(5),
            }
        );
        assert_eq!(config.audit_log_capacity, 50);
    }

    #[test]
    fn test_malformed_value_rejected() {
        let err = VaultConfig::from_lookup(lookup_from(&[("MASTER_KEY_VERSION", "two")]))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("MASTER_KEY_VERSION"));

        assert!(VaultConfig::from_lookup(lookup_from(&[("KEYVAULT_RATE_LIMIT_MAX", "-1")])).is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        for var in [
            "MASTER_KEY_VERSION",
            "KEYVAULT_RATE_LIMIT_MAX",
            "KEYVAULT_RATE_LIMIT_WINDOW_SECS",
            "KEYVAULT_AUDIT_CAPACITY",
        ] {
            let result = VaultConfig::from_lookup(lookup_from(&[(var, "0")]));
            assert!(
                matches!(result, Err(Error::Configuration(_))),
                "{} = 0 should be rejected",
                var
            );
        }
    }

    #[test]
    fn test_blank_key_id_falls_back_to_default() {
        let config = VaultConfig::from_lookup(lookup_from(&[("MASTER_KEY_ID", "  ")])).unwrap();
        assert_eq!(config.master_key_id, DEFAULT_MASTER_KEY_ID);
    }
}
