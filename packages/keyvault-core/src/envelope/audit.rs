//! In-memory audit log for envelope operations.
//!
//! A bounded ring buffer: when full, the oldest entry is evicted. Entries
//! record the operation name, outcome and non-secret metadata only. Every
//! append is mirrored to `tracing` (debug on success, warn on failure).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_AUDIT_CAPACITY;

/// One audited operation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Operation name, e.g. `encrypt_provider_key`
    pub operation: String,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Error description on failure (never contains secret material)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Key version, master key id and similar context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Append-only, capacity-bounded audit log
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
}

impl AuditLog {
    /// Create a log holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_AUDIT_CAPACITY))),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&self, entry: AuditLogEntry) {
        if entry.success {
            tracing::debug!(operation = %entry.operation, "Audit: success");
        } else {
            tracing::warn!(
                operation = %entry.operation,
                error = entry.error.as_deref().unwrap_or("unknown"),
                "Audit: failure"
            );
        }

        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Record a successful attempt
    pub fn record_success(&self, operation: &str, metadata: Option<Value>) {
        self.append(AuditLogEntry {
            timestamp: crate::time::now(),
            operation: operation.to_string(),
            success: true,
            error: None,
            metadata,
        });
    }

    /// Record a failed attempt
    pub fn record_failure(&self, operation: &str, error: &str, metadata: Option<Value>) {
        self.append(AuditLogEntry {
            timestamp: crate::time::now(),
            operation: operation.to_string(),
            success: false,
            error: Some(error.to_string()),
            metadata,
        });
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// The `n` most recent entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<AuditLogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Maximum number of entries held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_oldest_entry_evicted_first() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.record_success(&format!("op-{}", i), None);
        }

        let ops: Vec<String> = log.entries().into_iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec!["op-2", "op-3", "op-4"]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.capacity(), 3);
    }

    #[test]
    fn test_recent() {
        let log = AuditLog::new(10);
        log.record_success("a", None);
        log.record_failure("b", "Decryption failed", None);
        log.record_success("c", None);

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, "b");
        assert!(!recent[0].success);
        assert_eq!(recent[1].operation, "c");

        assert_eq!(log.recent(100).len(), 3);
    }

    #[test]
    fn test_clear() {
        let log = AuditLog::default();
        log.record_success("a", None);
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let log = AuditLog::new(0);
        log.record_success("a", None);
        log.record_success("b", None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_entry_json_shape() {
        let log = AuditLog::new(4);
        log.record_failure(
            "decrypt_provider_key",
            "Unsupported algorithm: key version 2",
            Some(json!({ "keyVersion": 2 })),
        );
        log.record_success("encrypt_provider_key", None);

        let entries = log.entries();
        let failure = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(failure["operation"], "decrypt_provider_key");
        assert_eq!(failure["success"], false);
        assert_eq!(failure["metadata"]["keyVersion"], 2);
        assert!(failure["timestamp"].as_str().unwrap().contains('T'));

        let success = serde_json::to_value(&entries[1]).unwrap();
        assert!(success.get("error").is_none());
        assert!(success.get("metadata").is_none());

        let parsed: AuditLogEntry = serde_json::from_value(failure).unwrap();
        assert_eq!(parsed, entries[0]);
    }
}
