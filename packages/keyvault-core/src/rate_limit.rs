//! # Rate Limiting
//!
//! Fixed-window attempt counting keyed by an operation identifier
//! (e.g. `"encrypt_provider_key"`).
//!
//! ```text
//!  window 1 (count 1..=max allowed)        window 2
//! ├────────────────────────────────────┤├──────────────────────
//!  ✓ ✓ ✓ ... ✓ (max)  ✗ ✗ ✗            ✓ ...
//!  ▲                                    ▲
//!  first call: record created,          now > reset_at: record
//!  reset_at = now + window              replaced, count = 1
//! ```
//!
//! Denial happens on exactly the `(max + 1)`-th call in a window. The
//! check-and-increment runs under one lock, so concurrent callers can
//! never both take the last slot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Default attempts allowed per window
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Default window length (1 minute)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Attempts allowed per identifier per window
    pub max_attempts: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Per-identifier window state
#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a single [`RateLimiter::check_limit`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether this attempt is allowed
    pub allowed: bool,
    /// Attempts left in the current window after this one
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: Instant,
}

impl RateLimitDecision {
    /// Time until the window resets, measured from `now`
    pub fn retry_after(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

/// Fixed-window rate limiter shared by all callers of an operation
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    /// Create a limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// The limiter's configuration
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one attempt for `id` at the current instant
    pub fn check_limit(&self, id: &str) -> RateLimitDecision {
        self.check_limit_at(id, Instant::now())
    }

    /// Count one attempt for `id` at `now`
    pub fn check_limit_at(&self, id: &str, now: Instant) -> RateLimitDecision {
        let max = self.config.max_attempts;
        let mut records = self.records.lock();

        match records.get_mut(id) {
            Some(record) if now <= record.reset_at => {
                if record.count < max {
                    record.count += 1;
                    RateLimitDecision {
                        allowed: true,
                        remaining: max - record.count,
                        reset_at: record.reset_at,
                    }
                } else {
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: record.reset_at,
                    }
                }
            }
            _ => {
                let record = RateLimitRecord {
                    count: 1,
                    reset_at: now + self.config.window,
                };
                records.insert(id.to_string(), record);
                RateLimitDecision {
                    allowed: true,
                    remaining: max.saturating_sub(1),
                    reset_at: record.reset_at,
                }
            }
        }
    }

    /// Count one attempt and turn a denial into `RateLimitExceeded`
    pub fn enforce(&self, id: &str) -> Result<()> {
        let now = Instant::now();
        let decision = self.check_limit_at(id, now);
        if decision.allowed {
            return Ok(());
        }

        let retry_after_ms = decision.retry_after(now).as_millis() as u64;
        tracing::warn!(operation = id, retry_after_ms, "Rate limit exceeded");
        Err(Error::RateLimitExceeded {
            operation: id.to_string(),
            retry_after_ms,
        })
    }

    /// Attempts left for `id` in its current window
    pub fn remaining(&self, id: &str) -> u32 {
        self.remaining_at(id, Instant::now())
    }

    fn remaining_at(&self, id: &str, now: Instant) -> u32 {
        match self.records.lock().get(id) {
            Some(record) if now <= record.reset_at => {
                self.config.max_attempts.saturating_sub(record.count)
            }
            _ => self.config.max_attempts,
        }
    }

    /// Clear state for `id` (tests / administrative reset)
    pub fn reset(&self, id: &str) {
        self.records.lock().remove(id);
    }

    /// Drop every record whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| now <= record.reset_at);
        before - records.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
