//! Wall-clock helpers.
//!
//! Audit timestamps use UTC wall-clock time; rate-limit windows use
//! `std::time::Instant` and never go through this module.

use chrono::{DateTime, Utc};

/// Returns the current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
