//! Time helpers for Sarafi.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SarafiError};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// A half-open reporting window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl DateRange {
    /// Create a range, rejecting one whose end precedes its start.
    pub fn new(from: Timestamp, to: Timestamp) -> Result<Self> {
        if to < from {
            return Err(SarafiError::invalid_field(
                "to",
                format!("range end {} is before start {}", to, from),
            ));
        }
        Ok(Self { from, to })
    }

    /// Check whether a timestamp falls inside the range.
    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.from && at < self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_range_is_half_open() {
        let from = now();
        let to = from + Duration::hours(1);
        let range = DateRange::new(from, to).unwrap();

        assert!(range.contains(from));
        assert!(range.contains(from + Duration::minutes(30)));
        assert!(!range.contains(to));
        assert!(!range.contains(from - Duration::seconds(1)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let from = now();
        let result = DateRange::new(from, from - Duration::days(1));
        assert!(matches!(result, Err(SarafiError::Validation { .. })));
    }
}
