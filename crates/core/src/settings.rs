//! Explicit configuration passed into create and save operations.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Source of the current time for document timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone)]
pub struct Settings {
    clock: Arc<dyn Clock>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current time in the W3CDTF form used by document properties.
    pub fn timestamp(&self) -> String {
        self.now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings").field("now", &self.now()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap();
        let settings = Settings::with_clock(FixedClock(at));
        assert_eq!(settings.now(), at);
        assert_eq!(settings.timestamp(), "2024-03-05T08:30:00Z");
    }
}
