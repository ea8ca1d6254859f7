//! Resolver configuration, loadable from TOML.
//!
//! ```toml
//! max_range_days = 31
//! now_skew_minutes = 5
//! retry_backoff_ms = 250
//! dst_policy = "skip"
//! ```

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{BookingError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Longest query range accepted, in days.
    pub max_range_days: u32,
    /// Slots that started up to this many minutes ago are still offered.
    pub now_skew_minutes: u32,
    /// Wait before retrying a failed confirmation write.
    pub retry_backoff_ms: u64,
    pub dst_policy: DstPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_range_days: 62,
            now_skew_minutes: 0,
            retry_backoff_ms: 100,
            dst_policy: DstPolicy::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ResolverConfig =
            toml::from_str(text).map_err(|e| BookingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BookingError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_range_days == 0 {
            return Err(BookingError::InvalidConfig(
                "max_range_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_range(&self) -> Duration {
        Duration::days(self.max_range_days as i64)
    }

    pub fn now_skew(&self) -> Duration {
        Duration::minutes(self.now_skew_minutes as i64)
    }

    pub fn retry_backoff(&self) -> StdDuration {
        StdDuration::from_millis(self.retry_backoff_ms)
    }
}
