//! Configuration Module
//!
//! Handles loading cache limits and harness settings from environment variables.

use std::env;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time since last access before an entry is swept, 0 = disabled
    pub age_limit_secs: u64,
    /// Total cost budget, 0 = unlimited
    pub cost_limit: u64,
    /// How often the harness binary logs a stats report, in seconds
    pub report_interval_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_AGE_LIMIT_SECS` - Age limit in seconds (default: 0, disabled)
    /// - `CACHE_COST_LIMIT` - Total cost budget (default: 0, unlimited)
    /// - `REPORT_INTERVAL_SECS` - Stats report frequency in seconds (default: 5)
    pub fn from_env() -> Self {
        Self {
            age_limit_secs: env::var("CACHE_AGE_LIMIT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            cost_limit: env::var("CACHE_COST_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            report_interval_secs: env::var("REPORT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }

    /// The age limit as a `Duration`.
    pub fn age_limit(&self) -> Duration {
        Duration::from_secs(self.age_limit_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            age_limit_secs: 0,
            cost_limit: 0,
            report_interval_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.age_limit_secs, 0);
        assert_eq!(config.cost_limit, 0);
        assert_eq!(config.report_interval_secs, 5);
        assert_eq!(config.age_limit(), Duration::ZERO);
    }

    #[test]
    fn test_config_from_env() {
        // Single test touches the env so parallel tests don't race on it
        env::remove_var("CACHE_AGE_LIMIT_SECS");
        env::remove_var("CACHE_COST_LIMIT");
        env::remove_var("REPORT_INTERVAL_SECS");

        let config = Config::from_env();
        assert_eq!(config.age_limit_secs, 0);
        assert_eq!(config.cost_limit, 0);
        assert_eq!(config.report_interval_secs, 5);

        env::set_var("CACHE_AGE_LIMIT_SECS", "30");
        env::set_var("CACHE_COST_LIMIT", "not-a-number");

        let config = Config::from_env();
        assert_eq!(config.age_limit(), Duration::from_secs(30));
        assert_eq!(config.cost_limit, 0);

        env::remove_var("CACHE_AGE_LIMIT_SECS");
        env::remove_var("CACHE_COST_LIMIT");
    }
}
