//! Resolver timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall-clock budgets for the two location stages. The resolver's total
/// budget is the sum; neither stage may run past its own deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_gps_timeout_ms")]
    pub gps_timeout_ms: u64,
    #[serde(default = "default_ip_timeout_ms")]
    pub ip_timeout_ms: u64,
}

fn default_gps_timeout_ms() -> u64 {
    4_000
}

fn default_ip_timeout_ms() -> u64 {
    3_000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            gps_timeout_ms: default_gps_timeout_ms(),
            ip_timeout_ms: default_ip_timeout_ms(),
        }
    }
}

impl ResolverConfig {
    pub fn gps_timeout(&self) -> Duration {
        Duration::from_millis(self.gps_timeout_ms)
    }

    pub fn ip_timeout(&self) -> Duration {
        Duration::from_millis(self.ip_timeout_ms)
    }

    /// Upper bound on a full resolve pass.
    pub fn total_budget(&self) -> Duration {
        self.gps_timeout() + self.ip_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_budgets() {
        let config = ResolverConfig::default();
        assert_eq!(config.gps_timeout(), Duration::from_millis(4000));
        assert_eq!(config.ip_timeout(), Duration::from_millis(3000));
        assert_eq!(config.total_budget(), Duration::from_millis(7000));
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: ResolverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ResolverConfig::default());
    }
}
