//! Configuration for the payment engine

use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Poll cadence for an actively watched request (seconds)
    pub poll_interval_secs: u64,

    /// Cadence of the background expiry sweep (seconds)
    pub sweep_interval_secs: u64,

    /// Page size for the seller directory
    pub seller_page_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            sweep_interval_secs: 30,
            seller_page_size: 50,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("failed to read config: {e}")))?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load defaults, overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();

        if let Some(secs) = env_u64("PAYFLOW_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = env_u64("PAYFLOW_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = secs;
        }
        if let Some(size) = env_u64("PAYFLOW_SELLER_PAGE_SIZE") {
            config.seller_page_size = size;
        }

        config
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.poll_interval(), std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_config_from_toml() {
        let config: EngineConfig = toml::from_str(
            "poll_interval_secs = 5\nsweep_interval_secs = 15\nseller_page_size = 20\n",
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.seller_page_size, 20);
    }
}
