//! Cluster configuration.
//!
//! All durations are logical ticks of the simulated clock, never wall-clock
//! time. Every section falls back to its defaults, so a partial JSON file
//! (or none at all) is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of random peers gossiped to on every tick.
pub const GOSSIP_FANOUT: usize = 2;

/// Top-level configuration shared by the driver, the nodes and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    pub membership: MembershipConfig,
    pub replication: ReplicationConfig,
    pub network: NetworkConfig,
    pub simulation: SimulationConfig,
}

/// Failure-detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Ticks of silence after which a peer is left out of gossip fan-out.
    pub suspect_after: u64,
    /// Ticks of silence after which a peer is purged from the table.
    pub remove_after: u64,
    /// Peers gossiped to per tick. Informational: the policy is fixed.
    #[serde(skip_deserializing, default = "default_fanout")]
    pub gossip_fanout: usize,
}

const fn default_fanout() -> usize {
    GOSSIP_FANOUT
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            suspect_after: 5,
            remove_after: 20,
            gossip_fanout: default_fanout(),
        }
    }
}

/// Quorum bookkeeping parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Ticks a transaction may stay open before it is declared failed.
    pub rtt: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self { rtt: 5 }
    }
}

/// Behavior of the emulated network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Probability in `[0, 1]` that a message is silently lost.
    pub drop_rate: f64,
    /// Probability in `[0, 1]` that a delivered message arrives twice.
    pub duplicate_rate: f64,
    /// Extra delivery delay, uniformly drawn from `0..=max_delay` ticks.
    pub max_delay: u64,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            max_delay: 0,
            seed: 7,
        }
    }
}

/// Shape of the simulated cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub nodes: usize,
    /// Ticks between successive node bootstraps.
    pub join_interval: u64,
    /// Seed for per-node gossip target selection.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            join_interval: 1,
            seed: 42,
        }
    }
}

impl ClusterConfig {
    /// Reads a JSON config file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ClusterConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.membership;
        if m.suspect_after == 0 {
            return Err(ConfigError::Invalid("suspect_after must be positive".into()));
        }
        if m.suspect_after >= m.remove_after {
            return Err(ConfigError::Invalid(format!(
                "suspect_after ({}) must be lower than remove_after ({})",
                m.suspect_after, m.remove_after
            )));
        }
        if self.replication.rtt == 0 {
            return Err(ConfigError::Invalid("rtt must be positive".into()));
        }
        for (name, rate) in [
            ("drop_rate", self.network.drop_rate),
            ("duplicate_rate", self.network.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        if self.simulation.nodes == 0 {
            return Err(ConfigError::Invalid("simulation needs at least one node".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.membership.gossip_fanout, 2);
        assert_eq!(config.replication.rtt, 5);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: ClusterConfig =
            serde_json::from_str(r#"{"membership": {"remove_after": 30}}"#).unwrap();

        assert_eq!(config.membership.remove_after, 30);
        assert_eq!(config.membership.suspect_after, 5);
        assert_eq!(config.membership.gossip_fanout, GOSSIP_FANOUT);
        assert_eq!(config.simulation.nodes, 10);
    }

    #[test]
    fn test_suspect_must_precede_remove() {
        let mut config = ClusterConfig::default();
        config.membership.suspect_after = 20;
        config.membership.remove_after = 20;

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rates_are_bounded() {
        let mut config = ClusterConfig::default();
        config.network.drop_rate = 1.5;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let result = ClusterConfig::from_file("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
