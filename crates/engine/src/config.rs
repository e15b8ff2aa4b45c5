//! Engine configuration, loadable from a `ckg.toml` at the repository root.
//! Every knob has a default; a missing file means defaults throughout.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "ckg.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub cluster: ClusterConfig,
    pub process: ProcessConfig,
    pub impact: ImpactConfig,
    pub debounce: DebounceConfig,
    pub derivation: DerivationConfig,
}

impl EngineConfig {
    /// Load `ckg.toml` from `repo_root`, falling back to defaults when the
    /// file does not exist.
    pub fn load(repo_root: &Path) -> Result<Self, EngineError> {
        let config_path = repo_root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&config_path)?;
        toml::from_str(&raw).map_err(|e| {
            EngineError::Config(format!("{}: {e}", config_path.display()))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Communities smaller than this are discarded.
    pub min_cluster_size: usize,
    /// Seed for the deterministic visit-order shuffle. Identical graph and
    /// seed must reproduce identical membership.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    pub max_trace_depth: usize,
    /// Outgoing CALLS edges followed per node, highest confidence first.
    pub max_branching: usize,
    pub max_processes: usize,
    /// Chains shorter than this many steps are discarded.
    pub min_steps: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            max_trace_depth: 10,
            max_branching: 3,
            max_processes: 100,
            min_steps: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImpactConfig {
    pub max_depth: usize,
    /// Paths whose accumulated confidence product falls below this are
    /// pruned.
    pub min_confidence: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebounceConfig {
    /// Writes within this window count toward the burst threshold.
    pub window_ms: u64,
    /// This many writes inside the window switches to quiet-period mode.
    pub burst_threshold: usize,
    /// How long the stream must stay quiet before one consolidated update
    /// runs.
    pub quiet_period_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_ms: 2_000,
            burst_threshold: 3,
            quiet_period_ms: 2_000,
        }
    }
}

impl DebounceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DerivationConfig {
    /// Wall-clock budget for one cluster+process pass. A pass over budget
    /// aborts before writing.
    pub budget_ms: u64,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self { budget_ms: 30_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cluster.min_cluster_size, 3);
        assert_eq!(config.impact.max_depth, 3);
        assert_eq!(config.impact.min_confidence, 0.7);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[process]\nmin_steps = 5\n\n[cluster]\nseed = 7\n",
        )
        .unwrap();

        let config = EngineConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.process.min_steps, 5);
        assert_eq!(config.cluster.seed, 7);
        assert_eq!(config.process.max_branching, 3);
        assert_eq!(config.debounce.burst_threshold, 3);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "not = [valid").unwrap();
        let err = EngineConfig::load(temp_dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
