//! Configuration loading from mertune.toml.
//!
//! Every key is optional; missing keys keep their defaults and command-line
//! flags override whatever the file says.
//!
//! ## Example
//!
//! ```toml
//! seed = "mert"
//! starting-points = 5
//! strategy = "koehn"
//! threads = 4
//! metric = "bleu:4"
//! smoothing = "min"
//! smoothing-window = 1
//! generative-features = ["LM", "WordPenalty"]
//!
//! [mcmc]
//! enabled = false
//! batch-size = 10
//! c = 100.0
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::error::{Result, TuneError};
use crate::search::{LineSearchConfig, McmcConfig, OptimizerStrategy, Smoothing};

/// File name looked up in the working directory and its ancestors.
pub const CONFIG_FILE: &str = "mertune.toml";

/// Tuner configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TuneConfig {
    /// Source file for this config (for display).
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// Base seed. An integer literal is used as-is, anything else is hashed.
    pub seed: String,

    /// Total number of starting points, including the supplied weight vectors.
    pub starting_points: usize,

    pub strategy: String,

    pub threads: usize,

    /// Weight file whose entries are held constant during search.
    pub fixed_weights: Option<PathBuf>,

    pub metric: String,

    pub smoothing: Smoothing,

    /// Half-width of the line-search smoothing window.
    pub smoothing_window: usize,

    pub min_plateau_gap: f64,

    /// A proposal must lower the objective by more than this to be accepted.
    pub min_objective_diff: f64,

    /// Patience of the random, better and mcmc strategies.
    pub no_progress_limit: usize,

    /// Hard cap on steps per starting point.
    pub max_iterations: usize,

    /// Drop main-list candidates the initial weights already rank above every companion candidate.
    pub filter_unreachable: bool,

    /// Local-vs-full eval gap under which the initial weights count as reusable.
    pub max_local_gap: f64,

    /// Features whose random starting values are drawn from `[0,1)` instead of `[-1,1)`.
    pub generative_features: Vec<String>,

    pub mcmc: McmcConfig,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            source: None,
            seed: "mert".to_string(),
            starting_points: 5,
            strategy: OptimizerStrategy::Koehn.name().to_string(),
            threads: 1,
            fixed_weights: None,
            metric: "bleu".to_string(),
            smoothing: Smoothing::Min,
            smoothing_window: 1,
            min_plateau_gap: 0.0,
            min_objective_diff: 1e-5,
            no_progress_limit: 20,
            max_iterations: 200,
            filter_unreachable: false,
            max_local_gap: 0.035,
            generative_features: Vec::new(),
            mcmc: McmcConfig::default(),
        }
    }
}

/// Raw config as deserialized from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    seed: Option<toml::Value>,
    starting_points: Option<usize>,
    strategy: Option<String>,
    threads: Option<usize>,
    fixed_weights: Option<PathBuf>,
    metric: Option<String>,
    smoothing: Option<Smoothing>,
    smoothing_window: Option<usize>,
    min_plateau_gap: Option<f64>,
    min_objective_diff: Option<f64>,
    no_progress_limit: Option<usize>,
    max_iterations: Option<usize>,
    filter_unreachable: Option<bool>,
    max_local_gap: Option<f64>,
    generative_features: Option<Vec<String>>,
    mcmc: Option<McmcConfig>,
}

impl TuneConfig {
    /// Load configuration for the given directory.
    ///
    /// Search order:
    /// 1. mertune.toml in directory
    /// 2. Walk up to find mertune.toml
    /// 3. Default config if nothing found
    ///
    /// A file that exists but does not parse is an error, not a fallback.
    pub fn load(directory: &Path) -> Result<Self> {
        let mut current = Some(directory);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Self::load_file(&candidate);
            }
            current = dir.parent();
        }
        Ok(Self::default())
    }

    /// Load an explicit config file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TuneError::io(path, e))?;
        Self::parse(&content, Some(path.to_path_buf()))
    }

    pub fn parse(content: &str, source: Option<PathBuf>) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| {
            let origin = source
                .as_ref()
                .map_or_else(|| "config".to_string(), |p| p.display().to_string());
            TuneError::InvalidConfig(format!("{}: {}", origin, e.message()))
        })?;
        Self::from_raw(raw, source)
    }

    fn from_raw(raw: RawConfig, source: Option<PathBuf>) -> Result<Self> {
        let defaults = Self::default();
        let seed = match raw.seed {
            None => defaults.seed,
            Some(toml::Value::String(s)) => s,
            Some(toml::Value::Integer(i)) => i.to_string(),
            Some(other) => {
                return Err(TuneError::InvalidConfig(format!(
                    "seed must be a string or an integer, got {}",
                    other.type_str()
                )));
            }
        };

        Ok(Self {
            source,
            seed,
            starting_points: raw.starting_points.unwrap_or(defaults.starting_points),
            strategy: raw.strategy.unwrap_or(defaults.strategy),
            threads: raw.threads.unwrap_or(defaults.threads),
            fixed_weights: raw.fixed_weights.or(defaults.fixed_weights),
            metric: raw.metric.unwrap_or(defaults.metric),
            smoothing: raw.smoothing.unwrap_or(defaults.smoothing),
            smoothing_window: raw.smoothing_window.unwrap_or(defaults.smoothing_window),
            min_plateau_gap: raw.min_plateau_gap.unwrap_or(defaults.min_plateau_gap),
            min_objective_diff: raw.min_objective_diff.unwrap_or(defaults.min_objective_diff),
            no_progress_limit: raw.no_progress_limit.unwrap_or(defaults.no_progress_limit),
            max_iterations: raw.max_iterations.unwrap_or(defaults.max_iterations),
            filter_unreachable: raw.filter_unreachable.unwrap_or(defaults.filter_unreachable),
            max_local_gap: raw.max_local_gap.unwrap_or(defaults.max_local_gap),
            generative_features: raw.generative_features.unwrap_or(defaults.generative_features),
            mcmc: raw.mcmc.unwrap_or(defaults.mcmc),
        })
    }

    /// Reject settings the search cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(TuneError::InvalidConfig(msg.to_string()));

        if self.threads == 0 {
            return invalid("threads must be at least 1");
        }
        if self.starting_points == 0 {
            return invalid("starting-points must be at least 1");
        }
        if !(self.min_plateau_gap >= 0.0) {
            return invalid("min-plateau-gap must be non-negative");
        }
        if !(self.min_objective_diff >= 0.0) {
            return invalid("min-objective-diff must be non-negative");
        }
        if self.mcmc.batch_size == 0 || self.mcmc.max_batches == 0 {
            return invalid("mcmc batch-size and max-batches must be at least 1");
        }
        if !(self.mcmc.temperature > 0.0) {
            return invalid("mcmc temperature must be positive");
        }
        self.strategy.parse::<OptimizerStrategy>()?;
        Ok(())
    }

    /// Numeric base seed: integer literals verbatim, other strings hashed.
    pub fn seed_value(&self) -> u64 {
        let trimmed = self.seed.trim();
        trimmed
            .parse::<u64>()
            .or_else(|_| trimmed.parse::<i64>().map(|i| i as u64))
            .unwrap_or_else(|_| xxh64(trimmed.as_bytes(), 0))
    }

    pub fn line_search(&self) -> LineSearchConfig {
        LineSearchConfig {
            smoothing: self.smoothing,
            window: self.smoothing_window,
            min_plateau_gap: self.min_plateau_gap,
        }
    }

    pub fn generative_set(&self) -> HashSet<&str> {
        self.generative_features.iter().map(String::as_str).collect()
    }

    /// Format config for verbose display.
    pub fn display_summary(&self) -> String {
        let mut lines = Vec::new();

        if let Some(ref source) = self.source {
            lines.push(format!("   Config: {}", source.display()));
        } else {
            lines.push("   Config: (defaults)".to_string());
        }

        lines.push(format!("   Metric: {}", self.metric));
        lines.push(format!(
            "   Strategy: {} ({} starting points, {} threads)",
            self.strategy, self.starting_points, self.threads
        ));
        lines.push(format!("   Seed: {} ({})", self.seed, self.seed_value()));
        lines.push(format!(
            "   Smoothing: {} over ±{}",
            self.smoothing, self.smoothing_window
        ));

        if let Some(ref fixed) = self.fixed_weights {
            lines.push(format!("   Fixed weights: {}", fixed.display()));
        }
        if !self.generative_features.is_empty() {
            lines.push(format!("   Generative: {}", self.generative_features.join(", ")));
        }
        if self.mcmc.enabled {
            lines.push(format!(
                "   MCMC: batches of {} (≤{}), C={}, T={}",
                self.mcmc.batch_size, self.mcmc.max_batches, self.mcmc.c, self.mcmc.temperature
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TuneConfig::default();
        assert_eq!(config.starting_points, 5);
        assert_eq!(config.strategy, "koehn");
        assert_eq!(config.smoothing, Smoothing::Min);
        assert_eq!(config.smoothing_window, 1);
        assert!(!config.mcmc.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = TuneConfig::parse(
            r#"
seed = 42
threads = 4
smoothing = "avg"
generative-features = ["lm"]

[mcmc]
enabled = true
batch-size = 3
"#,
            None,
        )
        .unwrap();
        assert_eq!(config.seed_value(), 42);
        assert_eq!(config.threads, 4);
        assert_eq!(config.smoothing, Smoothing::Avg);
        assert!(config.generative_set().contains("lm"));
        assert!(config.mcmc.enabled);
        assert_eq!(config.mcmc.batch_size, 3);
        // Unspecified mcmc keys keep their defaults
        assert_eq!(config.mcmc.max_batches, 50);
        assert_eq!(config.max_iterations, 200);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = TuneConfig::parse("thread = 4\n", None).unwrap_err();
        assert!(matches!(err, TuneError::InvalidConfig(_)));
    }

    #[test]
    fn test_string_seed_hashed_deterministically() {
        let a = TuneConfig {
            seed: "mert".into(),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a.seed_value(), b.seed_value());
        assert_ne!(a.seed_value(), TuneConfig { seed: "other".into(), ..Default::default() }.seed_value());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            TuneConfig { threads: 0, ..Default::default() },
            TuneConfig { starting_points: 0, ..Default::default() },
            TuneConfig { strategy: "powell".into(), ..Default::default() },
            TuneConfig { min_plateau_gap: -1.0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
        }
    }

    #[test]
    fn test_load_walks_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "starting-points = 9\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = TuneConfig::load(&nested).unwrap();
        assert_eq!(config.starting_points, 9);
        assert_eq!(config.source.as_deref(), Some(dir.path().join(CONFIG_FILE).as_path()));
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let config = TuneConfig::load_file(&dir.path().join("missing.toml"));
        assert!(matches!(config, Err(TuneError::Io { .. })));
    }
}
