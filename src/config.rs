//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section is optional; missing sections fall back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::backtest::reweight::ReweightConfig;
use crate::backtest::BacktestConfig;
use crate::odds::kelly::KellyConfig;
use crate::scoring::ScoringConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub reweight: ReweightConfig,
    #[serde(default)]
    pub staking: KellyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding picks.json, settlements.json and runs.json.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;

        let r = &self.reweight;
        if !(r.min_weight >= 0.0 && r.min_weight <= r.max_weight) {
            anyhow::bail!(
                "reweight bounds must satisfy 0 <= min_weight <= max_weight, got {}..{}",
                r.min_weight,
                r.max_weight
            );
        }

        let k = &self.staking;
        if !(k.multiplier > 0.0 && k.multiplier <= 1.0) {
            anyhow::bail!("staking.multiplier must be in (0, 1], got {}", k.multiplier);
        }
        if !(k.max_bet_pct > 0.0 && k.max_bet_pct <= 1.0) {
            anyhow::bail!("staking.max_bet_pct must be in (0, 1], got {}", k.max_bet_pct);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::GroupField;
    use crate::scoring::penalty::{PatternType, Severity};

    const SAMPLE: &str = r#"
[scoring]
default_weight = 0.5
probability_engines = ["market"]

[scoring.weights]
form = 2.0
pace = 1.0

[[scoring.penalties]]
pattern_type = "category"
pattern_key = "ncaab"
severity = "block"

[[scoring.penalties]]
pattern_type = "prop_type"
pattern_key = "assists"
severity = "penalize"
penalty_amount = 0.1

[scoring.tiers]
elite = 85.0
strong = 70.0
standard = 55.0

[backtest]
group_by = ["category", "tier"]
rescore = true

[reweight]
min_samples = 30
min_weight = 0.5
max_weight = 2.0

[staking]
multiplier = 0.5

[storage]
data_dir = "/tmp/edge"
"#;

    #[test]
    fn test_parse_full_config() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.scoring.weights.get("form"), Some(&2.0));
        assert_eq!(cfg.scoring.default_weight, Some(0.5));
        assert_eq!(cfg.scoring.penalties.len(), 2);
        assert_eq!(cfg.scoring.penalties[0].pattern_type, PatternType::Category);
        assert_eq!(cfg.scoring.penalties[1].severity, Severity::Penalize);
        assert_eq!(cfg.scoring.tiers.elite, 85.0);
        assert_eq!(cfg.backtest.group_by, vec![GroupField::Category, GroupField::Tier]);
        assert!(cfg.backtest.rescore);
        assert_eq!(cfg.reweight.min_samples, 30);
        assert_eq!(cfg.staking.multiplier, 0.5);
        assert_eq!(cfg.staking.max_bet_pct, 0.05);
        assert_eq!(cfg.storage.data_dir, PathBuf::from("/tmp/edge"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.scoring, ScoringConfig::default());
        assert_eq!(cfg.backtest.group_by, vec![GroupField::Tier]);
        assert_eq!(cfg.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_rejects_inverted_tiers() {
        let toml = "[scoring.tiers]\nelite = 50.0\nstrong = 60.0\nstandard = 40.0\n";
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_negative_weight() {
        assert!(AppConfig::parse("[scoring.weights]\nform = -1.0\n").is_err());
    }

    #[test]
    fn test_weight_keys_case_insensitive() {
        let cfg = AppConfig::parse("[scoring.weights]\nForm = 2.0\nPACE = 0.5\n").unwrap();
        assert_eq!(cfg.scoring.weights.get("form"), Some(&2.0));
        assert_eq!(cfg.scoring.weight_for("pace"), Some(0.5));
        assert!(!cfg.scoring.weights.contains_key("Form"));
    }

    #[test]
    fn test_rejects_penalty_out_of_range() {
        let toml = r#"
[[scoring.penalties]]
pattern_type = "tag"
pattern_key = "b2b"
severity = "penalize"
penalty_amount = 15.0
"#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_unknown_group_field() {
        assert!(AppConfig::parse("[backtest]\ngroup_by = [\"weather\"]\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load("/nonexistent/parlay-edge.toml").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));
    }
}
