// ⚙️ Engine Configuration - Thresholds, weights and windows as data
//
// Every field has a default, so a config file only needs the values it
// changes. Tables are loaded separately and shared behind an Arc.

use crate::error::{EngineError, EngineResult};
use crate::grouper::{DuplicateGrouper, GroupingMode, DEFAULT_FUZZY_THRESHOLD};
use crate::merge::MergeResolver;
use crate::normalizer::TextNormalizer;
use crate::quality::{QualityScorer, DEFAULT_RECENCY_WINDOW_DAYS, MAX_RECENCY_WINDOW_DAYS};
use crate::ranker::{CandidateRanker, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::rules::SignalRules;
use crate::scan::DuplicateScanner;
use crate::scorer::{MatchScorer, ScoreWeights};
use crate::tables::EngineTables;
use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A match must score strictly above this (default: 0.3)
    pub confidence_threshold: f64,

    /// Sub-score weights (default: 0.4 / 0.4 / 0.1 / 0.1)
    pub weights: ScoreWeights,

    /// Minimum key similarity in the fuzzy grouping pass (default: 0.85)
    pub fuzzy_threshold: f64,

    /// Days an update counts toward the quality recency bonus (default: 180)
    pub recency_window_days: i64,

    pub grouping_mode: GroupingMode,

    /// Run batch matching and bucket grouping on the rayon pool
    pub parallel: bool,

    pub rules: SignalRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            weights: ScoreWeights::default(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            recency_window_days: DEFAULT_RECENCY_WINDOW_DAYS,
            grouping_mode: GroupingMode::ExactOnly,
            parallel: true,
            rules: SignalRules::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: EngineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(EngineError::Config(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };

        unit("confidence_threshold", self.confidence_threshold)?;
        unit("fuzzy_threshold", self.fuzzy_threshold)?;
        unit("weights.brand", self.weights.brand)?;
        unit("weights.name", self.weights.name)?;
        unit("weights.category", self.weights.category)?;
        unit("weights.source", self.weights.source)?;

        if !(0..=MAX_RECENCY_WINDOW_DAYS).contains(&self.recency_window_days) {
            return Err(EngineError::Config(format!(
                "recency_window_days must be in [0, {}], got {}",
                MAX_RECENCY_WINDOW_DAYS, self.recency_window_days
            )));
        }
        Ok(())
    }

    pub fn quality_scorer(&self, as_of: DateTime<Utc>) -> QualityScorer {
        QualityScorer::with_window(self.recency_window_days, as_of)
    }

    pub fn build_ranker(&self, tables: Arc<EngineTables>, as_of: DateTime<Utc>) -> CandidateRanker {
        let scorer = MatchScorer::new(tables, Arc::new(self.rules.clone()), self.weights);
        CandidateRanker::new(scorer, self.quality_scorer(as_of), self.confidence_threshold)
    }

    pub fn build_grouper(&self, tables: &EngineTables) -> DuplicateGrouper {
        DuplicateGrouper::new(
            TextNormalizer::new(Arc::new(tables.aliases.clone())),
            self.grouping_mode,
        )
        .with_fuzzy_threshold(self.fuzzy_threshold)
        .with_parallel(self.parallel)
    }

    pub fn build_scanner(&self, tables: &EngineTables, as_of: DateTime<Utc>) -> DuplicateScanner {
        DuplicateScanner::new(
            self.build_grouper(tables),
            MergeResolver::new(self.quality_scorer(as_of)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.confidence_threshold, 0.3);
        assert_eq!(config.fuzzy_threshold, 0.85);
        assert_eq!(config.recency_window_days, 180);
        assert_eq!(config.weights.brand, 0.4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "fuzzy_threshold": 0.9, "grouping_mode": "exact_and_fuzzy" }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert_eq!(config.grouping_mode, GroupingMode::ExactAndFuzzy);
        assert_eq!(config.confidence_threshold, 0.3);
        assert_eq!(config.rules, SignalRules::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "confidence_threshold": 1.5 }}"#).unwrap();
        assert!(EngineConfig::from_file(file.path()).is_err());

        let config = EngineConfig {
            recency_window_days: -1,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = EngineConfig {
            recency_window_days: i64::MAX,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_builders_use_config() {
        let config = EngineConfig {
            confidence_threshold: 0.5,
            grouping_mode: GroupingMode::ExactAndFuzzy,
            ..EngineConfig::default()
        };
        let tables = Arc::new(EngineTables::with_defaults());
        let ranker = config.build_ranker(tables.clone(), Utc::now());
        assert_eq!(ranker.threshold(), 0.5);
        assert_eq!(config.build_grouper(&tables).mode(), GroupingMode::ExactAndFuzzy);
    }
}
