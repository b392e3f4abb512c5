// 🏷️ Scoring Rules - Rules as Data
// Each sub-score (brand / name / category) is an ordered list of
// (signal, score) rules. The first rule whose signal fires decides the score.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// SIGNALS
// ============================================================================

/// Evidence that a listing mentions the entry's brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrandSignal {
    /// Normalized brand appears verbatim in the text
    ExactSubstring,

    /// A known alias variant of the brand appears in the text
    AliasVariant,

    /// Enough of the brand's longer tokens appear, allowing small typos
    TokenOverlap {
        min_fraction: f64,
        min_token_len: usize,
        max_edits: usize,
    },
}

/// Evidence that a listing mentions the entry's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameSignal {
    /// Normalized model name appears verbatim in the text
    ExactSubstring,

    /// A cataloged variation of the model appears in the text
    Variation,

    /// A model-number token of the name appears in the text
    ModelNumber,

    /// Fraction of name tokens found in the text (scales the rule score)
    TokenProportion { min_token_len: usize, max_edits: usize },
}

/// Evidence that a listing is about the entry's category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategorySignal {
    /// A keyword phrase for the category appears in the text
    KeywordPhrase,
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRule<S> {
    /// Rule ID for tracking (shows up in match breakdowns)
    pub id: String,

    /// What has to be true of the text
    pub signal: S,

    /// Sub-score awarded when the signal fires (0.0 - 1.0)
    pub score: f64,

    /// Priority (higher = evaluated first)
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    0
}

impl<S> ScoreRule<S> {
    pub fn new(id: &str, signal: S, score: f64, priority: i32) -> Self {
        ScoreRule {
            id: id.to_string(),
            signal,
            score,
            priority,
        }
    }
}

// ============================================================================
// RULE OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub score: f64,
    pub rule_id: Option<String>,
}

impl Default for RuleOutcome {
    fn default() -> Self {
        RuleOutcome {
            score: 0.0,
            rule_id: None,
        }
    }
}

impl RuleOutcome {
    pub fn fired(&self) -> bool {
        self.rule_id.is_some()
    }
}

// ============================================================================
// RULE SET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuleSet<S> {
    rules: Vec<ScoreRule<S>>,
}

impl<S> RuleSet<S> {
    /// Create a rule set; rules are kept sorted by priority (higher first),
    /// ties keep their given order.
    pub fn from_rules(mut rules: Vec<ScoreRule<S>>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleSet { rules }
    }

    pub fn add_rule(&mut self, rule: ScoreRule<S>) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn rules(&self) -> &[ScoreRule<S>] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate rules in priority order.
    ///
    /// `fires` returns `Some(fraction)` when a signal is present; the rule
    /// score is scaled by that fraction (1.0 for all-or-nothing signals).
    /// The first firing rule with a non-zero score wins. Result is clamped
    /// to [0, 1].
    pub fn evaluate<F>(&self, mut fires: F) -> RuleOutcome
    where
        F: FnMut(&S) -> Option<f64>,
    {
        for rule in &self.rules {
            if let Some(fraction) = fires(&rule.signal) {
                let score = (rule.score * fraction.clamp(0.0, 1.0)).clamp(0.0, 1.0);
                if score > 0.0 {
                    return RuleOutcome {
                        score,
                        rule_id: Some(rule.id.clone()),
                    };
                }
            }
        }
        RuleOutcome::default()
    }
}

impl<'de, S: Deserialize<'de>> Deserialize<'de> for RuleSet<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rules = Vec::<ScoreRule<S>>::deserialize(deserializer)?;
        Ok(RuleSet::from_rules(rules))
    }
}

// ============================================================================
// SIGNAL RULES (the three rule sets together)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRules {
    #[serde(default = "default_brand_rules")]
    pub brand: RuleSet<BrandSignal>,

    #[serde(default = "default_name_rules")]
    pub name: RuleSet<NameSignal>,

    #[serde(default = "default_category_rules")]
    pub category: RuleSet<CategorySignal>,
}

impl Default for SignalRules {
    fn default() -> Self {
        SignalRules {
            brand: default_brand_rules(),
            name: default_name_rules(),
            category: default_category_rules(),
        }
    }
}

impl SignalRules {
    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: SignalRules =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(rules)
    }
}

pub fn default_brand_rules() -> RuleSet<BrandSignal> {
    RuleSet::from_rules(vec![
        ScoreRule::new("brand_exact", BrandSignal::ExactSubstring, 1.0, 30),
        ScoreRule::new("brand_alias", BrandSignal::AliasVariant, 0.8, 20),
        ScoreRule::new(
            "brand_tokens",
            BrandSignal::TokenOverlap {
                min_fraction: 0.5,
                min_token_len: 4,
                max_edits: 1,
            },
            0.6,
            10,
        ),
    ])
}

pub fn default_name_rules() -> RuleSet<NameSignal> {
    RuleSet::from_rules(vec![
        ScoreRule::new("name_exact", NameSignal::ExactSubstring, 1.0, 40),
        ScoreRule::new("name_variation", NameSignal::Variation, 0.9, 30),
        ScoreRule::new("name_model_number", NameSignal::ModelNumber, 0.7, 20),
        ScoreRule::new(
            "name_tokens",
            NameSignal::TokenProportion {
                min_token_len: 3,
                max_edits: 1,
            },
            0.6,
            10,
        ),
    ])
}

pub fn default_category_rules() -> RuleSet<CategorySignal> {
    RuleSet::from_rules(vec![ScoreRule::new(
        "category_keyword",
        CategorySignal::KeywordPhrase,
        1.0,
        10,
    )])
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_sorted_by_priority() {
        let rules = default_name_rules();
        let priorities: Vec<i32> = rules.rules().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![40, 30, 20, 10]);
    }

    #[test]
    fn test_first_firing_rule_wins() {
        let rules = default_brand_rules();
        // alias and token overlap both fire; alias has higher priority
        let outcome = rules.evaluate(|s| match s {
            BrandSignal::ExactSubstring => None,
            _ => Some(1.0),
        });
        assert_eq!(outcome.score, 0.8);
        assert_eq!(outcome.rule_id.as_deref(), Some("brand_alias"));
    }

    #[test]
    fn test_fraction_scales_score() {
        let rules = default_name_rules();
        let outcome = rules.evaluate(|s| match s {
            NameSignal::TokenProportion { .. } => Some(0.5),
            _ => None,
        });
        assert!((outcome.score - 0.3).abs() < 1e-9);
        assert_eq!(outcome.rule_id.as_deref(), Some("name_tokens"));
    }

    #[test]
    fn test_zero_fraction_falls_through() {
        let rules = default_name_rules();
        let outcome = rules.evaluate(|_| Some(0.0));
        assert_eq!(outcome, RuleOutcome::default());
        assert!(!outcome.fired());
    }

    #[test]
    fn test_no_match() {
        let rules = default_category_rules();
        let outcome = rules.evaluate(|_| None);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.rule_id, None);
    }

    #[test]
    fn test_scores_clamped() {
        let rules = RuleSet::from_rules(vec![ScoreRule::new(
            "too_big",
            CategorySignal::KeywordPhrase,
            3.0,
            0,
        )]);
        assert_eq!(rules.evaluate(|_| Some(1.0)).score, 1.0);
    }

    #[test]
    fn test_add_rule_priority() {
        let mut rules = RuleSet::from_rules(vec![]);
        rules.add_rule(ScoreRule::new("general", CategorySignal::KeywordPhrase, 0.5, 1));
        rules.add_rule(ScoreRule::new("specific", CategorySignal::KeywordPhrase, 0.9, 100));

        let outcome = rules.evaluate(|_| Some(1.0));
        assert_eq!(outcome.rule_id.as_deref(), Some("specific"));
        assert_eq!(rules.rule_count(), 2);
    }

    #[test]
    fn test_rules_from_json_resorts() {
        let json = r#"{
            "brand": [
                { "id": "low", "signal": { "kind": "exact_substring" }, "score": 0.5, "priority": 1 },
                { "id": "high", "signal": { "kind": "alias_variant" }, "score": 0.9, "priority": 9 }
            ]
        }"#;
        let rules: SignalRules = serde_json::from_str(json).unwrap();
        assert_eq!(rules.brand.rules()[0].id, "high");
        // missing sections fall back to defaults
        assert_eq!(rules.name, default_name_rules());
    }
}
