// 🎯 Match Scorer - Weighted similarity between listing text and one entry
//
// total = w_brand·brand + w_name·name + w_category·category + w_source·source
// clamped to [0, 1]. A brand sub-score of 0 gates the whole total to 0.

use crate::catalog::CatalogEntry;
use crate::normalizer::{clean_text, contains_phrase, NameMode, PreparedText, TextNormalizer};
use crate::rules::{BrandSignal, CategorySignal, NameSignal, RuleOutcome, SignalRules};
use crate::similarity::{extract_model_numbers, within_edits};
use crate::tables::{EngineTables, SourceSignal};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static TRADE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:wts|wtb|wtt|h|w|[a-z]{2,3}-[a-z]{2,3})\]").unwrap()
});

static CURRENCY_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[$€£]\s?\d|\d\s?(?:usd|eur|gbp|cad|aud)\b").unwrap()
});

// ============================================================================
// WEIGHTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub brand: f64,
    pub name: f64,
    pub category: f64,
    pub source: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            brand: 0.4,
            name: 0.4,
            category: 0.1,
            source: 0.1,
        }
    }
}

// ============================================================================
// BREAKDOWN
// ============================================================================

/// Source-typical signals that fired, and their capped sub-score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBonus {
    pub score: f64,
    pub signals: Vec<String>,
}

/// Which sub-signals fired for one (listing, entry) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub brand: RuleOutcome,
    pub name: RuleOutcome,
    pub category: RuleOutcome,
    pub source: SourceBonus,

    /// True when a zero brand score forced the total to 0
    pub brand_gated: bool,

    pub total: f64,
}

// ============================================================================
// MATCH SCORER
// ============================================================================

#[derive(Debug, Clone)]
pub struct MatchScorer {
    normalizer: TextNormalizer,
    tables: Arc<EngineTables>,
    rules: Arc<SignalRules>,
    weights: ScoreWeights,
}

impl MatchScorer {
    pub fn new(tables: Arc<EngineTables>, rules: Arc<SignalRules>, weights: ScoreWeights) -> Self {
        MatchScorer {
            normalizer: TextNormalizer::new(Arc::new(tables.aliases.clone())),
            tables,
            rules,
            weights,
        }
    }

    /// Scorer with default rules and weights
    pub fn with_tables(tables: Arc<EngineTables>) -> Self {
        MatchScorer::new(tables, Arc::new(SignalRules::default()), ScoreWeights::default())
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Score one catalog entry against prepared listing text.
    pub fn score(
        &self,
        text: &PreparedText,
        entry: &CatalogEntry,
        source: Option<&str>,
    ) -> ScoreBreakdown {
        if text.is_empty() {
            return ScoreBreakdown {
                brand_gated: true,
                ..ScoreBreakdown::default()
            };
        }

        let brand = self.brand_score(text, &entry.brand);
        if !brand.fired() {
            return ScoreBreakdown {
                brand,
                brand_gated: true,
                ..ScoreBreakdown::default()
            };
        }

        let name = self.name_score(text, entry);
        let category = self.category_score(text, entry);
        let source = match source {
            Some(tag) => self.source_bonus(text, tag),
            None => SourceBonus::default(),
        };

        let total = (self.weights.brand * brand.score
            + self.weights.name * name.score
            + self.weights.category * category.score
            + self.weights.source * source.score)
            .clamp(0.0, 1.0);

        ScoreBreakdown {
            brand,
            name,
            category,
            source,
            brand_gated: false,
            total,
        }
    }

    /// Brand sub-score alone; used to decide which brands a listing mentions.
    pub fn brand_score(&self, text: &PreparedText, brand: &str) -> RuleOutcome {
        let normalized = self.normalizer.normalize_brand(brand);
        if normalized.is_empty() {
            return RuleOutcome::default();
        }
        let variants = self.normalizer.aliases().brand_variants(&normalized);

        self.rules.brand.evaluate(|signal| match signal {
            BrandSignal::ExactSubstring => {
                text.normalized.contains(normalized.as_str()).then_some(1.0)
            }
            BrandSignal::AliasVariant => variants
                .iter()
                .any(|v| contains_phrase(&text.normalized, v))
                .then_some(1.0),
            BrandSignal::TokenOverlap {
                min_fraction,
                min_token_len,
                max_edits,
            } => {
                let long_tokens: Vec<&str> = normalized
                    .split(' ')
                    .filter(|t| t.chars().count() >= *min_token_len)
                    .collect();
                if long_tokens.is_empty() {
                    return None;
                }
                let found = long_tokens
                    .iter()
                    .filter(|t| token_in_text(text, t, *max_edits))
                    .count();
                let fraction = found as f64 / long_tokens.len() as f64;
                (fraction >= *min_fraction).then_some(1.0)
            }
        })
    }

    fn name_score(&self, text: &PreparedText, entry: &CatalogEntry) -> RuleOutcome {
        let model = self
            .normalizer
            .normalize_model_name(&entry.name, &entry.brand, NameMode::Matching);
        if model.is_empty() {
            return RuleOutcome::default();
        }
        let variations = self.normalizer.aliases().model_variants(&model);

        self.rules.name.evaluate(|signal| match signal {
            NameSignal::ExactSubstring => text.normalized.contains(model.as_str()).then_some(1.0),
            NameSignal::Variation => variations
                .iter()
                .any(|v| contains_phrase(&text.normalized, v))
                .then_some(1.0),
            NameSignal::ModelNumber => extract_model_numbers(&model)
                .iter()
                .any(|n| text.model_numbers.contains(n))
                .then_some(1.0),
            NameSignal::TokenProportion {
                min_token_len,
                max_edits,
            } => {
                let tokens: Vec<&str> = model.split(' ').collect();
                let matching = tokens
                    .iter()
                    .filter(|t| t.chars().count() >= *min_token_len)
                    .filter(|t| token_in_text(text, t, *max_edits))
                    .count();
                Some(matching as f64 / tokens.len() as f64)
            }
        })
    }

    fn category_score(&self, text: &PreparedText, entry: &CatalogEntry) -> RuleOutcome {
        let phrases = self.tables.categories.phrases(entry.category);
        self.rules.category.evaluate(|signal| match signal {
            CategorySignal::KeywordPhrase => phrases
                .iter()
                .any(|p| contains_phrase(&text.normalized, p))
                .then_some(1.0),
        })
    }

    fn source_bonus(&self, text: &PreparedText, source: &str) -> SourceBonus {
        let mut bonus = SourceBonus::default();

        for pattern in self.tables.sources.patterns(source) {
            let fired = match &pattern.signal {
                SourceSignal::Phrase { text: phrase } => {
                    contains_phrase(&text.normalized, &clean_text(phrase))
                }
                SourceSignal::TradeTags => TRADE_TAG.is_match(&text.raw_lower),
                SourceSignal::CurrencyAmount => CURRENCY_AMOUNT.is_match(&text.raw_lower),
            };
            if fired {
                bonus.score += pattern.credit.max(0.0);
                bonus.signals.push(pattern.id.clone());
            }
        }

        bonus.score = bonus.score.min(1.0);
        bonus
    }
}

/// Token present verbatim, or within `max_edits` of some text token.
fn token_in_text(text: &PreparedText, token: &str, max_edits: usize) -> bool {
    text.tokens
        .iter()
        .any(|t| t == token || (max_edits > 0 && within_edits(t, token, max_edits)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use crate::tables::{AliasTable, CategoryKeywordTable};
    use std::collections::BTreeMap;

    fn create_test_scorer() -> MatchScorer {
        let mut brands = BTreeMap::new();
        brands.insert("sennheiser".to_string(), vec!["senn".to_string()]);
        brands.insert("hifiman".to_string(), vec!["hifi man".to_string()]);
        let mut models = BTreeMap::new();
        models.insert("hd650".to_string(), vec!["hd6xx".to_string()]);

        let mut keywords = BTreeMap::new();
        keywords.insert(Category::Headphone, vec!["headphones".to_string(), "open back".to_string()]);

        let tables = EngineTables {
            aliases: AliasTable::new(brands, models),
            categories: CategoryKeywordTable::new(keywords),
            sources: EngineTables::with_defaults().sources,
        };
        MatchScorer::with_tables(Arc::new(tables))
    }

    fn entry(brand: &str, name: &str) -> CatalogEntry {
        CatalogEntry::new(1, brand, name, Category::Headphone)
    }

    #[test]
    fn test_model_number_match() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("Sennheiser HD 600 excellent condition $220");
        let b = scorer.score(&text, &entry("Sennheiser", "HD600"), None);

        assert_eq!(b.brand.score, 1.0);
        assert_eq!(b.name.score, 0.7);
        assert_eq!(b.name.rule_id.as_deref(), Some("name_model_number"));
        assert_eq!(b.category.score, 0.0);
        assert!((b.total - 0.68).abs() < 1e-9);
        assert!(!b.brand_gated);
    }

    #[test]
    fn test_brand_alias_entry_scores_exact() {
        let scorer = MatchScorer::with_tables(Arc::new(EngineTables::with_defaults()));
        let text = PreparedText::new("Schiit Magni 3 amp");
        let entry = CatalogEntry::new(1, "Schiit Audio", "Magni 3", Category::Amplifier);
        let b = scorer.score(&text, &entry, None);

        assert_eq!(b.brand.score, 1.0);
        assert_eq!(b.brand.rule_id.as_deref(), Some("brand_exact"));
        assert_eq!(b.name.score, 1.0);
    }

    #[test]
    fn test_brand_gating() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("Random Co Widget headphones HD600");
        let b = scorer.score(&text, &entry("Sennheiser", "HD600"), Some("reddit"));

        assert_eq!(b.total, 0.0);
        assert!(b.brand_gated);
        // name/category signals are never consulted once gated
        assert!(!b.name.fired());
        assert!(!b.category.fired());
    }

    #[test]
    fn test_exact_name_and_category() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("HiFiMAN Sundara open back headphones");
        let b = scorer.score(&text, &entry("HiFiMAN", "Sundara"), None);

        assert_eq!(b.brand.score, 1.0);
        assert_eq!(b.name.score, 1.0);
        assert_eq!(b.category.score, 1.0);
        assert!((b.total - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_brand_alias_and_variation() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("[WTS] Senn HD6XX");
        let b = scorer.score(&text, &entry("Sennheiser", "HD 650"), None);

        assert_eq!(b.brand.score, 0.8);
        assert_eq!(b.brand.rule_id.as_deref(), Some("brand_alias"));
        assert_eq!(b.name.score, 0.9);
    }

    #[test]
    fn test_brand_token_typo() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("Sennhieser HD600 for sale");
        let b = scorer.score(&text, &entry("Sennheiser", "HD600"), None);
        // a transposition is 2 edits: brand never fires, so the name is ignored
        assert_eq!(b.total, 0.0);

        let text = PreparedText::new("Senheiser HD600 for sale");
        let b = scorer.score(&text, &entry("Sennheiser", "HD600"), None);
        assert_eq!(b.brand.score, 0.6);
        assert_eq!(b.name.score, 1.0);
    }

    #[test]
    fn test_token_proportion() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("HiFiMAN Edition selling");
        let b = scorer.score(&text, &entry("HiFiMAN", "Edition XS"), None);
        // "edition" matches, "xs" too short; 1 of 2 tokens
        assert!((b.name.score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_source_bonus_capped() {
        let scorer = create_test_scorer();
        let text = PreparedText::new("[WTS][US-CA] Sennheiser HD600 $220 shipped");
        let b = scorer.score(&text, &entry("Sennheiser", "HD600"), Some("reddit"));

        assert!((b.source.score - 1.0).abs() < 1e-9);
        assert_eq!(b.source.signals.len(), 2);
        assert!((b.total - 0.9).abs() < 1e-9);

        let headfi = PreparedText::new("Sennheiser HD 600 excellent condition $220");
        let b = scorer.score(&headfi, &entry("Sennheiser", "HD600"), Some("headfi"));
        assert!((b.source.score - 0.5).abs() < 1e-9);
        assert!((b.total - 0.73).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_scores_zero() {
        let scorer = create_test_scorer();
        let b = scorer.score(&PreparedText::new("   "), &entry("Sennheiser", "HD600"), None);
        assert_eq!(b.total, 0.0);
    }

    #[test]
    fn test_scores_always_in_bounds() {
        let scorer = create_test_scorer();
        let texts = [
            "",
            "Sennheiser HD600 HD600 headphones open back [WTS] $1",
            "senn hd6xx excellent condition like new mint",
            "hifiman hifi man sundara sundara sundara",
        ];
        let entries = [
            entry("Sennheiser", "HD600"),
            entry("Sennheiser", "HD 650"),
            entry("HiFiMAN", "Sundara"),
            entry("", ""),
        ];
        for t in texts {
            let prepared = PreparedText::new(t);
            for e in &entries {
                for source in [None, Some("reddit"), Some("headfi"), Some("ebay")] {
                    let b = scorer.score(&prepared, e, source);
                    assert!((0.0..=1.0).contains(&b.total), "{} {:?}", t, e.name);
                    if b.brand.score == 0.0 {
                        assert_eq!(b.total, 0.0);
                    }
                }
            }
        }
    }
}
