// 📚 Lookup Tables - Aliases, category keywords and source patterns as data
//
// All tables are immutable once built. They are loaded once (JSON file or
// built-in defaults) and shared behind an Arc, so tests can inject fixtures
// without touching any global state.

use crate::catalog::Category;
use crate::normalizer::clean_text;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// Canonical string plus its known textual variants, all pre-cleaned.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasEntry {
    pub canonical: String,
    pub variants: Vec<String>,
}

/// On-disk shape: `{ "brands": { canonical: [variants] }, "models": { ... } }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasTableFile {
    #[serde(default)]
    pub brands: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub models: BTreeMap<String, Vec<String>>,
}

/// Canonical brand/model -> known variants (abbreviations, misspellings,
/// historical names).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "AliasTableFile", into = "AliasTableFile")]
pub struct AliasTable {
    brands: Vec<AliasEntry>,
    models: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new(
        brands: BTreeMap<String, Vec<String>>,
        models: BTreeMap<String, Vec<String>>,
    ) -> Self {
        AliasTable {
            brands: compile_entries(brands, clean_text),
            models: compile_entries(models, compact),
        }
    }

    pub fn empty() -> Self {
        AliasTable::default()
    }

    pub fn brands(&self) -> &[AliasEntry] {
        &self.brands
    }

    /// Variants of a canonical (cleaned) brand.
    pub fn brand_variants(&self, canonical_brand: &str) -> &[String] {
        self.brands
            .iter()
            .find(|e| e.canonical == canonical_brand)
            .map(|e| e.variants.as_slice())
            .unwrap_or(&[])
    }

    /// Variants of a model, looked up by its whitespace-free form.
    pub fn model_variants(&self, model: &str) -> &[String] {
        let key = compact(model);
        self.models
            .iter()
            .find(|e| e.canonical == key)
            .map(|e| e.variants.as_slice())
            .unwrap_or(&[])
    }

    /// (variant tokens, canonical) pairs, longest variant first.
    pub fn brand_replacements(&self) -> Vec<(Vec<&str>, &str)> {
        let mut pairs: Vec<(Vec<&str>, &str)> = self
            .brands
            .iter()
            .flat_map(|e| {
                e.variants
                    .iter()
                    .map(move |v| (v.split(' ').collect::<Vec<_>>(), e.canonical.as_str()))
            })
            .collect();

        pairs.sort_by(|a, b| {
            b.0.len()
                .cmp(&a.0.len())
                .then_with(|| b.0.join(" ").len().cmp(&a.0.join(" ").len()))
                .then_with(|| a.0.cmp(&b.0))
        });
        pairs
    }
}

impl From<AliasTableFile> for AliasTable {
    fn from(file: AliasTableFile) -> Self {
        AliasTable::new(file.brands, file.models)
    }
}

impl From<AliasTable> for AliasTableFile {
    fn from(table: AliasTable) -> Self {
        fn expand(entries: Vec<AliasEntry>) -> BTreeMap<String, Vec<String>> {
            entries.into_iter().map(|e| (e.canonical, e.variants)).collect()
        }
        AliasTableFile {
            brands: expand(table.brands),
            models: expand(table.models),
        }
    }
}

fn compact(s: &str) -> String {
    clean_text(s).replace(' ', "")
}

fn compile_entries(
    raw: BTreeMap<String, Vec<String>>,
    canonical_form: fn(&str) -> String,
) -> Vec<AliasEntry> {
    raw.into_iter()
        .map(|(canonical, variants)| {
            let canonical = canonical_form(&canonical);
            let mut cleaned: Vec<String> = variants
                .iter()
                .map(|v| clean_text(v))
                .filter(|v| !v.is_empty() && *v != canonical)
                .collect();
            cleaned.sort();
            cleaned.dedup();
            AliasEntry {
                canonical,
                variants: cleaned,
            }
        })
        .filter(|e| !e.canonical.is_empty())
        .collect()
}

// ============================================================================
// CATEGORY KEYWORD TABLE
// ============================================================================

/// Category -> phrases that signal that category in free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<Category, Vec<String>>",
    into = "BTreeMap<Category, Vec<String>>"
)]
pub struct CategoryKeywordTable {
    keywords: BTreeMap<Category, Vec<String>>,
}

impl CategoryKeywordTable {
    pub fn new(keywords: BTreeMap<Category, Vec<String>>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|(cat, phrases)| {
                let cleaned = phrases
                    .iter()
                    .map(|p| clean_text(p))
                    .filter(|p| !p.is_empty())
                    .collect();
                (cat, cleaned)
            })
            .collect();
        CategoryKeywordTable { keywords }
    }

    pub fn phrases(&self, category: Category) -> &[String] {
        self.keywords
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl From<BTreeMap<Category, Vec<String>>> for CategoryKeywordTable {
    fn from(keywords: BTreeMap<Category, Vec<String>>) -> Self {
        CategoryKeywordTable::new(keywords)
    }
}

impl From<CategoryKeywordTable> for BTreeMap<Category, Vec<String>> {
    fn from(table: CategoryKeywordTable) -> Self {
        table.keywords
    }
}

// ============================================================================
// SOURCE PATTERN TABLE
// ============================================================================

/// A source-typical textual signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSignal {
    /// Literal phrase, case-insensitive (condition vocabulary)
    Phrase { text: String },

    /// Trade-tag formatting such as "[WTS]", "[H]", "[US-CA]"
    TradeTags,

    /// A currency symbol or code next to an amount ("$220", "180 EUR")
    CurrencyAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePattern {
    pub id: String,
    pub signal: SourceSignal,

    /// Credit toward the source sub-score (sub-score is capped at 1.0)
    pub credit: f64,
}

/// Source tag (lowercase) -> patterns typical of that source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<SourcePattern>>",
    into = "BTreeMap<String, Vec<SourcePattern>>"
)]
pub struct SourcePatternTable {
    sources: BTreeMap<String, Vec<SourcePattern>>,
}

impl SourcePatternTable {
    pub fn new(sources: BTreeMap<String, Vec<SourcePattern>>) -> Self {
        let sources = sources
            .into_iter()
            .map(|(tag, patterns)| (tag.trim().to_lowercase(), patterns))
            .collect();
        SourcePatternTable { sources }
    }

    pub fn patterns(&self, source: &str) -> &[SourcePattern] {
        self.sources
            .get(&source.trim().to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl From<BTreeMap<String, Vec<SourcePattern>>> for SourcePatternTable {
    fn from(sources: BTreeMap<String, Vec<SourcePattern>>) -> Self {
        SourcePatternTable::new(sources)
    }
}

impl From<SourcePatternTable> for BTreeMap<String, Vec<SourcePattern>> {
    fn from(table: SourcePatternTable) -> Self {
        table.sources
    }
}

// ============================================================================
// ENGINE TABLES (all three, loaded together)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineTables {
    #[serde(default)]
    pub aliases: AliasTable,
    #[serde(default)]
    pub categories: CategoryKeywordTable,
    #[serde(default)]
    pub sources: SourcePatternTable,
}

impl EngineTables {
    /// Load tables from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read tables file: {:?}", path.as_ref()))?;

        let tables: EngineTables =
            serde_json::from_str(&content).context("Failed to parse tables JSON")?;

        Ok(tables)
    }

    /// Built-in tables covering common audio brands and marketplaces
    pub fn with_defaults() -> Self {
        EngineTables {
            aliases: default_aliases(),
            categories: default_categories(),
            sources: default_sources(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_aliases() -> AliasTable {
    let mut brands = BTreeMap::new();
    brands.insert("sennheiser".to_string(), strings(&["senn", "sennheisser", "senheiser"]));
    brands.insert("hifiman".to_string(), strings(&["hifi man", "hifi-man", "hfm"]));
    brands.insert("audio technica".to_string(), strings(&["audio-technica", "audiotechnica", "a-t"]));
    brands.insert("beyerdynamic".to_string(), strings(&["beyer", "beyer dynamic"]));
    brands.insert("focal".to_string(), strings(&["focal-jmlab"]));
    brands.insert("schiit".to_string(), strings(&["schiit audio"]));
    brands.insert("topping".to_string(), strings(&["topping audio"]));
    brands.insert("moondrop".to_string(), strings(&["moon drop"]));
    brands.insert("etymotic".to_string(), strings(&["ety", "etymotic research"]));
    brands.insert("drop".to_string(), strings(&["massdrop"]));

    let mut models = BTreeMap::new();
    models.insert("hd650".to_string(), strings(&["hd 6xx", "hd6xx"]));
    models.insert("hd58x".to_string(), strings(&["hd 58x jubilee", "58x"]));
    models.insert("dt770".to_string(), strings(&["dt 770 pro"]));
    models.insert("athm50x".to_string(), strings(&["m50x"]));

    AliasTable::new(brands, models)
}

fn default_categories() -> CategoryKeywordTable {
    let mut keywords = BTreeMap::new();
    keywords.insert(
        Category::Headphone,
        strings(&["headphone", "headphones", "over ear", "open back", "closed back", "cans"]),
    );
    keywords.insert(Category::InEar, strings(&["iem", "iems", "in ear", "earphones", "earbuds"]));
    keywords.insert(Category::Dac, strings(&["dac", "converter"]));
    keywords.insert(
        Category::Amplifier,
        strings(&["amp", "amplifier", "headphone amp", "tube amp"]),
    );
    keywords.insert(Category::DacAmp, strings(&["dac amp", "dac/amp", "combo", "stack"]));
    keywords.insert(Category::Cable, strings(&["cable", "interconnect", "balanced cable"]));
    CategoryKeywordTable::new(keywords)
}

fn default_sources() -> SourcePatternTable {
    fn phrase(id: &str, text: &str, credit: f64) -> SourcePattern {
        SourcePattern {
            id: id.to_string(),
            signal: SourceSignal::Phrase {
                text: text.to_string(),
            },
            credit,
        }
    }

    let trade_tags = SourcePattern {
        id: "trade_tags".to_string(),
        signal: SourceSignal::TradeTags,
        credit: 0.6,
    };
    let currency = SourcePattern {
        id: "currency_amount".to_string(),
        signal: SourceSignal::CurrencyAmount,
        credit: 0.4,
    };

    let mut sources = BTreeMap::new();
    sources.insert("reddit".to_string(), vec![trade_tags, currency.clone()]);
    sources.insert(
        "headfi".to_string(),
        vec![
            phrase("excellent_condition", "excellent condition", 0.5),
            phrase("like_new", "like new", 0.5),
            phrase("mint", "mint", 0.4),
            phrase("lightly_used", "lightly used", 0.4),
            phrase("b_stock", "b-stock", 0.3),
        ],
    );
    sources.insert(
        "ebay".to_string(),
        vec![
            phrase("pre_owned", "pre-owned", 0.5),
            phrase("tested_working", "tested working", 0.4),
            phrase("open_box", "open box", 0.3),
            currency,
        ],
    );
    SourcePatternTable::new(sources)
}

// ============================================================================
// TESTS
// ============================================================================
