// 🧹 Text Normalizer - Canonical brand/model forms for matching and dedup
//
// Pure and deterministic: no I/O, never fails, empty in -> empty out.
// Every normalizer is idempotent: normalize(normalize(x)) == normalize(x).

use crate::similarity::extract_model_numbers;
use crate::tables::AliasTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Tokens dropped from the end of a model name when building duplicate keys
const NOISE_SUFFIXES: &[&str] = &[
    "pro", "plus", "se", "mk2", "mkii", "mk3", "mkiii", "mk4", "mkiv", "mk",
];

/// How much of a model name survives normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMode {
    /// Listing matching: suffixes and qualifiers still carry evidence
    Matching,

    /// Duplicate keys: noise suffixes + parenthetical qualifiers removed,
    /// whitespace dropped entirely ("HD 650" == "HD650")
    DuplicateKey,
}

// ============================================================================
// BASIC CLEANUP
// ============================================================================

/// Lowercase, drop apostrophes, turn other punctuation into spaces, collapse
/// whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if c == '\'' || c == '\u{2019}' {
            continue;
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove "(...)" and "[...]" qualifiers, including an unterminated trailing
/// one, then collapse whitespace.
pub fn strip_parentheticals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-token phrase containment on cleaned text.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || haystack.is_empty() {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

// ============================================================================
// PREPARED LISTING TEXT
// ============================================================================

/// Listing free text, cleaned once and reused for every candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedText {
    /// Lowercased original, for signals that live in punctuation ("[WTS]", "$220")
    pub raw_lower: String,
    pub normalized: String,
    pub tokens: Vec<String>,
    pub model_numbers: BTreeSet<String>,
}

impl PreparedText {
    pub fn new(text: &str) -> Self {
        let normalized = clean_text(text);
        let tokens = normalized.split(' ').filter(|t| !t.is_empty()).map(String::from).collect();
        let model_numbers = extract_model_numbers(&normalized).into_iter().collect();
        PreparedText {
            raw_lower: text.to_lowercase(),
            normalized,
            tokens,
            model_numbers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    aliases: Arc<AliasTable>,
}

impl TextNormalizer {
    pub fn new(aliases: Arc<AliasTable>) -> Self {
        TextNormalizer { aliases }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Cleaned brand with any alias variant replaced by its canonical brand.
    ///
    /// Works on whole tokens. At each position the longest span spelling
    /// either a variant or a canonical brand wins; a variant wins a tie.
    pub fn normalize_brand(&self, brand: &str) -> String {
        let mut current = clean_text(brand);
        // a replacement can complete a longer variant ("ety research"), so
        // rewrite until stable
        for _ in 0..=current.split(' ').count() {
            let next = self.rewrite_brand_once(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn rewrite_brand_once(&self, cleaned: &str) -> String {
        if cleaned.is_empty() {
            return String::new();
        }

        let tokens: Vec<&str> = cleaned.split(' ').collect();
        let canonicals: Vec<Vec<&str>> = self
            .aliases
            .brands()
            .iter()
            .map(|e| e.canonical.split(' ').collect())
            .collect();
        let replacements = self.aliases.brand_replacements();

        let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let rest = &tokens[i..];

            // replacements are sorted longest first
            let variant = replacements
                .iter()
                .find(|(variant, _)| rest.starts_with(variant.as_slice()));
            let canon = canonicals
                .iter()
                .filter(|c| rest.starts_with(c.as_slice()))
                .max_by_key(|c| c.len());

            match (variant, canon) {
                (Some((v, canonical)), c) if c.map_or(true, |c| v.len() >= c.len()) => {
                    out.push(*canonical);
                    i += v.len();
                }
                (_, Some(c)) => {
                    out.extend(c.iter());
                    i += c.len();
                }
                _ => {
                    out.push(tokens[i]);
                    i += 1;
                }
            }
        }

        out.join(" ")
    }

    /// Normalize a model name relative to its brand.
    ///
    /// Both modes: lowercase, punctuation cleanup, leading brand stripped
    /// (repeatedly, on whole tokens, but never down to nothing).
    /// `DuplicateKey` additionally removes parenthetical qualifiers and
    /// trailing noise suffixes, then drops all whitespace.
    pub fn normalize_model_name(&self, name: &str, brand: &str, mode: NameMode) -> String {
        let source = match mode {
            NameMode::Matching => name.to_string(),
            NameMode::DuplicateKey => strip_parentheticals(name),
        };
        let cleaned = clean_text(&source);
        let brand_forms = self.brand_forms(brand);

        let mut tokens: Vec<&str> = cleaned.split(' ').filter(|t| !t.is_empty()).collect();
        strip_brand_tokens(&mut tokens, &brand_forms);

        if mode == NameMode::Matching {
            return tokens.join(" ");
        }

        while tokens.len() > 1 && tokens.last().is_some_and(|t| NOISE_SUFFIXES.contains(t)) {
            tokens.pop();
        }
        tokens.concat()
    }

    /// Duplicate key: `normalized brand | suffix-stripped model`
    pub fn duplicate_key(&self, brand: &str, name: &str) -> String {
        format!(
            "{}|{}",
            self.normalize_brand(brand),
            self.normalize_model_name(name, brand, NameMode::DuplicateKey)
        )
    }

    /// Whitespace-free spellings of the brand that may prefix a model name.
    fn brand_forms(&self, brand: &str) -> Vec<String> {
        let mut forms: Vec<String> = [clean_text(brand), self.normalize_brand(brand)]
            .iter()
            .map(|f| f.replace(' ', ""))
            .filter(|f| !f.is_empty())
            .collect();
        forms.sort();
        forms.dedup();
        forms
    }
}

/// Drop leading token spans that spell a brand form ("senn heiser" counts as
/// "sennheiser"), never consuming the last token.
fn strip_brand_tokens(tokens: &mut Vec<&str>, brand_forms: &[String]) {
    while let Some(span) = brand_forms.iter().find_map(|b| brand_span(tokens, b)) {
        tokens.drain(..span);
    }
}

/// Number of leading tokens whose concatenation is exactly `brand`, if that
/// leaves at least one token behind.
fn brand_span(tokens: &[&str], brand: &str) -> Option<usize> {
    let mut joined = String::new();
    for (i, token) in tokens.iter().enumerate() {
        joined.push_str(token);
        if joined.len() >= brand.len() {
            return (joined == brand && i + 1 < tokens.len()).then_some(i + 1);
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn create_test_normalizer() -> TextNormalizer {
        let mut brands = BTreeMap::new();
        brands.insert("sennheiser".to_string(), vec!["senn".to_string()]);
        brands.insert("hifiman".to_string(), vec!["hifi man".to_string()]);
        brands.insert(
            "audio technica".to_string(),
            vec!["audiotechnica".to_string(), "a t".to_string()],
        );
        TextNormalizer::new(Arc::new(AliasTable::new(brands, BTreeMap::new())))
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Sennheiser   HD-600!! "), "sennheiser hd 600");
        assert_eq!(clean_text("Beyer's DT-770"), "beyers dt 770");
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("$$$"), "");
    }

    #[test]
    fn test_normalize_brand_aliases() {
        let n = create_test_normalizer();
        assert_eq!(n.normalize_brand("HiFi-Man"), "hifiman");
        assert_eq!(n.normalize_brand("SENN"), "sennheiser");
        assert_eq!(n.normalize_brand("Audio-Technica"), "audio technica");
        assert_eq!(n.normalize_brand("AudioTechnica"), "audio technica");
        assert_eq!(n.normalize_brand("Unknown Audio Co."), "unknown audio co");
    }

    #[test]
    fn test_normalize_brand_does_not_rewrite_inside_words() {
        let n = create_test_normalizer();
        // "senn" is a variant, but "sennheiser" is already canonical
        assert_eq!(n.normalize_brand("Sennheiser"), "sennheiser");
    }

    #[test]
    fn test_variants_starting_with_canonical_are_replaced() {
        let tables = crate::tables::EngineTables::with_defaults();
        let n = TextNormalizer::new(Arc::new(tables.aliases));

        assert_eq!(n.normalize_brand("Schiit Audio"), "schiit");
        assert_eq!(n.normalize_brand("Topping Audio"), "topping");
        assert_eq!(n.normalize_brand("Etymotic Research"), "etymotic");
        assert_eq!(n.normalize_brand("Focal-JMlab"), "focal");
        assert_eq!(n.normalize_brand("Schiit"), "schiit");
        assert_eq!(n.duplicate_key("Schiit Audio", "Magni 3"), n.duplicate_key("Schiit", "Magni 3"));
    }

    #[test]
    fn test_replacement_settles_on_stable_brand() {
        let tables = crate::tables::EngineTables::with_defaults();
        let n = TextNormalizer::new(Arc::new(tables.aliases));

        // "ety" -> "etymotic", which then completes "etymotic research"
        let once = n.normalize_brand("Ety Research");
        assert_eq!(once, "etymotic");
        assert_eq!(n.normalize_brand(&once), once);
    }

    #[test]
    fn test_brand_prefix_stripped_on_token_boundary() {
        let mut brands = BTreeMap::new();
        brands.insert("senn".to_string(), vec![]);
        let n = TextNormalizer::new(Arc::new(AliasTable::new(brands, BTreeMap::new())));

        assert_eq!(n.normalize_model_name("Sennet X", "Senn", NameMode::Matching), "sennet x");
        assert_eq!(n.normalize_model_name("Sennet X", "Senn", NameMode::DuplicateKey), "sennetx");
        assert_eq!(n.normalize_model_name("Senn X", "Senn", NameMode::Matching), "x");
    }

    #[test]
    fn test_split_brand_prefix_is_stripped() {
        let n = create_test_normalizer();
        assert_eq!(
            n.normalize_model_name("Senn Heiser HD 650", "Sennheiser", NameMode::DuplicateKey),
            "hd650"
        );
        assert_eq!(
            n.normalize_model_name("Audio Technica ATH-M50x", "AudioTechnica", NameMode::Matching),
            "ath m50x"
        );
    }

    #[test]
    fn test_normalize_model_name_matching_mode() {
        let n = create_test_normalizer();
        assert_eq!(
            n.normalize_model_name("Sennheiser HD   600", "Sennheiser", NameMode::Matching),
            "hd 600"
        );
        assert_eq!(
            n.normalize_model_name("Sundara (2020)", "HiFiMAN", NameMode::Matching),
            "sundara 2020"
        );
        assert_eq!(
            n.normalize_model_name("HE400SE", "HiFi-Man", NameMode::Matching),
            "he400se"
        );
    }

    #[test]
    fn test_normalize_model_name_duplicate_key_mode() {
        let n = create_test_normalizer();
        let key = |name: &str, brand: &str| n.normalize_model_name(name, brand, NameMode::DuplicateKey);

        assert_eq!(key("HD 650", "Sennheiser"), "hd650");
        assert_eq!(key("HD650", "Sennheiser"), "hd650");
        assert_eq!(key("Sundara (2020)", "HiFiMAN"), "sundara");
        assert_eq!(key("DT 770 Pro", "Beyerdynamic"), "dt770");
        assert_eq!(key("Modi Plus", "Schiit"), "modi");
        assert_eq!(key("Magni 3 MK2", "Schiit"), "magni3");
        // never stripped down to nothing
        assert_eq!(key("Pro", "Schiit"), "pro");
        assert_eq!(key("Sennheiser", "Sennheiser"), "sennheiser");
    }

    #[test]
    fn test_brand_prefix_uses_aliases() {
        let n = create_test_normalizer();
        assert_eq!(
            n.normalize_model_name("HiFiMAN Arya", "HiFi Man", NameMode::Matching),
            "arya"
        );
    }

    #[test]
    fn test_normalizers_are_idempotent() {
        let n = create_test_normalizer();
        let brands = ["HiFi-Man", "Sennheiser", "senn", "Audio-Technica", "", "Random Co"];
        for b in brands {
            let once = n.normalize_brand(b);
            assert_eq!(n.normalize_brand(&once), once, "brand {:?}", b);
        }

        let names = [
            ("Sennheiser Sennheiser HD 650", "Sennheiser"),
            ("Sundara (2020)", "HiFiMAN"),
            ("HD 600 Pro SE", "Sennheiser"),
            ("(", "x"),
            ("", ""),
            ("ATH-M50x", "Audio-Technica"),
            ("Senn Heiser HD", "Sennheiser"),
        ];
        for (name, brand) in names {
            for mode in [NameMode::Matching, NameMode::DuplicateKey] {
                let once = n.normalize_model_name(name, brand, mode);
                assert_eq!(n.normalize_model_name(&once, brand, mode), once, "{:?} {:?}", name, mode);
            }
        }
    }

    #[test]
    fn test_empty_input_never_panics() {
        let n = create_test_normalizer();
        assert_eq!(n.normalize_brand(""), "");
        assert_eq!(n.normalize_model_name("", "", NameMode::Matching), "");
        assert_eq!(n.normalize_model_name("", "", NameMode::DuplicateKey), "");
        assert_eq!(n.duplicate_key("", ""), "|");
        assert!(PreparedText::new("").is_empty());
    }

    #[test]
    fn test_duplicate_key() {
        let n = create_test_normalizer();
        assert_eq!(n.duplicate_key("Sennheiser", "HD 650"), "sennheiser|hd650");
        assert_eq!(n.duplicate_key("SENN", "HD650"), "sennheiser|hd650");
    }

    #[test]
    fn test_contains_phrase() {
        assert!(contains_phrase("open back headphones", "open back"));
        assert!(!contains_phrase("openback headphones", "open back"));
        assert!(!contains_phrase("cans", ""));
    }

    #[test]
    fn test_strip_parentheticals() {
        assert_eq!(strip_parentheticals("Sundara (2020)"), "Sundara");
        assert_eq!(strip_parentheticals("HD 650 [refurb] (new"), "HD 650");
        assert_eq!(strip_parentheticals("Arya (Stealth) Magnets"), "Arya Magnets");
    }

    #[test]
    fn test_prepared_text() {
        let p = PreparedText::new("Sennheiser HD 600 excellent condition $220");
        assert_eq!(p.normalized, "sennheiser hd 600 excellent condition 220");
        assert!(p.model_numbers.contains("600"));
        assert!(p.model_numbers.contains("220"));
        assert_eq!(p.tokens.len(), 6);
    }
}
