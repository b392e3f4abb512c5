// 🎧 Catalog Model - Canonical audio-equipment records + marketplace listings
//
// CatalogEntry is owned by the catalog store and is READ-ONLY here.
// Listing is transient input: nothing in this crate persists it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Full-size headphones (over-ear / on-ear)
    #[serde(alias = "headphones")]
    Headphone,

    /// In-ear monitors and earbuds
    #[serde(alias = "iem", alias = "in-ear")]
    InEar,

    /// Stand-alone DAC
    Dac,

    /// Headphone / speaker amplifier
    #[serde(alias = "amp")]
    Amplifier,

    /// Combined DAC + amplifier
    #[serde(alias = "dac/amp", alias = "dac-amp", alias = "combo")]
    DacAmp,

    /// Cables and interconnects
    Cable,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Headphone,
        Category::InEar,
        Category::Dac,
        Category::Amplifier,
        Category::DacAmp,
        Category::Cable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Headphone => "headphone",
            Category::InEar => "in_ear",
            Category::Dac => "dac",
            Category::Amplifier => "amplifier",
            Category::DacAmp => "dac_amp",
            Category::Cable => "cable",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headphone" | "headphones" => Ok(Category::Headphone),
            "in_ear" | "in-ear" | "iem" => Ok(Category::InEar),
            "dac" => Ok(Category::Dac),
            "amplifier" | "amp" => Ok(Category::Amplifier),
            "dac_amp" | "dac/amp" | "dac-amp" | "combo" => Ok(Category::DacAmp),
            "cable" => Ok(Category::Cable),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

// ============================================================================
// CATALOG ENTRY
// ============================================================================

/// One canonical catalog record.
///
/// Every optional field is "data" for quality scoring and merging; `id`,
/// `brand`, `name` and `category` are identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub brand: String,
    pub name: String,
    pub category: Category,

    // ========================================================================
    // PRICING
    // ========================================================================
    /// Lowest observed used-market price
    #[serde(default)]
    pub price_used_min: Option<f64>,

    /// Highest observed used-market price
    #[serde(default)]
    pub price_used_max: Option<f64>,

    /// Manufacturer suggested retail price
    #[serde(default)]
    pub msrp: Option<f64>,

    // ========================================================================
    // EXPERT RATINGS
    // ========================================================================
    /// Overall rank letter grade (e.g. "A-", "S+")
    #[serde(default)]
    pub rank_grade: Option<String>,

    #[serde(default)]
    pub tone_grade: Option<String>,

    #[serde(default)]
    pub technical_grade: Option<String>,

    /// Numeric value rating (0-3 stars)
    #[serde(default)]
    pub value_rating: Option<f64>,

    // ========================================================================
    // TECHNICAL SPECS + MEASUREMENTS
    // ========================================================================
    #[serde(default)]
    pub driver_type: Option<String>,

    #[serde(default)]
    pub fit: Option<String>,

    #[serde(default)]
    pub impedance_ohms: Option<f64>,

    /// Total harmonic distortion, percent
    #[serde(default)]
    pub distortion_thd: Option<f64>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Bare entry with identity only; every data field is null.
    pub fn new(id: i64, brand: &str, name: &str, category: Category) -> Self {
        CatalogEntry {
            id,
            brand: brand.to_string(),
            name: name.to_string(),
            category,
            price_used_min: None,
            price_used_max: None,
            msrp: None,
            rank_grade: None,
            tone_grade: None,
            technical_grade: None,
            value_rating: None,
            driver_type: None,
            fit: None,
            impedance_ohms: None,
            distortion_thd: None,
            updated_at: None,
        }
    }

    pub fn has_observed_pricing(&self) -> bool {
        self.price_used_min.is_some() || self.price_used_max.is_some()
    }

    /// Non-identity data fields as comparable JSON values.
    ///
    /// `updated_at` is bookkeeping, not data, and is left out.
    pub fn data_fields(&self) -> Vec<(&'static str, Option<serde_json::Value>)> {
        fn num(v: Option<f64>) -> Option<serde_json::Value> {
            v.map(|n| serde_json::json!(n))
        }
        fn text(v: &Option<String>) -> Option<serde_json::Value> {
            v.as_ref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| serde_json::json!(s.trim()))
        }

        vec![
            ("price_used_min", num(self.price_used_min)),
            ("price_used_max", num(self.price_used_max)),
            ("msrp", num(self.msrp)),
            ("rank_grade", text(&self.rank_grade)),
            ("tone_grade", text(&self.tone_grade)),
            ("technical_grade", text(&self.technical_grade)),
            ("value_rating", num(self.value_rating)),
            ("driver_type", text(&self.driver_type)),
            ("fit", text(&self.fit)),
            ("impedance_ohms", num(self.impedance_ohms)),
            ("distortion_thd", num(self.distortion_thd)),
        ]
    }

    /// Report a missing brand or name as a data-quality defect.
    pub fn defect(&self) -> Option<DataDefect> {
        if self.brand.trim().is_empty() {
            return Some(DataDefect::new(self.id, "brand", "Brand is empty"));
        }
        if self.name.trim().is_empty() {
            return Some(DataDefect::new(self.id, "name", "Name is empty"));
        }
        None
    }
}

// ============================================================================
// DATA DEFECT
// ============================================================================

/// An entry excluded from matching/grouping because it cannot be compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDefect {
    pub entry_id: i64,
    pub field: String,
    pub issue: String,
}

impl DataDefect {
    pub fn new(entry_id: i64, field: &str, issue: &str) -> Self {
        DataDefect {
            entry_id,
            field: field.to_string(),
            issue: issue.to_string(),
        }
    }
}

/// Split entries into comparable ones and defects.
pub fn partition_entries(entries: &[CatalogEntry]) -> (Vec<&CatalogEntry>, Vec<DataDefect>) {
    let mut valid = Vec::with_capacity(entries.len());
    let mut defects = Vec::new();

    for entry in entries {
        match entry.defect() {
            Some(defect) => defects.push(defect),
            None => valid.push(entry),
        }
    }

    (valid, defects)
}

// ============================================================================
// LISTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Origin channel (e.g. "reddit", "headfi", "ebay")
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub price: Option<f64>,
}

impl Listing {
    pub fn new(title: &str) -> Self {
        Listing {
            title: title.to_string(),
            description: None,
            source: None,
            price: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Title and description as one free-text blob.
    pub fn text(&self) -> String {
        match &self.description {
            Some(desc) if !desc.trim().is_empty() => format!("{} {}", self.title, desc),
            _ => self.title.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("IEM".parse::<Category>().unwrap(), Category::InEar);
        assert_eq!("dac/amp".parse::<Category>().unwrap(), Category::DacAmp);
        assert_eq!("headphone".parse::<Category>().unwrap(), Category::Headphone);
        assert!("speaker".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_aliases() {
        let c: Category = serde_json::from_str("\"iem\"").unwrap();
        assert_eq!(c, Category::InEar);
        assert_eq!(serde_json::to_string(&Category::DacAmp).unwrap(), "\"dac_amp\"");
    }

    #[test]
    fn test_defect_detection() {
        let ok = CatalogEntry::new(1, "Sennheiser", "HD600", Category::Headphone);
        let no_brand = CatalogEntry::new(2, "  ", "HD600", Category::Headphone);
        let no_name = CatalogEntry::new(3, "Sennheiser", "", Category::Headphone);

        assert!(ok.defect().is_none());
        assert_eq!(no_brand.defect().unwrap().field, "brand");
        assert_eq!(no_name.defect().unwrap().field, "name");

        let entries = vec![ok, no_brand, no_name];
        let (valid, defects) = partition_entries(&entries);
        assert_eq!(valid.len(), 1);
        assert_eq!(defects.len(), 2);
    }

    #[test]
    fn test_data_fields_skip_blank_text() {
        let mut entry = CatalogEntry::new(1, "HiFiMAN", "Sundara", Category::Headphone);
        entry.rank_grade = Some("  ".to_string());
        entry.msrp = Some(349.0);

        let fields = entry.data_fields();
        let rank = fields.iter().find(|(n, _)| *n == "rank_grade").unwrap();
        let msrp = fields.iter().find(|(n, _)| *n == "msrp").unwrap();
        assert!(rank.1.is_none());
        assert_eq!(msrp.1, Some(serde_json::json!(349.0)));
    }

    #[test]
    fn test_listing_text() {
        let listing = Listing::new("HD600").with_description("mint, with box");
        assert_eq!(listing.text(), "HD600 mint, with box");
        assert_eq!(Listing::new("HD600").text(), "HD600");
    }
}
