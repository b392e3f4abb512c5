// ✅ Data Quality Scorer - Completeness points per catalog entry
//
// Fixed point weights per populated field (100 points total):
//
//   pricing              used_min 5, used_max 5, msrp 5          = 15
//   expert ratings       rank 15, tone 10, technical 10, value 15 = 50
//   measurements         distortion (THD) 10                      = 10
//   technical specs      driver 5, fit 5, impedance 5             = 15
//   recency              updated within the window                = 10
//
// Expert ratings weigh the most: they are the most expensive data to source.
// Scores only ever add points, so filling in a null field never lowers one.

use crate::catalog::CatalogEntry;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECENCY_WINDOW_DAYS: i64 = 180;

/// Longest accepted recency window (100 years)
pub const MAX_RECENCY_WINDOW_DAYS: i64 = 36_500;

pub const MAX_POINTS: u32 = 100;

const RECENCY_POINTS: u32 = 10;

// ============================================================================
// QUALITY SCORE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub points: u32,
    pub max_points: u32,

    /// points / max_points × 100
    pub percentage: f64,

    /// Missing fields, with the points each would add
    pub issues: Vec<QualityIssue>,
}

impl QualityScore {
    pub fn summary(&self) -> String {
        format!(
            "Quality: {}/{} ({:.1}%), {} missing ({} expert)",
            self.points,
            self.max_points,
            self.percentage,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Warning)
                .count()
        )
    }

    pub fn is_high_quality(&self) -> bool {
        self.percentage >= 80.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub points_available: u32,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning, // Expert data missing: hardest to source, biggest gap
    Info,    // Data is valid but could be more complete
}

// ============================================================================
// QUALITY SCORER
// ============================================================================

#[derive(Debug, Clone)]
pub struct QualityScorer {
    /// Entries updated on/after `as_of - recency_window` earn the recency bonus
    recency_window: Duration,

    /// Reference instant; fixed per scorer so a whole scan agrees on "recent"
    as_of: DateTime<Utc>,
}

impl QualityScorer {
    pub fn new() -> Self {
        QualityScorer::with_window(DEFAULT_RECENCY_WINDOW_DAYS, Utc::now())
    }

    /// Window is clamped to [0, MAX_RECENCY_WINDOW_DAYS].
    pub fn with_window(recency_days: i64, as_of: DateTime<Utc>) -> Self {
        QualityScorer {
            recency_window: Duration::days(recency_days.clamp(0, MAX_RECENCY_WINDOW_DAYS)),
            as_of,
        }
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Score one entry
    pub fn score(&self, entry: &CatalogEntry) -> QualityScore {
        let mut points = 0;
        let mut issues = Vec::new();

        let fields = entry.data_fields();
        let present = |name: &str| {
            fields
                .iter()
                .any(|(field, value)| *field == name && value.is_some())
        };

        for (field, weight, severity, recommendation) in FIELD_WEIGHTS {
            if present(*field) {
                points += *weight;
            } else {
                issues.push(QualityIssue {
                    severity: *severity,
                    field: field.to_string(),
                    points_available: *weight,
                    recommendation: recommendation.to_string(),
                });
            }
        }

        // Rule: recency bonus
        if self.is_recent(entry) {
            points += RECENCY_POINTS;
        } else {
            issues.push(QualityIssue {
                severity: Severity::Info,
                field: "updated_at".to_string(),
                points_available: RECENCY_POINTS,
                recommendation: format!(
                    "Refresh entry (not updated in the last {} days)",
                    self.recency_window.num_days()
                ),
            });
        }

        QualityScore {
            points,
            max_points: MAX_POINTS,
            percentage: points as f64 / MAX_POINTS as f64 * 100.0,
            issues,
        }
    }

    /// Batch score multiple entries
    pub fn score_batch(&self, entries: &[CatalogEntry]) -> Vec<QualityScore> {
        entries.iter().map(|e| self.score(e)).collect()
    }

    fn is_recent(&self, entry: &CatalogEntry) -> bool {
        entry
            .updated_at
            .map(|ts| {
                self.as_of
                    .checked_sub_signed(self.recency_window)
                    .map_or(true, |start| ts >= start)
            })
            .unwrap_or(false)
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// (field, points, severity when missing, recommendation)
const FIELD_WEIGHTS: &[(&str, u32, Severity, &str)] = &[
    ("price_used_min", 5, Severity::Info, "Record lowest observed used price"),
    ("price_used_max", 5, Severity::Info, "Record highest observed used price"),
    ("msrp", 5, Severity::Info, "Add manufacturer retail price"),
    ("rank_grade", 15, Severity::Warning, "Add overall rank grade"),
    ("tone_grade", 10, Severity::Warning, "Add tonality grade"),
    ("technical_grade", 10, Severity::Warning, "Add technical grade"),
    ("value_rating", 15, Severity::Warning, "Add value rating"),
    ("distortion_thd", 10, Severity::Info, "Attach distortion measurement"),
    ("driver_type", 5, Severity::Info, "Add driver type"),
    ("fit", 5, Severity::Info, "Add fit / form factor"),
    ("impedance_ohms", 5, Severity::Info, "Add impedance"),
];

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use chrono::TimeZone;

    fn create_test_scorer() -> QualityScorer {
        let as_of = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        QualityScorer::with_window(180, as_of)
    }

    fn create_complete_entry() -> CatalogEntry {
        let mut e = CatalogEntry::new(1, "Sennheiser", "HD600", Category::Headphone);
        e.price_used_min = Some(200.0);
        e.price_used_max = Some(280.0);
        e.msrp = Some(399.0);
        e.rank_grade = Some("A-".to_string());
        e.tone_grade = Some("A".to_string());
        e.technical_grade = Some("B+".to_string());
        e.value_rating = Some(2.5);
        e.distortion_thd = Some(0.1);
        e.driver_type = Some("Dynamic".to_string());
        e.fit = Some("Over-ear".to_string());
        e.impedance_ohms = Some(300.0);
        e.updated_at = Some(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        e
    }

    #[test]
    fn test_weights_sum_to_max() {
        let total: u32 = FIELD_WEIGHTS.iter().map(|(_, w, _, _)| w).sum::<u32>() + RECENCY_POINTS;
        assert_eq!(total, MAX_POINTS);
    }

    #[test]
    fn test_complete_entry_scores_full() {
        let scorer = create_test_scorer();
        let score = scorer.score(&create_complete_entry());

        println!("Score: {}", score.summary());

        assert_eq!(score.points, 100);
        assert_eq!(score.percentage, 100.0);
        assert!(score.issues.is_empty());
        assert!(score.is_high_quality());
    }

    #[test]
    fn test_bare_entry_scores_zero() {
        let scorer = create_test_scorer();
        let score = scorer.score(&CatalogEntry::new(1, "HiFiMAN", "Sundara", Category::Headphone));

        assert_eq!(score.points, 0);
        assert_eq!(score.issues.len(), FIELD_WEIGHTS.len() + 1);
        assert!(score
            .issues
            .iter()
            .any(|i| i.field == "rank_grade" && i.severity == Severity::Warning));
    }

    #[test]
    fn test_expert_grades_weigh_most() {
        let scorer = create_test_scorer();
        let mut graded = CatalogEntry::new(1, "HiFiMAN", "Sundara", Category::Headphone);
        graded.rank_grade = Some("B".to_string());
        let mut priced = CatalogEntry::new(2, "HiFiMAN", "Sundara", Category::Headphone);
        priced.price_used_min = Some(180.0);
        priced.price_used_max = Some(220.0);

        assert!(scorer.score(&graded).points > scorer.score(&priced).points);
    }

    #[test]
    fn test_recency_window() {
        let scorer = create_test_scorer();
        let mut e = CatalogEntry::new(1, "Schiit", "Magni", Category::Amplifier);

        e.updated_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(scorer.score(&e).points, 10);

        e.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(scorer.score(&e).points, 0);
    }

    #[test]
    fn test_huge_recency_window_is_clamped() {
        let as_of = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let scorer = QualityScorer::with_window(i64::MAX, as_of);
        let mut e = CatalogEntry::new(1, "Schiit", "Magni", Category::Amplifier);

        e.updated_at = Some(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(scorer.score(&e).points, 10);

        e.updated_at = Some(Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(scorer.score(&e).points, 0);
    }

    #[test]
    fn test_blank_text_is_not_populated() {
        let scorer = create_test_scorer();
        let mut e = CatalogEntry::new(1, "Schiit", "Magni", Category::Amplifier);
        e.fit = Some("   ".to_string());
        assert_eq!(scorer.score(&e).points, 0);
    }

    #[test]
    fn test_monotonic_when_filling_fields() {
        let scorer = create_test_scorer();
        let complete = create_complete_entry();
        let mut entry = CatalogEntry::new(1, "Sennheiser", "HD600", Category::Headphone);
        let mut last = scorer.score(&entry).points;

        // fill one field at a time, in an arbitrary order
        let steps: Vec<fn(&mut CatalogEntry, &CatalogEntry)> = vec![
            |e, c| e.impedance_ohms = c.impedance_ohms,
            |e, c| e.rank_grade = c.rank_grade.clone(),
            |e, c| e.updated_at = c.updated_at,
            |e, c| e.price_used_max = c.price_used_max,
            |e, c| e.value_rating = c.value_rating,
            |e, c| e.distortion_thd = c.distortion_thd,
            |e, c| e.fit = c.fit.clone(),
            |e, c| e.tone_grade = c.tone_grade.clone(),
            |e, c| e.msrp = c.msrp,
            |e, c| e.driver_type = c.driver_type.clone(),
            |e, c| e.technical_grade = c.technical_grade.clone(),
            |e, c| e.price_used_min = c.price_used_min,
        ];
        for step in &steps {
            step(&mut entry, &complete);
            let points = scorer.score(&entry).points;
            assert!(points >= last);
            last = points;
        }
        assert_eq!(last, MAX_POINTS);
    }

    #[test]
    fn test_deterministic() {
        let scorer = create_test_scorer();
        let entry = create_complete_entry();
        assert_eq!(scorer.score(&entry), scorer.score(&entry));
    }
}
