// 🔀 Merge Resolver - Turns a duplicate group into a reviewable recommendation
//
// Canonical order (total):
//   quality points desc → has observed pricing → most recent update → id asc
// When the top two agree on everything but id AND hold conflicting values,
// the group is flagged for manual resolution instead of picking one.
//
// Output is advice only. Nothing here deletes or rewrites catalog rows.

use crate::catalog::CatalogEntry;
use crate::grouper::DuplicateGroup;
use crate::normalizer::strip_parentheticals;
use crate::quality::{QualityScore, QualityScorer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// MERGE ACTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeAction {
    /// Same literal name, duplicates add nothing: delete them
    Delete,

    /// Same literal name, duplicates hold unique values: merge, then delete
    Merge,

    /// Names differ and so does the data: may be distinct SKUs
    Research,

    /// Names differ but no member adds data
    MergeOrDelete,

    /// Canonical pick is a coin flip between conflicting members
    ManualResolution,
}

impl MergeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::Delete => "DELETE",
            MergeAction::Merge => "MERGE",
            MergeAction::Research => "RESEARCH",
            MergeAction::MergeOrDelete => "MERGE_OR_DELETE",
            MergeAction::ManualResolution => "MANUAL_RESOLUTION",
        }
    }
}

// ============================================================================
// MERGE PLAN + RECOMMENDATION
// ============================================================================

/// Non-destructive proposal for a merge executor to apply after human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePlan {
    pub canonical_id: i64,
    pub delete_ids: Vec<i64>,

    /// Canonical entry with merged field values
    pub merged: CatalogEntry,

    /// Fields whose merged value differs from the canonical's own
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecommendation {
    pub action: MergeAction,

    /// None only for manual resolution
    pub canonical_id: Option<i64>,

    /// Present for DELETE, MERGE and MERGE_OR_DELETE
    pub plan: Option<MergePlan>,

    pub reason: String,
}

// ============================================================================
// MERGE RESOLVER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    quality: QualityScorer,
}

impl MergeResolver {
    pub fn new(quality: QualityScorer) -> Self {
        MergeResolver { quality }
    }

    /// Score every member, then resolve. Scores come back in member order.
    pub fn score_and_resolve(&self, group: &DuplicateGroup) -> (Vec<QualityScore>, MergeRecommendation) {
        let scores = self.quality.score_batch(&group.members);
        let recommendation = self.resolve(group, &scores);
        (scores, recommendation)
    }

    /// Resolve a group given each member's quality score (same order as
    /// `group.members`; a missing score counts as 0 points).
    pub fn resolve(&self, group: &DuplicateGroup, scores: &[QualityScore]) -> MergeRecommendation {
        let mut ranked: Vec<(&CatalogEntry, u32)> = group
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| (m, scores.get(i).map_or(0, |s| s.points)))
            .collect();
        ranked.sort_by(|a, b| canonical_order(a, b));

        if ranked.len() < 2 {
            return MergeRecommendation {
                action: MergeAction::Delete,
                canonical_id: ranked.first().map(|(e, _)| e.id),
                plan: None,
                reason: "Group has a single member; nothing to merge".to_string(),
            };
        }

        let (top, runner_up) = (ranked[0], ranked[1]);
        if ties_except_id(top, runner_up) && conflicting(top.0, runner_up.0) {
            return MergeRecommendation {
                action: MergeAction::ManualResolution,
                canonical_id: None,
                plan: None,
                reason: format!(
                    "Entries {} and {} tie on quality, pricing and update time but hold conflicting values",
                    top.0.id, runner_up.0.id
                ),
            };
        }

        let ordered: Vec<&CatalogEntry> = ranked.iter().map(|(e, _)| *e).collect();
        let canonical = ordered[0];
        let others = &ordered[1..];

        let same_name = others
            .iter()
            .all(|o| literal_name(&o.name) == literal_name(&canonical.name));
        let unique_data = others.iter().any(|o| has_unique_data(o, canonical));

        let action = match (same_name, unique_data) {
            (true, false) => MergeAction::Delete,
            (true, true) => MergeAction::Merge,
            (false, true) => MergeAction::Research,
            (false, false) => MergeAction::MergeOrDelete,
        };

        let reason = match action {
            MergeAction::Delete => "Identical names; duplicates add no data".to_string(),
            MergeAction::Merge => "Identical names; duplicates hold unique values".to_string(),
            MergeAction::Research => {
                "Names differ and members carry differing data; may be distinct SKUs".to_string()
            }
            _ => "Names differ but no member adds data".to_string(),
        };

        let plan = match action {
            MergeAction::Research | MergeAction::ManualResolution => None,
            _ => Some(build_plan(&ordered)),
        };

        MergeRecommendation {
            action,
            canonical_id: Some(canonical.id),
            plan,
            reason,
        }
    }
}

fn canonical_order(a: &(&CatalogEntry, u32), b: &(&CatalogEntry, u32)) -> Ordering {
    b.1.cmp(&a.1)
        .then_with(|| b.0.has_observed_pricing().cmp(&a.0.has_observed_pricing()))
        .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

fn ties_except_id(a: (&CatalogEntry, u32), b: (&CatalogEntry, u32)) -> bool {
    a.1 == b.1
        && a.0.has_observed_pricing() == b.0.has_observed_pricing()
        && a.0.updated_at == b.0.updated_at
}

/// Both entries hold a value for some field, and the values differ.
fn conflicting(a: &CatalogEntry, b: &CatalogEntry) -> bool {
    a.data_fields()
        .into_iter()
        .zip(b.data_fields())
        .any(|((_, x), (_, y))| matches!((x, y), (Some(x), Some(y)) if x != y))
}

/// `other` holds a non-null value the canonical lacks or disagrees with.
fn has_unique_data(other: &CatalogEntry, canonical: &CatalogEntry) -> bool {
    other
        .data_fields()
        .into_iter()
        .zip(canonical.data_fields())
        .any(|((_, mine), (_, theirs))| match mine {
            Some(value) => theirs.as_ref() != Some(&value),
            None => false,
        })
}

/// Name as written, minus case, punctuation and "(...)" qualifiers.
fn literal_name(name: &str) -> String {
    strip_parentheticals(name)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

// ============================================================================
// FIELD MERGE
// ============================================================================

fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        *target = source.clone();
    }
}

fn fill_text(target: &mut Option<String>, source: &Option<String>) {
    let blank = target.as_ref().map_or(true, |s| s.trim().is_empty());
    let usable = source.as_ref().filter(|s| !s.trim().is_empty());
    if blank {
        if let Some(value) = usable {
            *target = Some(value.clone());
        }
    }
}

/// First non-null value per field in canonical order; price range takes the
/// union of every member's range.
fn build_plan(ordered: &[&CatalogEntry]) -> MergePlan {
    let canonical = ordered[0];
    let mut merged = canonical.clone();

    for other in &ordered[1..] {
        fill(&mut merged.msrp, &other.msrp);
        fill_text(&mut merged.rank_grade, &other.rank_grade);
        fill_text(&mut merged.tone_grade, &other.tone_grade);
        fill_text(&mut merged.technical_grade, &other.technical_grade);
        fill(&mut merged.value_rating, &other.value_rating);
        fill_text(&mut merged.driver_type, &other.driver_type);
        fill_text(&mut merged.fit, &other.fit);
        fill(&mut merged.impedance_ohms, &other.impedance_ohms);
        fill(&mut merged.distortion_thd, &other.distortion_thd);
    }

    merged.price_used_min = ordered
        .iter()
        .filter_map(|e| e.price_used_min)
        .reduce(f64::min);
    merged.price_used_max = ordered
        .iter()
        .filter_map(|e| e.price_used_max)
        .reduce(f64::max);

    let changed_fields = merged
        .data_fields()
        .into_iter()
        .zip(canonical.data_fields())
        .filter(|((_, new), (_, old))| new != old)
        .map(|((name, _), _)| name.to_string())
        .collect();

    MergePlan {
        canonical_id: canonical.id,
        delete_ids: ordered[1..].iter().map(|e| e.id).collect(),
        merged,
        changed_fields,
    }
}

// ============================================================================
// TESTS
// ============================================================================
