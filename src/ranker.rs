// 🏆 Candidate Ranker - Picks the winning catalog entry for a listing
//
// Ordering is total and never depends on candidate order:
//   score desc → data-quality points desc → catalog id asc
// A winner must score strictly above the confidence threshold.

use crate::catalog::{CatalogEntry, Listing};
use crate::error::{EngineError, EngineResult};
use crate::normalizer::{clean_text, PreparedText};
use crate::quality::QualityScorer;
use crate::scorer::{MatchScorer, ScoreBreakdown};
use crate::store::CatalogStore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.3;

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_id: i64,
    pub brand: String,
    pub name: String,
    pub score: f64,

    /// Data-quality points of the winner (first tie-break)
    pub quality_points: u32,

    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// Listing had no usable text
    EmptyText,

    /// Nothing to score against (no brand mentioned / empty subset)
    NoCandidates,

    /// Every candidate scored 0
    AllScoredZero,

    /// Best candidate did not clear the confidence threshold
    BelowThreshold { best_score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched(MatchResult),
    Unmatched { reason: UnmatchedReason },
}

impl MatchOutcome {
    pub fn matched(&self) -> Option<&MatchResult> {
        match self {
            MatchOutcome::Matched(result) => Some(result),
            MatchOutcome::Unmatched { .. } => None,
        }
    }

    fn unmatched(reason: UnmatchedReason) -> Self {
        MatchOutcome::Unmatched { reason }
    }
}

/// One listing's result inside a batch, tagged with its input position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub index: usize,
    pub title: String,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Matched(MatchResult),
    Unmatched { reason: UnmatchedReason },

    /// Store failure while fetching candidates; distinct from "unmatched"
    Failed { error: String },
}

impl From<EngineResult<MatchOutcome>> for BatchOutcome {
    fn from(result: EngineResult<MatchOutcome>) -> Self {
        match result {
            Ok(MatchOutcome::Matched(m)) => BatchOutcome::Matched(m),
            Ok(MatchOutcome::Unmatched { reason }) => BatchOutcome::Unmatched { reason },
            Err(e) => BatchOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut summary = BatchSummary {
            total: entries.len(),
            ..BatchSummary::default()
        };
        for entry in entries {
            match entry.outcome {
                BatchOutcome::Matched(_) => summary.matched += 1,
                BatchOutcome::Unmatched { .. } => summary.unmatched += 1,
                BatchOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn summary(&self) -> String {
        format!(
            "{} listings: {} matched, {} unmatched, {} failed",
            self.total, self.matched, self.unmatched, self.failed
        )
    }
}

// ============================================================================
// CANDIDATE RANKER
// ============================================================================

#[derive(Debug, Clone)]
pub struct CandidateRanker {
    scorer: MatchScorer,
    quality: QualityScorer,
    threshold: f64,
}

struct Scored<'a> {
    entry: &'a CatalogEntry,
    quality_points: u32,
    breakdown: ScoreBreakdown,
}

impl CandidateRanker {
    pub fn new(scorer: MatchScorer, quality: QualityScorer, threshold: f64) -> Self {
        CandidateRanker {
            scorer,
            quality,
            threshold,
        }
    }

    pub fn scorer(&self) -> &MatchScorer {
        &self.scorer
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Rank a caller-supplied candidate set.
    pub fn match_listing(&self, listing: &Listing, candidates: &[CatalogEntry]) -> MatchOutcome {
        let text = PreparedText::new(&listing.text());
        if text.is_empty() {
            return MatchOutcome::unmatched(UnmatchedReason::EmptyText);
        }
        self.rank(&text, listing.source.as_deref(), candidates)
    }

    /// Fetch candidates for every brand the listing mentions, then rank them.
    ///
    /// Store failures propagate; they are never reported as "unmatched".
    pub fn match_with_store<S>(&self, listing: &Listing, store: &S) -> EngineResult<MatchOutcome>
    where
        S: CatalogStore + ?Sized,
    {
        let text = PreparedText::new(&listing.text());
        if text.is_empty() {
            return Ok(MatchOutcome::unmatched(UnmatchedReason::EmptyText));
        }

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for brand in store.brands()? {
            if !self.scorer.brand_score(&text, &brand).fired() {
                continue;
            }
            // fetch() already ignores case and punctuation
            if seen.insert(clean_text(&brand)) {
                candidates.extend(store.fetch(&brand, None)?);
            }
        }

        debug!(
            "'{}': {} brands mentioned, {} candidates",
            listing.title,
            seen.len(),
            candidates.len()
        );

        Ok(self.rank(&text, listing.source.as_deref(), &candidates))
    }

    /// Match many listings in parallel. Output keeps input order.
    pub fn match_batch<S>(&self, listings: &[Listing], store: &S) -> Vec<BatchEntry>
    where
        S: CatalogStore + ?Sized,
    {
        info!("Matching {} listings", listings.len());

        let entries: Vec<BatchEntry> = listings
            .par_iter()
            .enumerate()
            .map(|(index, listing)| {
                let result = self.match_with_store(listing, store);
                if let Err(EngineError::Store(e)) = &result {
                    warn!("Listing #{} '{}' failed: {}", index, listing.title, e);
                }
                BatchEntry {
                    index,
                    title: listing.title.clone(),
                    outcome: result.into(),
                }
            })
            .collect();

        info!("{}", BatchSummary::from_entries(&entries).summary());
        entries
    }

    fn rank(&self, text: &PreparedText, source: Option<&str>, candidates: &[CatalogEntry]) -> MatchOutcome {
        let mut scored: Vec<Scored> = candidates
            .iter()
            .filter(|e| e.defect().is_none())
            .map(|entry| Scored {
                entry,
                quality_points: 0,
                breakdown: self.scorer.score(text, entry, source),
            })
            .collect();

        if scored.is_empty() {
            return MatchOutcome::unmatched(UnmatchedReason::NoCandidates);
        }

        scored.retain(|s| s.breakdown.total > 0.0);
        if scored.is_empty() {
            return MatchOutcome::unmatched(UnmatchedReason::AllScoredZero);
        }

        for s in &mut scored {
            s.quality_points = self.quality.score(s.entry).points;
        }
        scored.sort_by(compare_scored);

        let best = &scored[0];
        if best.breakdown.total <= self.threshold {
            return MatchOutcome::unmatched(UnmatchedReason::BelowThreshold {
                best_score: best.breakdown.total,
            });
        }

        MatchOutcome::Matched(MatchResult {
            candidate_id: best.entry.id,
            brand: best.entry.brand.clone(),
            name: best.entry.name.clone(),
            score: best.breakdown.total,
            quality_points: best.quality_points,
            breakdown: best.breakdown.clone(),
        })
    }
}

fn compare_scored(a: &Scored, b: &Scored) -> Ordering {
    b.breakdown
        .total
        .total_cmp(&a.breakdown.total)
        .then_with(|| b.quality_points.cmp(&a.quality_points))
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}

// ============================================================================
// TESTS
// ============================================================================
