// 📋 Duplicate Scan - Whole-catalog grouping + merge advice for human review
//
// One consistent snapshot in, one report out. Re-running on unchanged data
// yields the same fingerprint, groups and recommendations.

use crate::catalog::{CatalogEntry, Category, DataDefect};
use crate::error::{EngineError, EngineResult};
use crate::grouper::{CancelFlag, DuplicateGroup, DuplicateGrouper, GroupPass, GroupingMode};
use crate::merge::{MergeAction, MergeRecommendation, MergeResolver};
use crate::quality::QualityScore;
use crate::store::CatalogStore;
use anyhow::{Context as AnyhowContext, Result};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReview {
    pub id: i64,
    pub brand: String,
    pub name: String,
    pub quality_points: u32,
    pub quality_percentage: f64,
    pub is_canonical: bool,
    pub to_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReview {
    pub key: String,
    pub brand: String,
    pub category: Category,
    pub pass: GroupPass,
    pub max_similarity: f64,
    pub members: Vec<MemberReview>,
    pub action: MergeAction,
    pub canonical_id: Option<i64>,
    pub delete_ids: Vec<i64>,

    /// Merged canonical record, when the action carries a plan
    pub merged: Option<CatalogEntry>,
    pub changed_fields: Vec<String>,
    pub reason: String,
}

impl GroupReview {
    fn new(group: &DuplicateGroup, scores: &[QualityScore], rec: MergeRecommendation) -> Self {
        let delete_ids: Vec<i64> = rec
            .plan
            .as_ref()
            .map(|p| p.delete_ids.clone())
            .unwrap_or_default();

        let members = group
            .members
            .iter()
            .zip(scores)
            .map(|(entry, score)| MemberReview {
                id: entry.id,
                brand: entry.brand.clone(),
                name: entry.name.clone(),
                quality_points: score.points,
                quality_percentage: score.percentage,
                is_canonical: rec.canonical_id == Some(entry.id),
                to_delete: delete_ids.contains(&entry.id),
            })
            .collect();

        let (merged, changed_fields) = match rec.plan {
            Some(plan) => (Some(plan.merged), plan.changed_fields),
            None => (None, Vec::new()),
        };

        GroupReview {
            key: group.key.clone(),
            brand: group.brand.clone(),
            category: group.category,
            pass: group.pass,
            max_similarity: group.max_similarity,
            members,
            action: rec.action,
            canonical_id: rec.canonical_id,
            delete_ids,
            merged,
            changed_fields,
            reason: rec.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// RFC3339
    pub generated_at: String,

    /// SHA-256 over the snapshot, entries in id order
    pub catalog_fingerprint: String,
    pub entry_count: usize,
    pub mode: GroupingMode,
    pub defects: Vec<DataDefect>,
    pub groups: Vec<GroupReview>,
}

/// One CSV row per group member
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    group_key: &'a str,
    category: Category,
    pass: GroupPass,
    action: &'static str,
    member_id: i64,
    brand: &'a str,
    name: &'a str,
    quality_points: u32,
    is_canonical: bool,
    to_delete: bool,
    reason: &'a str,
}

impl ScanReport {
    pub fn summary(&self) -> String {
        let count = |action: MergeAction| self.groups.iter().filter(|g| g.action == action).count();
        format!(
            "{} entries, {} groups ({} delete, {} merge, {} research, {} merge-or-delete, {} manual), {} defects",
            self.entry_count,
            self.groups.len(),
            count(MergeAction::Delete),
            count(MergeAction::Merge),
            count(MergeAction::Research),
            count(MergeAction::MergeOrDelete),
            count(MergeAction::ManualResolution),
            self.defects.len()
        )
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize scan report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report: {:?}", path))
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        for group in &self.groups {
            for member in &group.members {
                writer
                    .serialize(CsvRow {
                        group_key: &group.key,
                        category: group.category,
                        pass: group.pass,
                        action: group.action.as_str(),
                        member_id: member.id,
                        brand: &member.brand,
                        name: &member.name,
                        quality_points: member.quality_points,
                        is_canonical: member.is_canonical,
                        to_delete: member.to_delete,
                        reason: &group.reason,
                    })
                    .context("Failed to write CSV row")?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
        String::from_utf8(bytes).context("CSV output is not UTF-8")
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv()?)
            .with_context(|| format!("Failed to write report: {:?}", path))
    }
}

/// Stable digest of a catalog snapshot.
pub fn catalog_fingerprint(entries: &[CatalogEntry]) -> String {
    let mut sorted: Vec<&CatalogEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.id);

    let mut hasher = Sha256::new();
    for entry in sorted {
        // serializing a plain struct of strings/numbers cannot fail
        if let Ok(bytes) = serde_json::to_vec(entry) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// DUPLICATE SCANNER
// ============================================================================

#[derive(Debug, Clone)]
pub struct DuplicateScanner {
    grouper: DuplicateGrouper,
    resolver: MergeResolver,
}

impl DuplicateScanner {
    pub fn new(grouper: DuplicateGrouper, resolver: MergeResolver) -> Self {
        DuplicateScanner { grouper, resolver }
    }

    /// Read one snapshot from the store and scan it.
    pub fn run<S>(&self, store: &S, cancel: &CancelFlag) -> EngineResult<ScanReport>
    where
        S: CatalogStore + ?Sized,
    {
        let entries = store.scan()?;
        self.scan_entries(&entries, cancel)
    }

    /// Scan an already-loaded snapshot.
    pub fn scan_entries(&self, entries: &[CatalogEntry], cancel: &CancelFlag) -> EngineResult<ScanReport> {
        info!("Scanning {} catalog entries ({:?})", entries.len(), self.grouper.mode());

        let grouping = self.grouper.group(entries, cancel)?;

        let groups: Vec<GroupReview> = grouping
            .groups
            .par_iter()
            .map(|group| {
                let (scores, rec) = self.resolver.score_and_resolve(group);
                GroupReview::new(group, &scores, rec)
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let report = ScanReport {
            generated_at: Utc::now().to_rfc3339(),
            catalog_fingerprint: catalog_fingerprint(entries),
            entry_count: entries.len(),
            mode: self.grouper.mode(),
            defects: grouping.defects,
            groups,
        };

        info!("{}", report.summary());
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
