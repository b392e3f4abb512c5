// 🔍 Duplicate Grouper - Finds catalog entries describing the same product
//
// Two passes, both confined to one (normalized brand, category) bucket:
//   1. Exact key: bucket by "brand|suffix-stripped model", O(n)
//   2. Fuzzy (optional): pairwise key similarity ≥ threshold, joined
//      transitively with union-find. O(k²) in the bucket size k only.
//
// Buckets are independent, so they run in parallel; cancellation is checked
// at every bucket boundary.

use crate::catalog::{partition_entries, CatalogEntry, Category, DataDefect};
use crate::error::{EngineError, EngineResult};
use crate::normalizer::{NameMode, TextNormalizer};
use crate::similarity::similarity_ratio;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

// ============================================================================
// MODES + OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Identical normalized keys only (listing-path checks)
    ExactOnly,

    /// Exact keys, then fuzzy similarity on what is left (full scans)
    ExactAndFuzzy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPass {
    ExactKey,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Duplicate key shared by the members (lowest-id member's key for fuzzy groups)
    pub key: String,

    /// Normalized brand of every member
    pub brand: String,
    pub category: Category,

    /// Two or more entries, ordered by id
    pub members: Vec<CatalogEntry>,

    /// Highest pairwise name similarity among members
    pub max_similarity: f64,

    pub pass: GroupPass,
}

impl DuplicateGroup {
    pub fn member_ids(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.id).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    pub groups: Vec<DuplicateGroup>,

    /// Entries left out because brand or name was missing
    pub defects: Vec<DataDefect>,
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Shared stop signal for long scans; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// UNION-FIND
// ============================================================================

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        DisjointSet {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

// ============================================================================
// DUPLICATE GROUPER
// ============================================================================

#[derive(Debug, Clone)]
pub struct DuplicateGrouper {
    normalizer: TextNormalizer,
    mode: GroupingMode,

    /// Minimum key similarity for the fuzzy pass (default: 0.85)
    fuzzy_threshold: f64,

    /// Process buckets on the rayon pool
    parallel: bool,
}

/// One entry prepared for grouping.
struct Keyed<'a> {
    entry: &'a CatalogEntry,
    model_key: String,
    match_name: String,
}

type BucketKey = (String, Category);

impl DuplicateGrouper {
    pub fn new(normalizer: TextNormalizer, mode: GroupingMode) -> Self {
        DuplicateGrouper {
            normalizer,
            mode,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            parallel: true,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn mode(&self) -> GroupingMode {
        self.mode
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Group without a cancellation handle.
    pub fn group_all(&self, entries: &[CatalogEntry]) -> Grouping {
        match self.group(entries, &CancelFlag::new()) {
            Ok(grouping) => grouping,
            // nothing can set a flag nobody else holds
            Err(_) => Grouping::default(),
        }
    }

    /// Group a catalog snapshot.
    ///
    /// Output is independent of input order: members are sorted by id and
    /// groups by (key, category, first member id).
    pub fn group(&self, entries: &[CatalogEntry], cancel: &CancelFlag) -> EngineResult<Grouping> {
        let (valid, defects) = partition_entries(entries);
        if !defects.is_empty() {
            warn!("Excluded {} entries with missing brand/name", defects.len());
        }

        let mut buckets: BTreeMap<BucketKey, Vec<Keyed>> = BTreeMap::new();
        for entry in valid {
            let keyed = Keyed {
                entry,
                model_key: self.normalizer.normalize_model_name(
                    &entry.name,
                    &entry.brand,
                    NameMode::DuplicateKey,
                ),
                match_name: self.normalizer.normalize_model_name(
                    &entry.name,
                    &entry.brand,
                    NameMode::Matching,
                ),
            };
            buckets
                .entry((self.normalizer.normalize_brand(&entry.brand), entry.category))
                .or_default()
                .push(keyed);
        }

        debug!("{} brand/category buckets", buckets.len());

        let buckets: Vec<(BucketKey, Vec<Keyed>)> = buckets.into_iter().collect();
        let process = |(bucket, members): &(BucketKey, Vec<Keyed>)| -> EngineResult<Vec<DuplicateGroup>> {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            Ok(self.group_bucket(bucket, members))
        };

        let per_bucket: Vec<Vec<DuplicateGroup>> = if self.parallel {
            buckets.par_iter().map(process).collect::<EngineResult<_>>()?
        } else {
            buckets.iter().map(process).collect::<EngineResult<_>>()?
        };

        let mut groups: Vec<DuplicateGroup> = per_bucket.into_iter().flatten().collect();
        groups.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.members[0].id.cmp(&b.members[0].id))
        });

        info!("Found {} duplicate groups", groups.len());

        Ok(Grouping { groups, defects })
    }

    fn group_bucket(&self, (brand, category): &BucketKey, members: &[Keyed]) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();

        // Pass 1: exact key
        let mut by_key: BTreeMap<&str, Vec<&Keyed>> = BTreeMap::new();
        for keyed in members {
            by_key.entry(keyed.model_key.as_str()).or_default().push(keyed);
        }

        let mut leftovers: Vec<&Keyed> = Vec::new();
        for (model_key, mut same) in by_key {
            if same.len() < 2 {
                leftovers.extend(same);
                continue;
            }
            same.sort_by_key(|k| k.entry.id);
            groups.push(DuplicateGroup {
                key: format!("{}|{}", brand, model_key),
                brand: brand.clone(),
                category: *category,
                max_similarity: max_pairwise(&same, |a, b| similarity_ratio(&a.match_name, &b.match_name)),
                members: same.iter().map(|k| k.entry.clone()).collect(),
                pass: GroupPass::ExactKey,
            });
        }

        // Pass 2: fuzzy over entries not already grouped
        if self.mode == GroupingMode::ExactAndFuzzy && leftovers.len() >= 2 {
            leftovers.sort_by_key(|k| k.entry.id);
            groups.extend(self.fuzzy_groups(brand, *category, &leftovers));
        }

        groups
    }

    fn fuzzy_groups(&self, brand: &str, category: Category, members: &[&Keyed]) -> Vec<DuplicateGroup> {
        let mut set = DisjointSet::new(members.len());
        let mut edges = Vec::new();

        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let sim = similarity_ratio(&members[i].model_key, &members[j].model_key);
                if sim >= self.fuzzy_threshold {
                    set.union(i, j);
                    edges.push((i, sim));
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..members.len() {
            let root = set.find(i);
            components.entry(root).or_default().push(i);
        }

        let mut best: BTreeMap<usize, f64> = BTreeMap::new();
        for (i, sim) in edges {
            let root = set.find(i);
            let slot = best.entry(root).or_insert(0.0);
            *slot = slot.max(sim);
        }

        components
            .into_iter()
            .filter(|(_, idx)| idx.len() >= 2)
            .map(|(root, idx)| {
                // members are id-sorted, so idx[0] is the lowest id
                let first = members[idx[0]];
                DuplicateGroup {
                    key: format!("{}|{}", brand, first.model_key),
                    brand: brand.to_string(),
                    category,
                    members: idx.iter().map(|&i| members[i].entry.clone()).collect(),
                    max_similarity: best.get(&root).copied().unwrap_or(0.0),
                    pass: GroupPass::Fuzzy,
                }
            })
            .collect()
    }
}

fn max_pairwise<T, F>(items: &[T], sim: F) -> f64
where
    F: Fn(&T, &T) -> f64,
{
    let mut best: f64 = 0.0;
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            best = best.max(sim(&items[i], &items[j]));
        }
    }
    best
}

// ============================================================================
// TESTS
// ============================================================================
