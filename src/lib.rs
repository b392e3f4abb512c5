// Catalog Match - Core Library
// Listing-to-catalog matching and duplicate-merge recommendations for the
// audio-gear catalog. Exposes all modules for the CLI, API server, and tests.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod grouper;    // Duplicate grouping: exact key + fuzzy pass
pub mod merge;      // Canonical selection and merge plans
pub mod normalizer;
pub mod quality;    // Data-quality points per entry
pub mod ranker;     // Candidate ranking + batch matching
pub mod rules;      // Data-driven scoring rules
pub mod scan;       // Full-catalog duplicate scan + report export
pub mod scorer;
pub mod similarity;
pub mod store;
pub mod tables;

// Re-export commonly used types
pub use catalog::{partition_entries, CatalogEntry, Category, DataDefect, Listing};
pub use config::EngineConfig;
pub use db::{
    count_entries, get_all_entries, get_entries_by_brand, get_events_for_entity, insert_entries,
    insert_event, load_catalog_csv, load_listings_csv, record_match_events, record_scan_event,
    setup_database, Event, ImportStats, SqliteCatalogStore,
};
pub use error::{EngineError, EngineResult};
pub use grouper::{CancelFlag, DuplicateGroup, DuplicateGrouper, GroupPass, Grouping, GroupingMode};
pub use merge::{MergeAction, MergePlan, MergeRecommendation, MergeResolver};
pub use normalizer::{NameMode, PreparedText, TextNormalizer};
pub use quality::{QualityIssue, QualityScore, QualityScorer, Severity};
pub use ranker::{
    BatchEntry, BatchOutcome, BatchSummary, CandidateRanker, MatchOutcome, MatchResult,
    UnmatchedReason,
};
pub use rules::{RuleOutcome, RuleSet, ScoreRule, SignalRules};
pub use scan::{catalog_fingerprint, DuplicateScanner, GroupReview, MemberReview, ScanReport};
pub use scorer::{MatchScorer, ScoreBreakdown, ScoreWeights, SourceBonus};
pub use similarity::{extract_model_numbers, levenshtein_distance, similarity_ratio};
pub use store::{CatalogStore, MemoryCatalogStore, StoreError};
pub use tables::{AliasTable, CategoryKeywordTable, EngineTables, SourcePatternTable};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
