// 🗄️ Catalog Store - Read-only collaborator the engine pulls entries from
//
// The engine never writes catalog rows. Store failures are errors, never
// "no candidates": callers must be able to tell the two apart.

use crate::catalog::{CatalogEntry, Category};
use crate::normalizer::clean_text;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend cannot be reached (locked, closed, missing file)
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),

    #[error("catalog query failed: {0}")]
    Query(String),

    /// A stored row could not be turned into a CatalogEntry
    #[error("bad catalog row: {0}")]
    Decode(String),
}

/// Source of catalog entries for matching and duplicate scans.
pub trait CatalogStore: Send + Sync {
    /// Distinct brand spellings present in the catalog
    fn brands(&self) -> Result<Vec<String>, StoreError>;

    /// Entries of one brand (case/punctuation-insensitive), optionally one category
    fn fetch(&self, brand: &str, category: Option<Category>) -> Result<Vec<CatalogEntry>, StoreError>;

    /// Snapshot of every entry, ordered by id
    fn scan(&self) -> Result<Vec<CatalogEntry>, StoreError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    entries: Vec<CatalogEntry>,
}

impl MemoryCatalogStore {
    pub fn new(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by_key(|e| e.id);
        MemoryCatalogStore { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn brands(&self) -> Result<Vec<String>, StoreError> {
        let brands: BTreeSet<&str> = self
            .entries
            .iter()
            .map(|e| e.brand.trim())
            .filter(|b| !b.is_empty())
            .collect();
        Ok(brands.into_iter().map(String::from).collect())
    }

    fn fetch(&self, brand: &str, category: Option<Category>) -> Result<Vec<CatalogEntry>, StoreError> {
        let wanted = clean_text(brand);
        Ok(self
            .entries
            .iter()
            .filter(|e| clean_text(&e.brand) == wanted)
            .filter(|e| category.map_or(true, |c| e.category == c))
            .cloned()
            .collect())
    }

    fn scan(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        Ok(self.entries.clone())
    }
}
