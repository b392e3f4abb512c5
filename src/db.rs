// 💾 SQLite Catalog Store - Schema, CSV import, audit trail
//
// The engine only reads catalog rows through CatalogStore. Writes happen
// here, in import, and in the append-only events table.

use crate::catalog::{CatalogEntry, Category, Listing};
use crate::normalizer::clean_text;
use crate::ranker::{BatchEntry, BatchOutcome};
use crate::scan::ScanReport;
use crate::store::{CatalogStore, StoreError};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const ENTRY_COLUMNS: &str = "id, brand, name, category,
    price_used_min, price_used_max, msrp,
    rank_grade, tone_grade, technical_grade, value_rating,
    driver_type, fit, impedance_ohms, distortion_thd, updated_at";

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail: every match decision and scan is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Stable id for a listing: listings are transient and carry no id of their own
pub fn listing_key(title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(clean_text(title));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // brand_key is clean_text(brand), so brand lookups ignore case and punctuation
    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_entries (
            id INTEGER PRIMARY KEY,
            brand TEXT NOT NULL,
            brand_key TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            price_used_min REAL,
            price_used_max REAL,
            msrp REAL,
            rank_grade TEXT,
            tone_grade TEXT,
            technical_grade TEXT,
            value_rating REAL,
            driver_type TEXT,
            fit TEXT,
            impedance_ohms REAL,
            distortion_thd REAL,
            updated_at TEXT,
            content_hash TEXT NOT NULL,
            imported_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_brand ON catalog_entries(brand_key, category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Catalog CSV: header row with CatalogEntry field names; blank cells are null
pub fn load_catalog_csv(csv_path: &Path) -> Result<Vec<CatalogEntry>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open catalog CSV: {:?}", csv_path))?;

    let mut entries = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let entry: CatalogEntry = result
            .with_context(|| format!("Failed to deserialize catalog row {}", line + 2))?;
        entries.push(entry);
    }

    debug!(count = entries.len(), path = ?csv_path, "loaded catalog CSV");
    Ok(entries)
}

/// Listings CSV: `title,description,source,price`
pub fn load_listings_csv(csv_path: &Path) -> Result<Vec<Listing>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open listings CSV: {:?}", csv_path))?;

    let listings = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<Listing>, _>>()
        .context("Failed to deserialize listing")?;

    debug!(count = listings.len(), path = ?csv_path, "loaded listings CSV");
    Ok(listings)
}

// ============================================================================
// IMPORT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Content hash for change detection on re-import
fn entry_hash(entry: &CatalogEntry) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(entry)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Upsert entries by id. Re-importing the same file changes nothing.
pub fn insert_entries(conn: &Connection, entries: &[CatalogEntry]) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for entry in entries {
        let hash = entry_hash(entry)?;

        let existing: Option<String> = match conn.query_row(
            "SELECT content_hash FROM catalog_entries WHERE id = ?1",
            params![entry.id],
            |row| row.get(0),
        ) {
            Ok(h) => Some(h),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let event_type = match existing {
            Some(ref h) if *h == hash => {
                stats.unchanged += 1;
                continue;
            }
            Some(_) => {
                stats.updated += 1;
                "entry_updated"
            }
            None => {
                stats.inserted += 1;
                "entry_imported"
            }
        };

        conn.execute(
            "INSERT INTO catalog_entries (
                id, brand, brand_key, name, category,
                price_used_min, price_used_max, msrp,
                rank_grade, tone_grade, technical_grade, value_rating,
                driver_type, fit, impedance_ohms, distortion_thd, updated_at,
                content_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(id) DO UPDATE SET
                brand = excluded.brand,
                brand_key = excluded.brand_key,
                name = excluded.name,
                category = excluded.category,
                price_used_min = excluded.price_used_min,
                price_used_max = excluded.price_used_max,
                msrp = excluded.msrp,
                rank_grade = excluded.rank_grade,
                tone_grade = excluded.tone_grade,
                technical_grade = excluded.technical_grade,
                value_rating = excluded.value_rating,
                driver_type = excluded.driver_type,
                fit = excluded.fit,
                impedance_ohms = excluded.impedance_ohms,
                distortion_thd = excluded.distortion_thd,
                updated_at = excluded.updated_at,
                content_hash = excluded.content_hash",
            params![
                entry.id,
                entry.brand,
                clean_text(&entry.brand),
                entry.name,
                entry.category.as_str(),
                entry.price_used_min,
                entry.price_used_max,
                entry.msrp,
                entry.rank_grade,
                entry.tone_grade,
                entry.technical_grade,
                entry.value_rating,
                entry.driver_type,
                entry.fit,
                entry.impedance_ohms,
                entry.distortion_thd,
                entry.updated_at.map(|dt| dt.to_rfc3339()),
                hash,
            ],
        )?;

        let event = Event::new(
            event_type,
            "catalog_entry",
            &entry.id.to_string(),
            serde_json::json!({
                "brand": entry.brand,
                "name": entry.name,
                "category": entry.category,
            }),
            "csv_importer",
        );
        insert_event(conn, &event)?;
    }

    info!(
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged,
        "catalog import finished"
    );
    Ok(stats)
}

// ============================================================================
// QUERIES
// ============================================================================

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let category_str: String = row.get(3)?;
    let category: Category = category_str
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

    let updated_at_str: Option<String> = row.get(15)?;
    let updated_at = updated_at_str
        .map(|s| DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?
        .map(|dt| dt.with_timezone(&Utc));

    Ok(CatalogEntry {
        id: row.get(0)?,
        brand: row.get(1)?,
        name: row.get(2)?,
        category,
        price_used_min: row.get(4)?,
        price_used_max: row.get(5)?,
        msrp: row.get(6)?,
        rank_grade: row.get(7)?,
        tone_grade: row.get(8)?,
        technical_grade: row.get(9)?,
        value_rating: row.get(10)?,
        driver_type: row.get(11)?,
        fit: row.get(12)?,
        impedance_ohms: row.get(13)?,
        distortion_thd: row.get(14)?,
        updated_at,
    })
}

fn query_all(conn: &Connection) -> rusqlite::Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM catalog_entries ORDER BY id",
        ENTRY_COLUMNS
    ))?;
    let entries = stmt
        .query_map([], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn query_brand(
    conn: &Connection,
    brand: &str,
    category: Option<Category>,
) -> rusqlite::Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM catalog_entries
         WHERE brand_key = ?1 AND (?2 IS NULL OR category = ?2)
         ORDER BY id",
        ENTRY_COLUMNS
    ))?;
    let entries = stmt
        .query_map(
            params![clean_text(brand), category.map(|c| c.as_str())],
            row_to_entry,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn query_brands(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT TRIM(brand) FROM catalog_entries
         WHERE TRIM(brand) <> ''
         ORDER BY 1",
    )?;
    let brands = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(brands)
}

pub fn get_all_entries(conn: &Connection) -> Result<Vec<CatalogEntry>> {
    query_all(conn).context("Failed to read catalog entries")
}

pub fn get_entries_by_brand(
    conn: &Connection,
    brand: &str,
    category: Option<Category>,
) -> Result<Vec<CatalogEntry>> {
    query_brand(conn, brand, category)
        .with_context(|| format!("Failed to read entries for brand {:?}", brand))
}

pub fn count_entries(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// EVENT LOG
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_events(conn: &Connection, event_type: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE event_type = ?1",
        params![event_type],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// One event per batch entry: listing_matched, listing_unmatched or listing_failed
pub fn record_match_events(conn: &Connection, entries: &[BatchEntry], actor: &str) -> Result<usize> {
    for entry in entries {
        let (event_type, data) = match &entry.outcome {
            BatchOutcome::Matched(m) => (
                "listing_matched",
                serde_json::json!({
                    "title": entry.title,
                    "candidate_id": m.candidate_id,
                    "score": m.score,
                }),
            ),
            BatchOutcome::Unmatched { reason } => (
                "listing_unmatched",
                serde_json::json!({ "title": entry.title, "reason": reason }),
            ),
            BatchOutcome::Failed { error } => (
                "listing_failed",
                serde_json::json!({ "title": entry.title, "error": error }),
            ),
        };

        let event = Event::new(event_type, "listing", &listing_key(&entry.title), data, actor);
        insert_event(conn, &event)?;
    }

    Ok(entries.len())
}

pub fn record_scan_event(conn: &Connection, report: &ScanReport, actor: &str) -> Result<()> {
    let event = Event::new(
        "scan_completed",
        "catalog",
        &report.catalog_fingerprint,
        serde_json::json!({
            "entry_count": report.entry_count,
            "groups": report.groups.len(),
            "defects": report.defects.len(),
            "mode": report.mode,
        }),
        actor,
    );
    insert_event(conn, &event)
}

// ============================================================================
// STORE
// ============================================================================

fn store_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(_, _, e) => StoreError::Decode(e.to_string()),
        rusqlite::Error::InvalidColumnType(idx, name, ty) => {
            StoreError::Decode(format!("column {} ({}) has type {}", idx, name, ty))
        }
        rusqlite::Error::SqliteFailure(e, msg)
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::CannotOpen
            ) =>
        {
            StoreError::Unavailable(msg.unwrap_or_else(|| e.to_string()))
        }
        other => StoreError::Query(other.to_string()),
    }
}

/// CatalogStore over a single SQLite connection
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqliteCatalogStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Run glue code (import, event log) against the underlying connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    pub fn import(&self, entries: &[CatalogEntry]) -> Result<ImportStats> {
        self.with_connection(|conn| insert_entries(conn, entries))
    }

    pub fn count(&self) -> Result<i64> {
        self.with_connection(count_entries)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn brands(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        query_brands(&conn).map_err(store_error)
    }

    fn fetch(&self, brand: &str, category: Option<Category>) -> Result<Vec<CatalogEntry>, StoreError> {
        let conn = self.lock()?;
        query_brand(&conn, brand, category).map_err(store_error)
    }

    fn scan(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let conn = self.lock()?;
        query_all(&conn).map_err(store_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{MatchResult, UnmatchedReason};
    use crate::rules::RuleOutcome;
    use crate::scorer::ScoreBreakdown;
    use chrono::TimeZone;
    use std::io::Write;

    fn create_test_entries() -> Vec<CatalogEntry> {
        let mut hd600 = CatalogEntry::new(1, "Sennheiser", "HD600", Category::Headphone);
        hd600.price_used_min = Some(250.0);
        hd600.rank_grade = Some("A-".to_string());
        hd600.updated_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());

        vec![
            hd600,
            CatalogEntry::new(2, "sennheiser", "IE 600", Category::InEar),
            CatalogEntry::new(3, "HiFiMAN", "Sundara", Category::Headphone),
        ]
    }

    fn create_test_store() -> SqliteCatalogStore {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.import(&create_test_entries()).unwrap();
        store
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let entries = create_test_entries();

        let first = insert_entries(&conn, &entries).unwrap();
        let second = insert_entries(&conn, &entries).unwrap();

        println!("First import: {:?}, second import: {:?}", first, second);

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(count_entries(&conn).unwrap(), 3);
        assert_eq!(count_events(&conn, "entry_imported").unwrap(), 3);
    }

    #[test]
    fn test_reimport_updates_changed_rows() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let mut entries = create_test_entries();
        insert_entries(&conn, &entries).unwrap();

        entries[2].msrp = Some(349.0);
        let stats = insert_entries(&conn, &entries).unwrap();

        assert_eq!(stats.updated, 1);
        assert_eq!(stats.unchanged, 2);
        let stored = get_all_entries(&conn).unwrap();
        assert_eq!(stored[2].msrp, Some(349.0));
        assert_eq!(count_entries(&conn).unwrap(), 3);
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let store = create_test_store();
        let stored = store.scan().unwrap();
        assert_eq!(stored, create_test_entries());
    }

    #[test]
    fn test_store_brand_lookup() {
        let store = create_test_store();

        assert_eq!(store.brands().unwrap(), vec!["HiFiMAN", "Sennheiser", "sennheiser"]);
        assert_eq!(store.fetch("SENNHEISER", None).unwrap().len(), 2);

        let iems = store.fetch("sennheiser", Some(Category::InEar)).unwrap();
        assert_eq!(iems.len(), 1);
        assert_eq!(iems[0].id, 2);

        assert!(store.fetch("Focal", None).unwrap().is_empty());
    }

    #[test]
    fn test_bad_category_is_decode_error() {
        let store = create_test_store();
        store
            .with_connection(|conn| {
                conn.execute("UPDATE catalog_entries SET category = 'turntable' WHERE id = 3", [])?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(store.scan(), Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_bad_timestamp_is_decode_error() {
        let store = create_test_store();
        store
            .with_connection(|conn| {
                conn.execute("UPDATE catalog_entries SET updated_at = 'last tuesday' WHERE id = 2", [])?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(store.scan(), Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_load_catalog_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "id,brand,name,category,price_used_min,price_used_max,msrp,rank_grade,tone_grade,technical_grade,value_rating,driver_type,fit,impedance_ohms,distortion_thd,updated_at"
        )
        .unwrap();
        writeln!(file, "1,Sennheiser,HD600,headphone,250,320,399,A-,,,2,dynamic,over-ear,300,0.05,2026-03-01T12:00:00Z").unwrap();
        writeln!(file, "2,Moondrop,Aria,iem,,,,,,,,,,,,").unwrap();

        let entries = load_catalog_csv(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price_used_max, Some(320.0));
        assert_eq!(entries[0].tone_grade, None);
        assert!(entries[0].updated_at.is_some());
        assert_eq!(entries[1].category, Category::InEar);
        assert!(entries[1].msrp.is_none());
    }

    #[test]
    fn test_load_listings_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "title,description,source,price").unwrap();
        writeln!(file, "[WTS] Sennheiser HD650,Mint condition,reddit,275").unwrap();
        writeln!(file, "Focal Clear,,,").unwrap();

        let listings = load_listings_csv(file.path()).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].source.as_deref(), Some("reddit"));
        assert_eq!(listings[0].price, Some(275.0));
        assert_eq!(listings[1].description, None);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "test_event",
            "listing",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "listing", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
    }

    #[test]
    fn test_record_match_events() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let matched = MatchResult {
            candidate_id: 1,
            brand: "Sennheiser".to_string(),
            name: "HD600".to_string(),
            score: 0.9,
            quality_points: 40,
            breakdown: ScoreBreakdown {
                brand: RuleOutcome::default(),
                name: RuleOutcome::default(),
                category: RuleOutcome::default(),
                source: Default::default(),
                brand_gated: false,
                total: 0.9,
            },
        };
        let batch = vec![
            BatchEntry {
                index: 0,
                title: "Sennheiser HD600".to_string(),
                outcome: BatchOutcome::Matched(matched),
            },
            BatchEntry {
                index: 1,
                title: "mystery box".to_string(),
                outcome: BatchOutcome::Unmatched {
                    reason: UnmatchedReason::NoCandidates,
                },
            },
        ];

        assert_eq!(record_match_events(&conn, &batch, "test").unwrap(), 2);
        assert_eq!(count_events(&conn, "listing_matched").unwrap(), 1);
        assert_eq!(count_events(&conn, "listing_unmatched").unwrap(), 1);

        let events = get_events_for_entity(&conn, "listing", &listing_key("Sennheiser HD600")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["candidate_id"], 1);
    }

    #[test]
    fn test_listing_key_ignores_case_and_spacing() {
        assert_eq!(listing_key("Sennheiser  HD600"), listing_key("sennheiser hd600"));
        assert_eq!(listing_key("x").len(), 64);
    }
}
