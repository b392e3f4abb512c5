use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_match::{
    load_catalog_csv, load_listings_csv, record_match_events, record_scan_event, BatchOutcome,
    BatchSummary, CancelFlag, CatalogEntry, CatalogStore, EngineConfig, EngineTables,
    GroupingMode, MemoryCatalogStore, SqliteCatalogStore,
};

#[derive(Parser)]
#[command(name = "catalog-match")]
#[command(about = "Match marketplace listings to the audio catalog and find duplicate entries")]
#[command(version)]
struct Cli {
    /// Engine config (JSON); built-in defaults when omitted
    #[arg(long, global = true, env = "CATALOG_MATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Alias / keyword / source tables (JSON); built-in defaults when omitted
    #[arg(long, global = true, env = "CATALOG_MATCH_TABLES")]
    tables: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a catalog CSV into the SQLite store (re-import is idempotent)
    Import {
        /// Catalog CSV with a header row of entry field names
        csv: PathBuf,

        #[arg(long, env = "CATALOG_MATCH_DB", default_value = "catalog.db")]
        db: PathBuf,
    },

    /// Match a listings CSV (title,description,source,price) against the catalog
    Match {
        listings: PathBuf,

        #[command(flatten)]
        source: CatalogSource,

        /// Write the batch result as JSON here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Scan the whole catalog for duplicate groups and merge recommendations
    Scan {
        #[command(flatten)]
        source: CatalogSource,

        /// Also run the fuzzy pass over entries left out of exact groups
        #[arg(long)]
        fuzzy: bool,

        #[arg(long, short, value_enum, default_value = "json")]
        format: ReportFormat,

        #[arg(long, short)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct CatalogSource {
    /// SQLite catalog database
    #[arg(long, env = "CATALOG_MATCH_DB", default_value = "catalog.db")]
    db: PathBuf,

    /// Read entries from a JSON array instead of the database (no audit events)
    #[arg(long, conflicts_with = "db")]
    catalog_json: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

/// Where entries come from. Only the SQLite store keeps an audit trail.
enum Catalog {
    Sqlite(SqliteCatalogStore),
    Memory(MemoryCatalogStore),
}

impl Catalog {
    fn open(source: &CatalogSource) -> Result<Self> {
        if let Some(path) = &source.catalog_json {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog JSON: {:?}", path))?;
            let entries: Vec<CatalogEntry> =
                serde_json::from_str(&content).context("Failed to parse catalog JSON")?;
            return Ok(Catalog::Memory(MemoryCatalogStore::new(entries)));
        }

        if !source.db.exists() {
            bail!(
                "Database not found: {:?}. Run `catalog-match import <csv> --db {:?}` first",
                source.db,
                source.db
            );
        }
        Ok(Catalog::Sqlite(SqliteCatalogStore::open(&source.db)?))
    }

    fn store(&self) -> &dyn CatalogStore {
        match self {
            Catalog::Sqlite(store) => store,
            Catalog::Memory(store) => store,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_match=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let tables = match &cli.tables {
        Some(path) => EngineTables::from_file(path)?,
        None => EngineTables::with_defaults(),
    };

    match cli.command {
        Commands::Import { csv, db } => run_import(&csv, &db),
        Commands::Match {
            listings,
            source,
            out,
        } => run_match(&config, tables, &listings, &source, out.as_deref()),
        Commands::Scan {
            source,
            fuzzy,
            format,
            out,
        } => {
            let mut config = config;
            if fuzzy {
                config.grouping_mode = GroupingMode::ExactAndFuzzy;
            }
            run_scan(&config, &tables, &source, format, out.as_deref())
        }
    }
}

fn run_import(csv_path: &Path, db_path: &Path) -> Result<()> {
    println!("📂 Loading catalog CSV...");
    let entries = load_catalog_csv(csv_path)?;
    println!("✓ Loaded {} entries from {:?}", entries.len(), csv_path);

    let store = SqliteCatalogStore::open(db_path)?;
    let stats = store.import(&entries)?;
    let count = store.count()?;

    println!("✓ Inserted: {}", stats.inserted);
    println!("✓ Updated: {}", stats.updated);
    println!("✓ Unchanged: {}", stats.unchanged);
    println!("✓ Database contains {} entries", count);

    Ok(())
}

fn run_match(
    config: &EngineConfig,
    tables: EngineTables,
    listings_path: &Path,
    source: &CatalogSource,
    out: Option<&Path>,
) -> Result<()> {
    let listings = load_listings_csv(listings_path)?;
    let catalog = Catalog::open(source)?;
    let ranker = config.build_ranker(Arc::new(tables), Utc::now());

    let entries = ranker.match_batch(&listings, catalog.store());
    let summary = BatchSummary::from_entries(&entries);

    if let Catalog::Sqlite(store) = &catalog {
        store.with_connection(|conn| record_match_events(conn, &entries, "catalog_match_cli"))?;
    }

    let json = serde_json::to_string_pretty(&entries)?;
    match out {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote match results to {:?}", path);
        }
        None => println!("{}", json),
    }

    for entry in &entries {
        if let BatchOutcome::Failed { error } = &entry.outcome {
            eprintln!("❌ #{} {}: {}", entry.index, entry.title, error);
        }
    }
    eprintln!("✓ {}", summary.summary());

    if summary.failed > 0 {
        bail!("{} listings failed against the catalog store", summary.failed);
    }
    Ok(())
}

fn run_scan(
    config: &EngineConfig,
    tables: &EngineTables,
    source: &CatalogSource,
    format: ReportFormat,
    out: Option<&Path>,
) -> Result<()> {
    let catalog = Catalog::open(source)?;
    let scanner = config.build_scanner(tables, Utc::now());

    let report = scanner.run(catalog.store(), &CancelFlag::new())?;

    if let Catalog::Sqlite(store) = &catalog {
        store.with_connection(|conn| record_scan_event(conn, &report, "catalog_match_cli"))?;
    }

    match (format, out) {
        (ReportFormat::Json, Some(path)) => report.write_json(path)?,
        (ReportFormat::Csv, Some(path)) => report.write_csv(path)?,
        (ReportFormat::Json, None) => println!("{}", report.to_json()?),
        (ReportFormat::Csv, None) => print!("{}", report.to_csv()?),
    }

    eprintln!("✓ {}", report.summary());
    eprintln!("  fingerprint {}", report.catalog_fingerprint);
    Ok(())
}
