use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use nt_core::{ArticleStorage, ArticleSummary, Category, DateRange, Error, ExportFilter, Result};
use nt_scrappers::{HttpFetcher, IngestionCoordinator, ScraperConfig};
use nt_storage::{
    create_storage, export_json, range_export_filename, CoverageAnalyzer, StorageKind,
    DEFAULT_EXPORT_FILE,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Financial news ingestion and coverage reports", long_about = None)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, env = "NT_DB", default_value = "financial_news.db", global = true)]
    db: PathBuf,
    /// Storage backend: sqlite or memory
    #[arg(long, default_value = "sqlite", global = true)]
    storage: StorageKind,
    /// JSON file overriding the default scraper configuration
    #[arg(long, env = "NT_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Articles fetched in parallel within a source
    #[arg(long, global = true)]
    concurrency: Option<usize>,
    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest articles published in a recent window, then report coverage
    IngestRecent {
        /// Window length in days when no explicit start is given
        #[arg(long)]
        days: Option<i64>,
        /// First day to keep (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last day to keep (YYYY-MM-DD), inclusive
        #[arg(long)]
        end: Option<String>,
    },
    /// Ingest every discoverable article regardless of publish date
    IngestAll,
    /// Search titles, content and summaries
    Search { term: String },
    /// Most recently retrieved articles
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Articles in one category
    Category { category: Category },
    /// Articles published between two days, inclusive
    Range { start: String, end: String },
    /// Export articles as JSON
    Export {
        /// Output file; defaults depend on the filter
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, requires = "end", conflicts_with_all = ["category", "source"])]
        start: Option<String>,
        #[arg(long, requires = "start")]
        end: Option<String>,
        #[arg(long, conflicts_with = "source")]
        category: Option<Category>,
        #[arg(long)]
        source: Option<String>,
    },
    /// Coverage report by source, category and day
    Analyze {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Flag thin sources and short articles
    Quality {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// List configured news sources
    Sources,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Arc<ScraperConfig>> {
    let mut config = match &cli.config {
        Some(path) => ScraperConfig::from_file(path)?,
        None => ScraperConfig::default(),
    };
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;
    Ok(Arc::new(config))
}

/// Bad date arguments are reported and treated as an empty result.
fn dates_or_report<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::InvalidDateInput(reason)) => {
            eprintln!("Invalid date input: {}", reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn print_summaries(articles: &[ArticleSummary]) {
    if articles.is_empty() {
        println!("No articles found.");
        return;
    }
    for article in articles {
        println!(
            "[{}] {} ({}, {})",
            article.published_at.format(nt_core::dates::TIMESTAMP_FORMAT),
            article.title,
            article.source,
            article.category
        );
        println!("    {}", article.url);
    }
    println!("{} articles", articles.len());
}

fn print_sources(config: &ScraperConfig) {
    for source in &config.sources {
        println!("{}: {}", source.name, source.url);
    }
}

fn build_coordinator(
    storage: Arc<dyn ArticleStorage>,
    config: Arc<ScraperConfig>,
) -> Result<IngestionCoordinator> {
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let coordinator = IngestionCoordinator::new(storage, fetcher, config)?;

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight articles");
            cancel.cancel();
        }
    });
    Ok(coordinator)
}

async fn run(command: Commands, storage: Arc<dyn ArticleStorage>, config: Arc<ScraperConfig>) -> Result<()> {
    let now = Utc::now();

    match command {
        Commands::IngestRecent { days, start, end } => {
            let days = days.unwrap_or(config.recent_days);
            let Some(range) = dates_or_report(DateRange::ingest_window(
                start.as_deref(),
                end.as_deref(),
                now,
                days,
            ))?
            else {
                return Ok(());
            };
            let coordinator = build_coordinator(storage, config)?;
            let summary = coordinator.ingest_recent(range).await;
            print!("{}", summary);
            if let Some(report) = &summary.coverage {
                print!("\n{}", report);
            }
        }
        Commands::IngestAll => {
            let coordinator = build_coordinator(storage, config)?;
            print!("{}", coordinator.ingest_all().await);
        }
        Commands::Search { term } => {
            print_summaries(&storage.query_by_term(&term).await?);
        }
        Commands::Recent { limit } => {
            print_summaries(&storage.query_recent(limit).await?);
        }
        Commands::Category { category } => {
            print_summaries(&storage.query_by_category(category).await?);
        }
        Commands::Range { start, end } => {
            let articles = match dates_or_report(DateRange::from_dates(&start, &end))? {
                Some(range) => storage.query_by_date_range(&range).await?,
                None => Vec::new(),
            };
            print_summaries(&articles);
        }
        Commands::Export {
            output,
            start,
            end,
            category,
            source,
        } => {
            let (filter, default_name) = match (start, end, category, source) {
                (Some(start), Some(end), _, _) => {
                    let Some(range) = dates_or_report(DateRange::from_dates(&start, &end))? else {
                        println!("Exported 0 articles");
                        return Ok(());
                    };
                    (ExportFilter::DateRange(range), range_export_filename(&range))
                }
                (_, _, Some(category), _) => {
                    (ExportFilter::Category(category), DEFAULT_EXPORT_FILE.to_string())
                }
                (_, _, _, Some(source)) => {
                    (ExportFilter::Source(source), DEFAULT_EXPORT_FILE.to_string())
                }
                _ => (ExportFilter::All, DEFAULT_EXPORT_FILE.to_string()),
            };
            let path = output.unwrap_or_else(|| PathBuf::from(default_name));
            let count = export_json(storage.as_ref(), &path, &filter).await?;
            println!("Exported {} articles to {}", count, path.display());
        }
        Commands::Analyze { start, end } => {
            let window = DateRange::report_window(start.as_deref(), end.as_deref(), now, config.recent_days);
            if let Some(range) = dates_or_report(window)? {
                let report = CoverageAnalyzer::new(storage).analyze_range(&range).await?;
                print!("{}", report);
            }
        }
        Commands::Quality { start, end } => {
            let window = DateRange::report_window(start.as_deref(), end.as_deref(), now, config.recent_days);
            if let Some(range) = dates_or_report(window)? {
                let report = CoverageAnalyzer::new(storage).check_quality(&range).await?;
                print!("{}", report);
            }
        }
        Commands::Sources => print_sources(&config),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli).context("Failed to load scraper configuration")?;
    // Listing sources needs no store.
    if let Commands::Sources = cli.command {
        print_sources(&config);
        return Ok(());
    }

    let storage = create_storage(cli.storage, &cli.db)
        .await
        .with_context(|| format!("Failed to open {:?} storage at {}", cli.storage, cli.db.display()))?;
    info!(storage = ?cli.storage, db = %cli.db.display(), "Storage ready");

    let result = run(cli.command, storage.clone(), config).await;
    if let Err(e) = storage.close().await {
        warn!(error = %e, "Failed to close storage");
    }
    Ok(result?)
}
