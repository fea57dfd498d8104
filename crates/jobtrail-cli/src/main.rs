use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobtrail_client::{ClassifiedsAdapter, CsvExporter, JobBoardAdapter, ReqwestFetcher};
use jobtrail_client::{classifieds, job_board};
use jobtrail_core::models::Site;
use jobtrail_core::traits::{CrawlStore, SiteAdapter};
use jobtrail_core::{
    Compactor, CrawlConfig, CrawlContext, Crawler, RetryingFetcher, RunSummary, SystemClock,
    ThrottledFetcher, TracingCrawlReporter, run_site,
};
use jobtrail_db::{CrawlRepository, Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "jobtrail", version, about = "Incremental job-ad crawler and archiver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover new ads, re-fetch due ads, then compact and flush when due
    Crawl {
        /// Site to crawl
        #[arg(short, long, value_enum, default_value_t = SiteArg::All)]
        site: SiteArg,

        /// Root URL of the classifieds site
        #[arg(
            long,
            env = "JOBTRAIL_CLASSIFIEDS_URL",
            default_value = classifieds::DEFAULT_BASE_URL
        )]
        classifieds_url: String,

        /// First listing page of the job board
        #[arg(
            long,
            env = "JOBTRAIL_JOB_BOARD_URL",
            default_value = job_board::DEFAULT_LISTING_URL
        )]
        job_board_url: String,
    },

    /// Move closed and expired ads to the archive
    Compact {
        #[arg(short, long, value_enum, default_value_t = SiteArg::All)]
        site: SiteArg,
    },

    /// Export the archive to CSV and clear it (only on the 1st unless forced)
    Flush {
        #[arg(short, long, value_enum, default_value_t = SiteArg::All)]
        site: SiteArg,

        /// Flush regardless of the day of the month
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Show row counts per table
    Stats {
        #[arg(short, long, value_enum, default_value_t = SiteArg::All)]
        site: SiteArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SiteArg {
    All,
    Classifieds,
    JobBoard,
}

impl SiteArg {
    fn sites(self) -> Vec<Site> {
        match self {
            SiteArg::All => Site::ALL.to_vec(),
            SiteArg::Classifieds => vec![Site::Classifieds],
            SiteArg::JobBoard => vec![Site::JobBoard],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobtrail=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CrawlConfig::from_env().context("Invalid crawl configuration")?;
    let ctx = connect(&config).await?;

    match cli.command {
        Commands::Crawl {
            site,
            classifieds_url,
            job_board_url,
        } => {
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());

            let mut summaries = Vec::new();
            for site in site.sites() {
                if cancel.is_cancelled() {
                    break;
                }
                let summary = match site {
                    Site::Classifieds => {
                        cmd_crawl(ClassifiedsAdapter::new(&classifieds_url), &ctx, &cancel).await?
                    }
                    Site::JobBoard => {
                        cmd_crawl(JobBoardAdapter::new(&job_board_url), &ctx, &cancel).await?
                    }
                };
                summaries.push(summary);
            }
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Commands::Compact { site } => {
            let compactor = compactor(&ctx);
            let mut reports = serde_json::Map::new();
            for site in site.sites() {
                let report = compactor
                    .compact(site)
                    .await
                    .with_context(|| format!("Compaction failed for {site}"))?;
                reports.insert(site.to_string(), serde_json::to_value(report)?);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Flush { site, force } => {
            let compactor = compactor(&ctx);
            let mut reports = serde_json::Map::new();
            for site in site.sites() {
                let report = compactor
                    .flush(site, force)
                    .await
                    .with_context(|| format!("Archive flush failed for {site}"))?;
                if report.is_none() {
                    tracing::info!(%site, "Not the first of the month, nothing flushed (use --force)");
                }
                reports.insert(site.to_string(), serde_json::to_value(report)?);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Stats { site } => {
            ctx.store.health_check().await.context("Database is not reachable")?;
            let mut counts = serde_json::Map::new();
            for site in site.sites() {
                let table_counts = ctx
                    .store
                    .table_counts(site)
                    .await
                    .with_context(|| format!("Failed to count rows for {site}"))?;
                counts.insert(site.to_string(), serde_json::to_value(table_counts)?);
            }
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and build the crawl context.
async fn connect(config: &CrawlConfig) -> Result<CrawlContext<CrawlRepository>> {
    let db_config = DatabaseConfig::from_env()?;
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;

    let clock = SystemClock::new(config.utc_offset()?);
    Ok(CrawlContext::new(
        db.crawl_repo(),
        Arc::new(clock),
        config.clone(),
    ))
}

fn compactor(ctx: &CrawlContext<CrawlRepository>) -> Compactor<CrawlRepository, CsvExporter> {
    let exporter = CsvExporter::new(&ctx.config.export_dir);
    Compactor::new(ctx.clone(), exporter)
}

/// Cancel the run on Ctrl-C; the crawler stops between fetch tasks.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, stopping after the current task");
                cancel.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to install Ctrl-C handler"),
        }
    });
}

async fn cmd_crawl<A: SiteAdapter>(
    adapter: A,
    ctx: &CrawlContext<CrawlRepository>,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let site = adapter.site();
    let http = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    let fetcher = RetryingFetcher::new(
        ThrottledFetcher::new(http, ctx.config.throttle.clone()),
        ctx.config.retry.clone(),
    );

    let crawler = Crawler::new(fetcher, adapter, ctx.clone());
    let compactor = compactor(ctx);
    run_site(&crawler, &compactor, cancel, &TracingCrawlReporter)
        .await
        .with_context(|| format!("Crawl of {site} aborted"))
}
