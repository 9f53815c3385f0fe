//! Folio command-line front end.
//!
//! Runs schema repair, saves and reads layouts, and manages page versions
//! against the configured database (or mock mode when none is set).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use folio_kernel::config::Config;
use folio_kernel::db::Database;
use folio_kernel::metrics::Metrics;
use folio_kernel::models::{DEFAULT_LANGUAGE, PageKey, PageSnapshotData};
use folio_kernel::services::{
    LayoutEngine, TranslationFanout, TranslationWorker, VersionService, spawn_translation_worker,
    translator,
};
use folio_kernel::storage::{PgStorage, Storage};

/// Folio page layout tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print Prometheus metrics to stderr before exiting.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or repair the layout schema.
    Migrate,

    /// Save a layout from a JSON file.
    Save {
        /// Page id.
        #[arg(long)]
        page: String,

        #[arg(long)]
        tenant: String,

        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        language: String,

        /// Theme to bind to the page.
        #[arg(long)]
        theme: Option<String>,

        /// Layout JSON document.
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the layout served for a slug.
    Show {
        #[arg(long)]
        slug: String,

        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        language: String,

        #[arg(long)]
        tenant: Option<String>,
    },

    /// Re-run translation fan-out from the current default layout.
    Translate {
        #[arg(long)]
        page: i64,

        #[arg(long)]
        tenant: String,
    },

    /// Store a version snapshot of a page.
    Snapshot {
        #[arg(long)]
        page: i64,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },

    /// List stored versions of a page.
    History {
        #[arg(long)]
        page: i64,

        #[arg(long)]
        tenant: String,
    },

    /// Restore a stored version as the default-language layout.
    Restore {
        #[arg(long)]
        page: i64,

        #[arg(long)]
        tenant: String,

        #[arg(long)]
        version: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let db = Database::connect(&config)
        .await
        .context("failed to initialize database")?;
    info!(mock = db.is_mock(), "database configured");

    let storage: Arc<dyn Storage> = Arc::new(PgStorage::new(db));
    let metrics = Arc::new(Metrics::new());

    run(cli.command, &config, storage, metrics.clone()).await?;

    if cli.metrics {
        eprint!("{}", metrics.encode());
    }
    Ok(())
}

async fn run(
    command: Command,
    config: &Config,
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let engine = LayoutEngine::new(storage.clone(), metrics.clone());

    match command {
        Command::Migrate => {
            let report = engine.prepare_schema().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                anyhow::bail!("schema repair incomplete");
            }
        }

        Command::Save {
            page,
            tenant,
            language,
            theme,
            file,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let layout: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;

            engine.prepare_schema().await;

            let (engine, worker) = with_translation_worker(engine, config, storage, metrics)?;

            let saved = engine
                .update_page_layout(
                    PageKey::normalize(&page),
                    &layout,
                    &tenant,
                    &language,
                    theme.as_deref(),
                )
                .await?;

            // Closing the last sender lets the worker drain and stop.
            drop(engine);
            let processed = worker.join().await;

            if !saved {
                anyhow::bail!("page {page} not found for tenant {tenant}");
            }
            println!("saved page {page} ({language}); {processed} translation job(s) run");
        }

        Command::Show {
            slug,
            language,
            tenant,
        } => match engine
            .get_layout_by_slug(&slug, &language, tenant.as_deref())
            .await?
        {
            Some(layout) => println!("{}", serde_json::to_string_pretty(&layout)?),
            None => anyhow::bail!("no layout for slug {slug}"),
        },

        Command::Translate { page, tenant } => {
            engine.prepare_schema().await;

            let Some(layout) = storage
                .find_layout(&PageKey::Id(page), DEFAULT_LANGUAGE)
                .await?
            else {
                anyhow::bail!("page {page} has no default layout");
            };

            let fanout = TranslationFanout::new(storage, translator::from_config(config)?, metrics);
            let report = fanout
                .translate_layout_to_all_languages(page, &layout.layout_json, &tenant)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Snapshot {
            page,
            tenant,
            user,
            comment,
        } => {
            engine.prepare_schema().await;

            let Some(current) = storage.find_page(&PageKey::Id(page)).await? else {
                anyhow::bail!("page {page} not found");
            };
            let layout = storage
                .find_layout(&PageKey::Id(page), DEFAULT_LANGUAGE)
                .await?
                .map(|l| l.layout_json)
                .unwrap_or_else(|| serde_json::json!({"components": []}));

            let version = VersionService::new(storage)
                .save_page_version(
                    page,
                    &tenant,
                    PageSnapshotData::from(&current),
                    layout,
                    user,
                    comment,
                )
                .await?;
            println!("saved version {} of page {page}", version.version_number);
        }

        Command::History { page, tenant } => {
            let versions = VersionService::new(storage)
                .list_page_versions(page, &tenant)
                .await?;
            if versions.is_empty() {
                warn!(page, tenant = %tenant, "no versions stored");
            }
            for v in versions {
                println!(
                    "{:>4}  {}  {:<12}  {}",
                    v.version_number,
                    v.created_at.format("%Y-%m-%d %H:%M:%S"),
                    v.created_by.as_deref().unwrap_or("-"),
                    v.comment.as_deref().unwrap_or("")
                );
            }
        }

        Command::Restore {
            page,
            tenant,
            version,
        } => {
            engine.prepare_schema().await;

            let versions = VersionService::new(storage.clone());
            let (engine, worker) = with_translation_worker(engine, config, storage, metrics)?;

            let restored = versions
                .restore_page_version(&engine, page, &tenant, version)
                .await?;

            drop(engine);
            let processed = worker.join().await;

            if !restored {
                anyhow::bail!("version {version} of page {page} could not be restored");
            }
            println!("restored version {version} of page {page}; {processed} translation job(s) run");
        }
    }

    Ok(())
}

/// Attach a translation worker to `engine`. Drop the engine, then join the
/// worker to drain queued jobs.
fn with_translation_worker(
    engine: LayoutEngine,
    config: &Config,
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
) -> Result<(LayoutEngine, TranslationWorker)> {
    let fanout = Arc::new(TranslationFanout::new(
        storage,
        translator::from_config(config)?,
        metrics.clone(),
    ));
    let (queue, worker) =
        spawn_translation_worker(fanout, metrics, config.translation_queue_capacity);
    Ok((engine.with_translation_queue(queue), worker))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
