//! Statute ingestion CLI
//!
//! Each command prints one JSON document on stdout: its summary on success,
//! or an error payload (`{error, kind, retryable}`) with a non-zero exit code
//! on failure. Logs go to stderr.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use statute_ingest::{
    BatchSlotOrchestrator, BrowserlessBrowser, DomainRelevance, DomainStore, ErrorPayload, IngestError,
    IngestOptions, IngestionCoordinator, LegalDomain, LegalStore, MemoryStore, OpenAI,
    PageFetcher, RateLimiter, RelevanceEngine, RelevanceRule, RuleTable, SlotGenerator,
    SlotRunOptions, SourceStore,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "statute-ingest")]
#[command(about = "Ingest statutes, link legal domains and generate slots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape, extract and store the statute at a URL
    Scrape(ScrapeArgs),

    /// Recompute domain relevance for a stored source
    Link {
        source_id: Uuid,
    },

    /// Generate slots for a source (latest unprocessed when no id is given)
    Slots(SlotsArgs),

    /// Validate and print a relevance rule table
    Rules {
        /// Rule table JSON; falls back to RELEVANCE_RULES_PATH, then the builtin table
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ScrapeArgs {
    url: String,

    /// Jurisdiction code recorded on the source
    #[arg(long, default_value = "CA-ON")]
    jurisdiction: String,

    /// Primary legal domain slug
    #[arg(long)]
    domain: Option<String>,

    /// Compute cross-domain relevance after storing
    #[arg(long)]
    link: bool,

    /// Generate slots for the primary domain after storing
    #[arg(long, requires = "domain")]
    slots: bool,

    #[arg(long, default_value_t = 10)]
    batch_size: usize,
}

#[derive(Args)]
struct SlotsArgs {
    #[arg(long)]
    source_id: Option<Uuid>,

    #[arg(long)]
    domain: String,

    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Batches generated at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RulesReport<'a> {
    valid: bool,
    version: &'a str,
    domains: Vec<&'a str>,
    rules: &'a [RelevanceRule],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkReport {
    source_id: Uuid,
    citation: String,
    relevant_domains: Vec<DomainRelevance>,
}

fn output<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

fn error_payload(err: &anyhow::Error) -> ErrorPayload {
    match err.downcast_ref::<IngestError>() {
        Some(ingest) => ErrorPayload::from(ingest),
        None => ErrorPayload {
            error: format!("{err:#}"),
            kind: "config_error",
            retryable: false,
        },
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,statute_ingest=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning in-flight model calls");
            on_interrupt.cancel();
        }
    });

    match run(cli.command, cancel).await {
        Ok(value) => {
            output(&value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            output(&error_payload(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, cancel: CancellationToken) -> Result<Value> {
    let config = Config::from_env()?;

    if let Commands::Rules { path } = &command {
        let table = load_rules(path.as_deref().or(config.relevance_rules_path.as_deref()))?;
        return rules_report(&table);
    }

    let rules = load_rules(config.relevance_rules_path.as_deref())?;

    #[cfg(feature = "postgres")]
    {
        if let Some(url) = &config.database_url {
            let store = statute_ingest::PostgresStore::new(url)
                .await
                .context("Failed to connect to database")?;
            for domain in catalogue(&rules) {
                if store.get_domain(&domain.slug).await?.is_none() {
                    store.upsert_domain(&domain).await?;
                }
            }
            info!("Using Postgres store");
            return execute(command, config, rules, Arc::new(store), cancel).await;
        }
    }

    #[cfg(not(feature = "postgres"))]
    {
        if config.database_url.is_some() {
            warn!("DATABASE_URL is set but this build has no postgres support");
        }
    }

    info!("Using in-memory store, nothing persists between runs");
    let store = MemoryStore::new().with_domains(catalogue(&rules));
    execute(command, config, rules, Arc::new(store), cancel).await
}

async fn execute<S: LegalStore>(
    command: Commands,
    mut config: Config,
    rules: RuleTable,
    store: Arc<S>,
    cancel: CancellationToken,
) -> Result<Value> {
    let relevance = RelevanceEngine::new(Arc::new(rules));

    match command {
        Commands::Scrape(args) => {
            let fetcher = PageFetcher::new(
                BrowserlessBrowser::new(&config.browserless_url, config.browserless_token.take()),
                Arc::new(RateLimiter::new(config.scrape_min_delay)),
            );
            let coordinator = IngestionCoordinator::new(store, fetcher, Arc::new(model(&mut config)?))
                .with_relevance(relevance)
                .with_cancellation(cancel);

            let mut options = IngestOptions::new(args.jurisdiction).with_domain_links(args.link);
            if let Some(slug) = args.domain {
                if args.slots {
                    options = options
                        .with_slots(SlotRunOptions::new(slug.clone()).with_batch_size(args.batch_size));
                }
                options = options.with_primary_domain(slug);
            }

            let outcome = coordinator.ingest_url(&args.url, &options).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        Commands::Link { source_id } => {
            let source = store
                .get_source(source_id)
                .await?
                .ok_or(IngestError::SourceNotFound { id: source_id })?;
            let domains = store.list_domains().await?;
            let relevant_domains = relevance.find_relevant_domains(&source, &domains);

            Ok(serde_json::to_value(LinkReport {
                source_id,
                citation: source.citation,
                relevant_domains,
            })?)
        }
        Commands::Slots(args) => {
            let orchestrator = BatchSlotOrchestrator::new(store, SlotGenerator::new(model(&mut config)?))
                .with_concurrency(args.concurrency)
                .with_cancellation(cancel);
            let options = SlotRunOptions::new(args.domain).with_batch_size(args.batch_size);

            let summary = match args.source_id {
                Some(id) => orchestrator.process_source(id, &options).await?,
                None => orchestrator.process_next_unprocessed(&options).await?,
            };
            Ok(serde_json::to_value(summary)?)
        }
        Commands::Rules { path } => {
            let table = load_rules(path.as_deref().or(config.relevance_rules_path.as_deref()))?;
            rules_report(&table)
        }
    }
}

fn model(config: &mut Config) -> Result<OpenAI> {
    let api_key = config
        .openai_api_key
        .take()
        .context("OPENAI_API_KEY must be set")?;
    let model = OpenAI::new(api_key);
    Ok(match config.openai_model.take() {
        Some(name) => model.with_model(name),
        None => model,
    })
}

fn load_rules(path: Option<&Path>) -> Result<RuleTable> {
    match path {
        Some(path) => RuleTable::from_path(path)
            .with_context(|| format!("Failed to load rule table {}", path.display())),
        None => Ok(RuleTable::builtin()),
    }
}

fn rules_report(table: &RuleTable) -> Result<Value> {
    Ok(serde_json::to_value(RulesReport {
        valid: true,
        version: &table.version,
        domains: table.domain_slugs(),
        rules: &table.rules,
    })?)
}

/// Domain catalogue seeded from the slugs the rule table mentions.
fn catalogue(rules: &RuleTable) -> Vec<LegalDomain> {
    rules
        .domain_slugs()
        .into_iter()
        .map(|slug| LegalDomain::new(slug, display_name(slug)))
        .collect()
}

fn display_name(slug: &str) -> String {
    slug.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
