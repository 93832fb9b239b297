use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use gleaner::cache::{CacheStore, MemoryCache};
use gleaner::config::Config;
use gleaner::fetch::HttpFetcher;
use gleaner::jobs::{
    FeedRef, ImportArticleJob, Job, JobEnvelope, JobReport, Pipeline, SyncFeedArticlesInput,
    Worker,
};
use gleaner::storage::{Database, DatabaseError};

/// Get the config directory path ($XDG_CONFIG_HOME/gleaner or ~/.config/gleaner)
fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir).join("gleaner"));
    }
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gleaner"))
}

#[derive(Parser, Debug)]
#[command(
    name = "gleaner",
    version,
    about = "Imports articles and syncs feeds into a readable-article store"
)]
struct Args {
    /// Config file (default: ~/.config/gleaner/gleaner.toml)
    #[arg(long, short, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding `database_path` from the config file
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    /// Keep the readable and metadata caches in process memory only
    #[arg(long, global = true)]
    memory_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a single article by URL
    Import {
        url: String,
        /// Title to record instead of the page's own
        #[arg(long)]
        title: Option<String>,
        /// Extract and cache a readable rendition
        #[arg(long)]
        readable: bool,
    },
    /// Sync new articles from a feed
    Sync {
        link: String,
        /// Feed identifier stored with each article (default: the feed link)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Run job envelopes read from stdin, one JSON object per line
    Work,
    /// Delete expired cache entries
    Evict,
}

async fn open_database(args: &Args, config: &Config) -> Result<Database> {
    let db_path = args
        .database
        .clone()
        .or_else(|| config.database_path())
        .context("Cannot determine database path; pass --database")?;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory '{}'", parent.display())
        })?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(db_path_str).await {
        Ok(db) => Ok(db.with_cache_ttl(config.cache.ttl_hours)),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

fn print_report(report: &JobReport) -> Result<()> {
    let line = serde_json::to_string(report).context("Failed to encode job report")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").context("Failed to write job report")?;
    Ok(())
}

fn cli_job_id(kind: &str) -> String {
    format!("cli-{kind}-{}", Utc::now().timestamp_millis())
}

/// Feeds stdin envelopes to the worker and prints reports as they finish.
/// Returns the number of failed jobs.
async fn run_stdin(worker: Arc<Worker>, queue_depth: usize) -> Result<usize> {
    let (job_tx, job_rx) = mpsc::channel::<JobEnvelope>(queue_depth);
    let (report_tx, mut report_rx) = mpsc::channel::<JobReport>(queue_depth);

    let runner = tokio::spawn(worker.run(job_rx, report_tx));
    let printer = tokio::spawn(async move {
        let mut failed = 0usize;
        while let Some(report) = report_rx.recv().await {
            if !report.is_success() {
                failed += 1;
            }
            if let Err(e) = print_report(&report) {
                tracing::error!(error = %e, "Failed to print job report");
            }
        }
        failed
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<JobEnvelope>(line) {
            Ok(envelope) => {
                if job_tx.send(envelope).await.is_err() {
                    tracing::error!("Worker stopped accepting jobs");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed job envelope");
            }
        }
    }
    drop(job_tx);

    runner.await.context("Worker task failed")?;
    printer.await.context("Report printer failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries job reports
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("gleaner.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

    let db = open_database(&args, &config).await?;

    if let Command::Evict = args.command {
        let evicted = db
            .evict_expired()
            .await
            .context("Failed to evict expired cache entries")?;
        tracing::info!(evicted, "Cache eviction complete");
        println!("{}", serde_json::json!({ "evicted": evicted }));
        return Ok(());
    }

    let fetcher = HttpFetcher::new(&config.http).context("Failed to build HTTP client")?;
    let cache: Arc<dyn CacheStore> = if args.memory_cache {
        Arc::new(MemoryCache::new(config.cache.memory_capacity))
    } else {
        Arc::new(db.clone())
    };
    let pipeline = Pipeline::new(Arc::new(fetcher), cache, config.readability.clone());
    let worker = Worker::new(pipeline, Arc::new(db), &config);

    let job = match args.command {
        Command::Import {
            url,
            title,
            readable,
        } => Job::Import(ImportArticleJob {
            title,
            url,
            make_readable: readable,
        }),
        Command::Sync { link, id, name } => Job::Sync(SyncFeedArticlesInput {
            feed: FeedRef {
                id: id.unwrap_or_else(|| link.clone()),
                name: name.unwrap_or_default(),
                link,
            },
        }),
        Command::Work => {
            let queue_depth = config.worker.max_concurrent_jobs.max(1) * 4;
            let failed = run_stdin(Arc::new(worker), queue_depth).await?;
            if failed > 0 {
                tracing::warn!(failed, "Some jobs failed");
            }
            return Ok(());
        }
        Command::Evict => return Ok(()),
    };

    let envelope = JobEnvelope {
        id: cli_job_id(job.kind()),
        job,
    };
    let report = worker.handle(envelope).await;
    print_report(&report)?;
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
