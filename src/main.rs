use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use feedmill::config::Config;
use feedmill::feed::{self, RefreshEvent, RefreshReport};
use feedmill::storage::{ContentItem, Database, DatabaseError, FeedSource};

/// Get the config directory path (~/.config/feedmill/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedmill"))
}

#[derive(Parser, Debug)]
#[command(name = "feedmill", version, about = "Ingest RSS, Atom and RDF feeds into SQLite")]
struct Args {
    /// Config file (default: ~/.config/feedmill/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (default: `database_path` from the config, else
    /// feedmill.db next to the config file)
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed and register it for an owner
    Add {
        #[arg(long)]
        owner: String,
        url: String,
    },
    /// Re-ingest every feed of an owner
    Refresh {
        #[arg(long)]
        owner: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List an owner's feeds
    List {
        #[arg(long)]
        owner: String,
    },
    /// Show the newest content of one feed
    Show {
        feed_id: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Content published today (UTC) across an owner's feeds
    Today {
        #[arg(long)]
        owner: String,
    },
    /// Replace an item's body with the full article from its page
    FetchContent { feed_id: i64, content_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = resolve_config_path(args.config.clone(), get_config_dir)?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.database.clone() {
        Some(path) => path,
        None => {
            let db_path = config.resolve_database_path(&config_path);
            // Only the default config directory is created and restricted.
            if args.config.is_none() && config.database_path.is_none() {
                if let Some(dir) = db_path.parent() {
                    ensure_private_dir(dir)?;
                }
            }
            db_path
        }
    };
    let db = open_database(&db_path).await?;

    let opts = config.fetch_options();
    let client = feed::build_client(&opts).context("Failed to build HTTP client")?;

    match args.command {
        Command::Add { owner, url } => {
            let (source, outcome) = feed::add_feed(&db, &client, &opts, &owner, &url)
                .await
                .with_context(|| format!("Failed to add feed {url}"))?;
            println!(
                "Added feed {} ({}): {} items, {} new",
                source.id,
                source.title.as_deref().unwrap_or(&source.feed_url),
                outcome.items_fetched,
                outcome.items_inserted
            );
        }
        Command::Refresh { owner, json } => {
            let (tx, rx) = mpsc::channel(32);
            let printer = tokio::spawn(print_progress(rx));
            let report = feed::refresh_all(&db, &client, &opts, &owner, Some(tx))
                .await
                .context("Failed to load feeds")?;
            finish_printer(printer).await;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                print_report(&report);
            }
        }
        Command::List { owner } => {
            let sources = db
                .get_feed_sources_for_owner(&owner)
                .await
                .context("Failed to load feeds")?;
            if sources.is_empty() {
                println!("No feeds registered for {owner}");
            }
            for source in &sources {
                print_source(source);
            }
        }
        Command::Show { feed_id, limit } => {
            let source = db
                .get_feed_source(feed_id)
                .await
                .context("Failed to load feed")?
                .with_context(|| format!("No feed with id {feed_id}"))?;
            print_source(&source);
            let items = db
                .get_content_for_feed(feed_id, Some(limit))
                .await
                .context("Failed to load content")?;
            for item in &items {
                print_item(item);
            }
        }
        Command::Today { owner } => {
            let start = Utc::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .context("Invalid start of day")?
                .and_utc();
            let items = db
                .get_content_published_between(&owner, start, start + Duration::days(1))
                .await
                .context("Failed to load today's content")?;
            if items.is_empty() {
                println!("Nothing published today");
            }
            for item in &items {
                print_item(item);
            }
        }
        Command::FetchContent { feed_id, content_id } => {
            let item = feed::fetch_full_content(&db, &client, &opts, feed_id, content_id)
                .await
                .with_context(|| format!("Failed to fetch content {content_id} of feed {feed_id}"))?;
            print_item(&item);
            println!(
                "Stored {} bytes of article content",
                item.content.as_deref().map_or(0, str::len)
            );
        }
    }

    Ok(())
}

/// Explicit `--config` path, else `config.toml` in the default config
/// directory. `config_dir` is only consulted when no path is given.
fn resolve_config_path(
    explicit: Option<PathBuf>,
    config_dir: impl FnOnce() -> Result<PathBuf>,
) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(config_dir()?.join("config.toml")),
    }
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database at {} is locked by another process.", path.display());
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

/// Creates the directory if needed and restricts it to the current user.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    // SEC-007: user-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to set directory permissions to 0700");
        }
    }
    Ok(())
}

/// Waits for the progress printer. Its failure never fails the command.
async fn finish_printer(printer: JoinHandle<()>) {
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "Progress printer task ended abnormally");
    }
}

async fn print_progress(mut rx: mpsc::Receiver<RefreshEvent>) {
    let mut total = 0;
    while let Some(event) = rx.recv().await {
        match event {
            RefreshEvent::Started { total: t } => total = t,
            RefreshEvent::FeedFinished { index, succeeded, .. } => {
                eprintln!(
                    "[{}/{}] {}",
                    index + 1,
                    total,
                    if succeeded { "ok" } else { "failed" }
                );
            }
            RefreshEvent::FeedStarted { .. } | RefreshEvent::Completed { .. } => {}
        }
    }
}

fn print_report(report: &RefreshReport) {
    for result in &report.results {
        match &result.result {
            Ok(outcome) => println!(
                "  ok      {} ({} items, {} new)",
                result.feed_url, outcome.items_fetched, outcome.items_inserted
            ),
            Err(e) => println!("  failed  {}: {}", result.feed_url, e),
        }
    }
    println!(
        "{} of {} feeds refreshed, {} new items",
        report.success_count,
        report.results.len(),
        report.total_items_inserted
    );
}

fn print_source(source: &FeedSource) {
    println!(
        "{:>5}  {}  <{}>",
        source.id,
        source.title.as_deref().unwrap_or("(untitled)"),
        source.feed_url
    );
    if let Some(error) = &source.last_error {
        println!("       last error: {error}");
    }
}

fn print_item(item: &ContentItem) {
    let published = item
        .published_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "----------------".to_string());
    println!(
        "{:>5}  {}  {}",
        item.id,
        published,
        item.title.as_deref().unwrap_or(&item.content_url)
    );
    if let Some(snippet) = &item.content_snippet {
        println!("                           {snippet}");
    }
}
