use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use papershelf::config::Config;
use papershelf::docs::{DocumentFetcher, DocumentSource};
use papershelf::feed::RemoteFeedSource;
use papershelf::storage::{ReadStatus, StorageError};
use papershelf::sync::RefreshScheduler;
use papershelf::{ConnectivityMonitor, Database, FeedQuery, FeedSync, ViewMode};

/// Get the config directory path (~/.config/papershelf/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("papershelf"))
}

#[derive(Parser, Debug)]
#[command(name = "papershelf", about = "Local-first arXiv feed reader with offline document cache")]
struct Args {
    /// Directory for the database and config (defaults to ~/.config/papershelf)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Run without touching the network; cached data only
    #[arg(long)]
    offline: bool,

    /// Override the configured categories (comma separated)
    #[arg(long, value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// Override the configured keyword filter
    #[arg(long)]
    keywords: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the feed now and merge it into the local store
    Refresh,
    /// Print the cached feed for the current query
    List {
        /// Filter the list by a case-insensitive substring
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print bookmarked papers, most recently bookmarked first
    ReadingList,
    /// Toggle the bookmark on a paper
    Bookmark { id: String },
    /// Set the read status of a paper (unread, skimmed, read, deep)
    Status { id: String, status: String },
    /// Attach a note to a paper, or clear it
    Note {
        id: String,
        /// Note text; omit together with --clear to remove the note
        text: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    /// Fetch (or read from cache) the PDF for a paper
    Doc {
        id: String,
        /// Output file (defaults to <id>.pdf in the current directory)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Print document cache statistics
    CacheStats,
    /// Run the background refresh loop until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => get_config_dir()?,
    };
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let config = Config::load(&config_dir.join("config.toml"))?;

    let db_path = config_dir.join("papershelf.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of papershelf appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let connectivity = ConnectivityMonitor::new(!args.offline);

    let mut query = FeedQuery::new(
        args.categories
            .clone()
            .unwrap_or_else(|| config.default_categories.clone()),
        args.keywords.clone().unwrap_or_else(|| config.keywords.clone()),
    );
    query.max_results = config.max_results;

    let source =
        RemoteFeedSource::new(&config.feed_base_url).context("Invalid feed_base_url in config")?;
    let engine = Arc::new(FeedSync::new(db.clone(), source, connectivity.clone(), query));

    match args.command {
        Command::Refresh => {
            let stats = engine.fetch_feed().await?;
            println!(
                "Refreshed: {} new, {} updated ({} total upstream)",
                stats.inserted, stats.updated, stats.total_results
            );
        }
        Command::List { filter } => {
            engine.load_cached().await;
            if let Some(banner) = engine.banner() {
                eprintln!("Warning: {banner}");
            }
            if let Some(text) = filter {
                engine.set_local_filter(text);
            }
            print_papers(&engine.papers());
            if engine.papers().is_empty() && engine.last_refresh().is_none() {
                eprintln!("No cached feed for this query yet. Run `papershelf refresh`.");
            }
        }
        Command::ReadingList => {
            engine.set_view_mode(ViewMode::ReadingList).await?;
            print_papers(&engine.papers());
        }
        Command::Bookmark { id } => {
            let paper = engine.toggle_bookmark(&id).await?;
            if paper.bookmarked {
                println!("Bookmarked {}", paper.id);
            } else {
                println!("Removed bookmark from {}", paper.id);
            }
        }
        Command::Status { id, status } => {
            let status = parse_status(&status)?;
            let paper = engine.set_status(&id, status).await?;
            println!("{} -> {}", paper.id, paper.status.as_str());
        }
        Command::Note { id, text, clear } => {
            let note = match (text, clear) {
                (_, true) => None,
                (Some(text), false) => Some(text),
                (None, false) => {
                    anyhow::bail!("Provide note text, or --clear to remove the note")
                }
            };
            let paper = engine.set_note(&id, note).await?;
            match &paper.note {
                Some(_) => println!("Note saved on {}", paper.id),
                None => println!("Note cleared on {}", paper.id),
            }
        }
        Command::Doc { id, out } => {
            let pdf_url = db
                .get_paper(&id)
                .await?
                .and_then(|p| p.pdf_url);
            let fetcher = DocumentFetcher::new(db.clone(), connectivity.clone())
                .with_cache_cap(config.document_cache_bytes());

            let doc = fetcher
                .resolve(&id, pdf_url.as_deref(), |loaded, total| match total {
                    Some(total) if total > 0 => {
                        eprint!("\rDownloading: {:>3}%", loaded * 100 / total)
                    }
                    _ => eprint!("\rDownloading: {loaded} bytes"),
                })
                .await?;
            if doc.source == DocumentSource::Network {
                eprintln!();
            }

            let out = out.unwrap_or_else(|| PathBuf::from(format!("{id}.pdf")));
            std::fs::write(&out, &doc.data)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            let origin = match doc.source {
                DocumentSource::Cache => "cache",
                DocumentSource::Network => "network",
            };
            println!("Wrote {} ({} bytes, from {origin})", out.display(), doc.data.len());
        }
        Command::CacheStats => {
            let fetcher = DocumentFetcher::new(db.clone(), connectivity.clone());
            let stats = fetcher.cache_stats().await?;
            println!(
                "{} documents, {:.1} MB",
                stats.total_entries,
                stats.total_size_bytes as f64 / (1024.0 * 1024.0)
            );
        }
        Command::Watch => {
            if config.refresh_interval_minutes == 0 {
                anyhow::bail!("refresh_interval_minutes is 0 (manual refresh only)");
            }
            engine.load_cached().await;
            if let Err(e) = engine.fetch_feed().await {
                tracing::warn!(error = %e, "Initial refresh failed, continuing with cache");
            }

            let mut scheduler =
                RefreshScheduler::new(Duration::from_secs(config.refresh_interval_minutes * 60));
            scheduler.start(engine.clone());
            println!(
                "Refreshing every {} minutes. Press Ctrl-C to stop.",
                config.refresh_interval_minutes
            );

            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            scheduler.stop();
            println!("Stopped.");
        }
    }

    Ok(())
}

fn parse_status(s: &str) -> Result<ReadStatus> {
    match s {
        "unread" => Ok(ReadStatus::Unread),
        "skimmed" => Ok(ReadStatus::Skimmed),
        "read" => Ok(ReadStatus::Read),
        "deep" => Ok(ReadStatus::Deep),
        other => anyhow::bail!("Unknown status '{other}' (expected unread, skimmed, read, deep)"),
    }
}

fn print_papers(papers: &[papershelf::storage::Paper]) {
    for paper in papers {
        let bookmark = if paper.bookmarked { "*" } else { " " };
        let note = if paper.note.is_some() { " [note]" } else { "" };
        println!(
            "{bookmark} {:<14} {:<8} {}{note}",
            paper.id,
            paper.status.as_str(),
            paper.title
        );
    }
}
