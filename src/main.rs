//! Madara-Harvest main entry point
//!
//! This is the command-line interface for the Madara-Harvest manga harvester.

use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};
use madara_harvest::config::{load_config_with_hash, Config};
use madara_harvest::queue::{Priority, QueueAction, QueueKind};
use madara_harvest::report::{load_statistics, print_statistics};
use madara_harvest::scheduler;
use madara_harvest::storage::{lock_storage, open_storage, LogLevel, SharedStorage};
use madara_harvest::Harvester;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Entries shown per page in `--logs`
const LOGS_PER_PAGE: usize = 50;

/// Madara-Harvest: a scheduled manga scrape-and-ingest pipeline
///
/// Madara-Harvest discovers manga on configured sites, queues their chapter
/// lists and attaches chapter images to a local content repository, with
/// caching, proxy rotation and retry discipline on every request.
#[derive(Parser, Debug)]
#[command(name = "madara-harvest")]
#[command(version)]
#[command(about = "A scheduled manga scrape-and-ingest pipeline", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .args([
            "once", "discover", "drain_manga", "drain_chapters", "health_check",
            "stats", "clear_cache", "clear_logs", "logs", "list", "pause", "resume",
            "requeue", "queue_action", "delete_item",
        ])
        .multiple(false)
))]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Report what would be queued without writing to the queues or repository
    #[arg(long)]
    dry_run: bool,

    /// Run one manga batch and one chapter batch, then exit
    #[arg(long)]
    once: bool,

    /// Discover manga on every configured site and exit
    #[arg(long)]
    discover: bool,

    /// List pages to read per site when discovering
    #[arg(long, value_name = "N", default_value_t = 1, requires = "discover")]
    pages: u32,

    /// Run one manga batch and exit
    #[arg(long)]
    drain_manga: bool,

    /// Run one chapter batch and exit
    #[arg(long)]
    drain_chapters: bool,

    /// Check every site's list page and selector, then exit
    #[arg(long)]
    health_check: bool,

    /// Show statistics from the database and exit
    #[arg(long)]
    stats: bool,

    /// Empty the response cache and exit
    #[arg(long)]
    clear_cache: bool,

    /// Delete every activity log entry and exit
    #[arg(long)]
    clear_logs: bool,

    /// Show the activity log and exit
    #[arg(long)]
    logs: bool,

    /// Only show log entries of this level
    #[arg(long, value_enum, requires = "logs")]
    level: Option<LevelArg>,

    /// Log page to show (1-based)
    #[arg(long, value_name = "N", default_value_t = 1, requires = "logs")]
    page: usize,

    /// List the tasks of a queue and exit
    #[arg(long, value_enum, value_name = "QUEUE")]
    list: Option<QueueArg>,

    /// Pause a queue and exit
    #[arg(long, value_enum, value_name = "QUEUE")]
    pause: Option<QueueArg>,

    /// Resume a paused queue and exit
    #[arg(long, value_enum, value_name = "QUEUE")]
    resume: Option<QueueArg>,

    /// Re-queue a content item for a chapter refresh and exit
    #[arg(long, value_name = "ITEM_ID")]
    requeue: Option<i64>,

    /// Drain priority of the re-queued task
    #[arg(long, value_enum, default_value_t = PriorityArg::Normal, requires = "requeue")]
    priority: PriorityArg,

    /// Pause, resume or delete queue entries by position (see --list), then exit
    #[arg(long, value_enum, value_name = "ACTION", requires = "queue", requires = "index")]
    queue_action: Option<QueueActionArg>,

    /// Queue targeted by --queue-action
    #[arg(long, value_enum, value_name = "QUEUE", requires = "queue_action")]
    queue: Option<QueueArg>,

    /// Zero-based queue positions targeted by --queue-action
    #[arg(long, value_name = "N", num_args = 1.., requires = "queue_action")]
    index: Vec<usize>,

    /// Delete a content item and its chapters, then exit
    #[arg(long, value_name = "ITEM_ID")]
    delete_item: Option<i64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueueArg {
    Manga,
    Chapters,
}

impl From<QueueArg> for QueueKind {
    fn from(queue: QueueArg) -> Self {
        match queue {
            QueueArg::Manga => QueueKind::Manga,
            QueueArg::Chapters => QueueKind::Chapter,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueueActionArg {
    Pause,
    Resume,
    Delete,
}

impl From<QueueActionArg> for QueueAction {
    fn from(action: QueueActionArg) -> Self {
        match action {
            QueueActionArg::Pause => QueueAction::Pause,
            QueueActionArg::Resume => QueueAction::Resume,
            QueueActionArg::Delete => QueueAction::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    Info,
    Warning,
    Error,
}

impl From<LevelArg> for LogLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warning => LogLevel::Warning,
            LevelArg::Error => LogLevel::Error,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        config.harvest.dry_run = true;
    }

    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open {}", config.output.database_path))?;

    // Modes that only read or edit storage
    if cli.stats {
        return handle_stats(&config, &storage);
    }
    if cli.logs {
        return handle_logs(&storage, cli.level.map(LogLevel::from), cli.page);
    }
    if let Some(queue) = cli.list {
        return handle_list(&storage, queue.into());
    }

    let harvester = Harvester::new(config, storage)?;

    if cli.once {
        let manga = harvester.drain_manga_queue().await?;
        let chapters = harvester.drain_chapter_queue().await?;
        println!(
            "Manga batch: {} item(s) added, {} chapter(s) queued, {} error(s)",
            manga.items_added, manga.chapters_queued, manga.errors
        );
        println!(
            "Chapter batch: {} chapter(s) attached, {} image(s), {} error(s)",
            chapters.chapters_attached, chapters.images_attached, chapters.errors
        );
    } else if cli.discover {
        let report = harvester.discover_all(cli.pages).await?;
        println!(
            "Discovery: {} found, {} queued, {} already queued, {} failed page(s)",
            report.found, report.queued, report.skipped, report.errors
        );
    } else if cli.drain_manga {
        let report = harvester.drain_manga_queue().await?;
        println!(
            "Manga batch: {} item(s) added, {} chapter(s) queued, {} error(s)",
            report.items_added, report.chapters_queued, report.errors
        );
    } else if cli.drain_chapters {
        let report = harvester.drain_chapter_queue().await?;
        println!(
            "Chapter batch: {} chapter(s) attached, {} image(s), {} error(s)",
            report.chapters_attached, report.images_attached, report.errors
        );
    } else if cli.health_check {
        for (site, status) in harvester.check_site_health().await? {
            if status.reason.is_empty() {
                println!("  {}: ok", site);
            } else {
                println!("  {}: {}", site, status.reason);
            }
        }
    } else if cli.clear_cache {
        let removed = harvester.clear_cache()?;
        println!("✓ Removed {} cached response(s)", removed);
    } else if let Some(queue) = cli.pause {
        set_paused(&harvester, queue, true)?;
    } else if let Some(queue) = cli.resume {
        set_paused(&harvester, queue, false)?;
    } else if let Some(item_id) = cli.requeue {
        let task = harvester.requeue_content_item(item_id, cli.priority.into())?;
        println!(
            "✓ Re-queued '{}' from {} ({:?} priority)",
            task.title, task.site_name, task.priority
        );
    } else if let Some(action) = cli.queue_action {
        let queue = cli.queue.context("--queue-action needs --queue")?;
        let changed = harvester.apply_queue_action(queue.into(), &cli.index, action.into())?;
        println!("✓ {:?} applied to {} {:?} task(s)", action, changed, queue);
    } else if cli.clear_logs {
        let removed = harvester.clear_logs()?;
        println!("✓ Removed {} log entr(ies)", removed);
    } else if let Some(item_id) = cli.delete_item {
        harvester.delete_content_item(item_id)?;
        println!("✓ Deleted content item {}", item_id);
    } else {
        tracing::info!(
            "Starting scheduler for {} site(s)",
            harvester.registry().len()
        );
        scheduler::run(&harvester).await;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("madara_harvest=info,warn"),
            1 => EnvFilter::new("madara_harvest=debug,info"),
            2 => EnvFilter::new("madara_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn set_paused(harvester: &Harvester, queue: QueueArg, paused: bool) -> anyhow::Result<()> {
    match queue {
        QueueArg::Manga => harvester.set_manga_paused(paused)?,
        QueueArg::Chapters => harvester.set_chapter_paused(paused)?,
    }
    println!(
        "✓ {:?} queue {}",
        queue,
        if paused { "paused" } else { "resumed" }
    );
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, storage: &SharedStorage) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let stats = {
        let guard = lock_storage(storage)?;
        load_statistics(&*guard, chrono::Utc::now())?
    };
    print_statistics(&stats);

    Ok(())
}

/// Handles the --logs mode: prints one page of the activity log, newest first
fn handle_logs(storage: &SharedStorage, level: Option<LogLevel>, page: usize) -> anyhow::Result<()> {
    let guard = lock_storage(storage)?;
    let total = guard.count_logs(level)?;
    let offset = page.saturating_sub(1) * LOGS_PER_PAGE;
    let entries = guard.list_logs(level, offset, LOGS_PER_PAGE)?;

    let pages = (total as usize).div_ceil(LOGS_PER_PAGE).max(1);
    println!("=== Activity Log (page {} of {}, {} entries) ===\n", page, pages, total);
    for entry in entries {
        println!(
            "{} [{}] {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.level.to_db_string(),
            entry.message
        );
    }

    Ok(())
}

/// Handles the --list mode: prints every task of a queue in order
fn handle_list(storage: &SharedStorage, queue: QueueKind) -> anyhow::Result<()> {
    let guard = lock_storage(storage)?;

    match queue {
        QueueKind::Manga => {
            let tasks = guard.list_manga()?;
            println!("=== Manga Queue ({} tasks) ===\n", tasks.len());
            for (index, task) in tasks.iter().enumerate() {
                println!(
                    "{:>4}. [{}] {} ({}) priority={:?} retries={}{}",
                    index,
                    task.status.to_db_string(),
                    task.title,
                    task.site_name,
                    task.priority,
                    task.retry_count,
                    task.error_reason
                        .as_deref()
                        .map(|r| format!(" - {}", r))
                        .unwrap_or_default()
                );
            }
        }
        QueueKind::Chapter => {
            let tasks = guard.list_chapters()?;
            println!("=== Chapter Queue ({} tasks) ===\n", tasks.len());
            for (index, task) in tasks.iter().enumerate() {
                println!(
                    "{:>4}. [{}] {} / {} ({})",
                    index,
                    task.status.to_db_string(),
                    task.manga_title,
                    task.chapter_title,
                    task.site_name
                );
            }
        }
    }

    Ok(())
}
