// crates/cli/src/main.rs
//! Thin ops binary wiring the engine's three crates together for manual
//! use: a full indexing pass, a ranked search, and a summary report.
//! Ambient tooling — ordinary consumers are the HTTP layer and watcher
//! described in spec §6, which this binary does not attempt to replace.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::FmtSubscriber;

use claude_index_db::{Database, Store};
use claude_index_indexer::run_full_pass;
use claude_index_query::{search_sessions, SearchOptions, SearchResult};

fn usage() -> ! {
    eprintln!(
        "usage:\n  \
         claude-index index [claude_home] [db_path]\n  \
         claude-index search <query> [db_path]\n  \
         claude-index stats [db_path]"
    );
    std::process::exit(2);
}

fn resolve_claude_home(arg: Option<&String>) -> Result<PathBuf> {
    if let Some(arg) = arg {
        return Ok(PathBuf::from(arg));
    }
    claude_index_core::paths::claude_home().context("could not determine a default claude_home (set CLAUDE_INDEX_HOME)")
}

fn resolve_db_path(arg: Option<&String>) -> Result<PathBuf> {
    if let Some(arg) = arg {
        return Ok(PathBuf::from(arg));
    }
    claude_index_core::paths::db_path().context("could not determine a default db_path (set CLAUDE_INDEX_DB_PATH)")
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        usage();
    };

    match command.as_str() {
        "index" => run_index(args.get(1), args.get(2)).await,
        "search" => {
            let Some(query) = args.get(1) else {
                usage();
            };
            run_search(query, args.get(2)).await
        }
        "stats" => run_stats(args.get(1)).await,
        _ => usage(),
    }
}

async fn run_index(claude_home_arg: Option<&String>, db_path_arg: Option<&String>) -> Result<()> {
    let claude_home = resolve_claude_home(claude_home_arg)?;
    let projects_root = claude_home.join("projects");
    if !projects_root.is_dir() {
        bail!(
            "projects root not found: {} (pass claude_home explicitly, or set CLAUDE_INDEX_HOME)",
            projects_root.display()
        );
    }
    let db_path = resolve_db_path(db_path_arg)?;

    eprintln!("claude-index v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("indexing {} -> {}", projects_root.display(), db_path.display());

    let db = Database::new(&db_path).await.context("failed to open database")?;
    let store = Store::new(&db);

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancellation requested, finishing the file in flight and stopping");
            cancel_for_signal.store(true, Ordering::Relaxed);
        }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} indexing {msg}")
            .expect("valid spinner template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let stats = run_full_pass(&store, &projects_root, 50, cancel.as_ref(), |done, total| {
        pb.set_message(format!("{done}/{total} files"));
    })
    .await
    .context("indexing pass failed")?;

    pb.finish_and_clear();

    eprintln!(
        "scanned {} · indexed {} · skipped {} · removed {} · errors {} · projects resolved {}",
        stats.scanned,
        stats.indexed,
        stats.skipped,
        stats.removed,
        stats.errors,
        stats.project_names_resolved,
    );

    Ok(())
}

async fn run_search(query: &str, db_path_arg: Option<&String>) -> Result<()> {
    let db_path = resolve_db_path(db_path_arg)?;
    let db = Database::new(&db_path).await.context("failed to open database")?;
    let store = Store::new(&db);

    let opts = SearchOptions {
        limit: 20,
        offset: 0,
        project: None,
        include_subagents: false,
    };

    match search_sessions(&store, query, &opts).await? {
        SearchResult::Flat(hits) if hits.is_empty() => {
            println!("no results for {query:?}");
        }
        SearchResult::Flat(hits) => {
            for hit in hits {
                println!(
                    "[{:.3}] {} ({})\n    {}\n",
                    hit.relevance,
                    hit.session.id,
                    hit.session.project,
                    if hit.snippet.is_empty() { "<no snippet>" } else { hit.snippet.as_str() },
                );
            }
        }
        SearchResult::Grouped(_) => unreachable!("include_subagents was not requested"),
    }

    Ok(())
}

async fn run_stats(db_path_arg: Option<&String>) -> Result<()> {
    let db_path = resolve_db_path(db_path_arg)?;
    let db = Database::new(&db_path).await.context("failed to open database")?;
    let store = Store::new(&db);

    let summary = store.summary().await?;
    println!(
        "{} sessions · {} messages · {} tokens · {} bytes · {} projects · {} active in last 24h",
        summary.session_count,
        summary.message_count,
        summary.tokens_total,
        summary.bytes_total,
        summary.project_count,
        summary.sessions_last_24h,
    );

    let tools = store.tool_stats().await?;
    if !tools.is_empty() {
        println!("\ntool usage:");
        for (name, stat) in tools {
            println!("  {name:<20} {:>6} calls across {} sessions", stat.total_calls, stat.distinct_sessions);
        }
    }

    let projects = store.list_projects().await?;
    if !projects.is_empty() {
        println!("\nprojects:");
        for project in projects {
            println!("  {project}");
        }
    }

    Ok(())
}
