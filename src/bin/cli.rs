//! Catalog Tracker CLI
//!
//! Local execution entry point.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use catalog_tracker::{
    Tracker,
    config::{load_all, load_config},
    error::{AppError, Result},
    models::SourceDescriptor,
    pipeline::{AuditClass, RunReport, audit_dir},
    storage::{MigrationReport, StateStore},
    utils::console,
};
use tokio_util::sync::CancellationToken;

/// Catalog Tracker - playlist catalog history
#[derive(Parser, Debug)]
#[command(
    name = "tracker",
    version,
    about = "Fetch playlist catalogs and track their history per source"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress console progress output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every source (or the named ones) and apply new snapshots
    Run {
        /// Only process sources with these names or identifiers
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Apply snapshots already on disk without fetching
    Apply,

    /// Split the legacy history store into per-source shards
    Migrate,

    /// Classify every snapshot file on disk
    Audit,

    /// Remove repeated blocks from the change logs
    DedupeLogs,

    /// Show per-source state
    Status,

    /// Validate configuration and source list
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, default_level: &str) {
    let level = if verbose { "debug" } else { default_level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);
    console::init(cli.quiet);

    log::info!("Catalog tracker starting...");

    match cli.command {
        Command::Run { sources: filter } => {
            let (config, sources) = load_all(&cli.config)?;
            let sources = select_sources(sources, &filter)?;
            let tracker = Tracker::new(config)?;

            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, finishing in-flight work...");
                    signal.cancel();
                }
            });

            console::header(&format!("Fetching {} sources", sources.len()));
            let report = tracker.run(&sources, &cancel).await?;
            print_report(&report);
        }

        Command::Apply => {
            let (config, sources) = load_all(&cli.config)?;
            let tracker = Tracker::new(config)?;
            console::header("Applying snapshots on disk");

            let results = tracker.apply_all(&sources).await;
            let total = results.len();
            for (i, (source, result)) in results.iter().enumerate() {
                console::step(i + 1, total, &source.name);
                match result {
                    Ok(summary) => {
                        let (added, removed) = summary.totals();
                        console::sub_item(&format!(
                            "{} applied, {} items, +{} / -{}, {} rejected",
                            summary.applied(),
                            summary.item_count,
                            added,
                            removed,
                            summary.rejected.len()
                        ));
                    }
                    Err(e) => console::failure(&format!("{}: {}", source.name, e)),
                }
            }
        }

        Command::Migrate => {
            let tracker = Tracker::new(config)?;
            match tracker.migrate().await? {
                MigrationReport::NotFound => {
                    log::info!(
                        "No legacy store at {}",
                        tracker.config().paths.legacy_store.display()
                    );
                }
                MigrationReport::Migrated {
                    written,
                    skipped_existing,
                    skipped_invalid,
                    id_collisions,
                    archived_to,
                } => {
                    console::summary(
                        "Migration",
                        &[
                            ("Shards written", written.to_string()),
                            ("Existing shards kept", skipped_existing.to_string()),
                            ("Invalid entries skipped", skipped_invalid.to_string()),
                            ("Colliding names dropped", id_collisions.to_string()),
                            ("Legacy store moved to", archived_to.display().to_string()),
                        ],
                    );
                }
                MigrationReport::Quarantined { moved_to, reason } => {
                    console::failure(&format!(
                        "Migration failed ({}); legacy store moved to {}",
                        reason,
                        moved_to.display()
                    ));
                }
            }
        }

        Command::Audit => {
            let dir = &config.paths.snapshot_dir;
            console::header(&format!("Auditing {}", dir.display()));
            let entries = audit_dir(dir).await?;

            let mut counts: BTreeMap<AuditClass, usize> = BTreeMap::new();
            for entry in &entries {
                *counts.entry(entry.class).or_insert(0) += 1;
                let line = format!(
                    "{:>10}  {}  {}",
                    console::format_size(entry.size),
                    entry.class,
                    entry.path.display()
                );
                if entry.class.is_usable() {
                    console::success(&line);
                } else {
                    console::failure(&line);
                }
            }

            let items: Vec<(&str, String)> = counts
                .iter()
                .map(|(class, n)| (class_label(*class), n.to_string()))
                .collect();
            console::summary(&format!("{} files", entries.len()), &items);
        }

        Command::DedupeLogs => {
            let tracker = Tracker::new(config)?;
            let results = tracker.changelog().dedupe_all().await?;
            let removed: usize = results.iter().map(|(_, s)| s.removed).sum();
            for (path, stats) in results.iter().filter(|(_, s)| s.removed > 0) {
                console::sub_item(&format!(
                    "{}: {} of {} blocks removed",
                    path.display(),
                    stats.removed,
                    stats.blocks
                ));
            }
            console::summary(
                "Change log dedupe",
                &[
                    ("Logs checked", results.len().to_string()),
                    ("Blocks removed", removed.to_string()),
                ],
            );
        }

        Command::Status => {
            let (config, sources) = load_all(&cli.config)?;
            let tracker = Tracker::new(config)?;
            console::header("Source status");

            for source in &sources {
                let snapshots = tracker.snapshots().list(&source.id).await?;
                match tracker.shards().load(&source.id).await {
                    Ok(Some(state)) => console::success(&format!(
                        "{}: {} items, {} snapshots applied, last {}, {} on disk",
                        source.name,
                        state.current_items.len(),
                        state.processed_files.len(),
                        state
                            .last_applied
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "-".into()),
                        snapshots.len()
                    )),
                    Ok(None) => console::sub_item(&format!(
                        "{}: no history yet, {} on disk",
                        source.name,
                        snapshots.len()
                    )),
                    Err(e) => console::failure(&format!("{}: {}", source.name, e)),
                }
            }

            let errors = tracker.errors().read_all().await?;
            console::summary(
                "Totals",
                &[
                    ("Sources", sources.len().to_string()),
                    ("Error log entries", errors.len().to_string()),
                ],
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            let (_, sources) = load_all(&cli.config)?;
            log::info!("✓ Config OK");
            log::info!("✓ {} sources OK", sources.len());
            log::info!("All validations passed!");
        }
    }

    log::info!("Done!");

    Ok(())
}

/// Keep only the sources named on the command line (all when none are).
fn select_sources(
    sources: Vec<SourceDescriptor>,
    filter: &[String],
) -> Result<Vec<SourceDescriptor>> {
    if filter.is_empty() {
        return Ok(sources);
    }
    let selected: Vec<_> = sources
        .into_iter()
        .filter(|s| filter.iter().any(|f| f == &s.name || f == &s.id))
        .collect();
    if selected.is_empty() {
        return Err(AppError::config(format!(
            "No source matches {}",
            filter.join(", ")
        )));
    }
    Ok(selected)
}

fn class_label(class: AuditClass) -> &'static str {
    match class {
        AuditClass::Valid => "Valid",
        AuditClass::Short => "Short",
        AuditClass::Markup => "Markup",
        AuditClass::ErrorPayload => "Error payload",
        AuditClass::Empty => "Empty",
        AuditClass::Unknown => "Unknown",
    }
}

fn print_report(report: &RunReport) {
    let elapsed = report
        .finished_at
        .map(|end| (end - report.started_at).num_seconds())
        .unwrap_or(0);

    let mut items = vec![
        ("Sources", report.outcomes.len().to_string()),
        ("Fetched", report.fetched().to_string()),
        ("Cached", report.cached().to_string()),
        ("Failed", report.failed().to_string()),
        ("Retryable failures", report.retryable().to_string()),
        ("Snapshots applied", report.applied().to_string()),
        ("Elapsed", format!("{}s", elapsed)),
    ];
    if report.cancelled {
        items.push(("Skipped (cancelled)", report.skipped().to_string()));
    }
    console::summary("Run complete", &items);

    let by_kind = report.failures_by_kind();
    if !by_kind.is_empty() {
        let failures: Vec<(String, String)> = by_kind
            .iter()
            .map(|(kind, n)| (kind.to_string(), n.to_string()))
            .collect();
        let failures: Vec<(&str, String)> = failures
            .iter()
            .map(|(k, n)| (k.as_str(), n.clone()))
            .collect();
        console::summary("Failures by kind", &failures);
    }
}
