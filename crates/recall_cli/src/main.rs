//! Command-line entry point over `recall_core`.
//!
//! # Responsibility
//! - Wire settings, logging, the filesystem corpus and the store into one
//!   sync coordinator.
//! - Expose sync, statistics, queue, profile and snapshot commands for local use.

use clap::{Parser, Subcommand, ValueEnum};
use log::error;
use recall_core::model::now_epoch_ms;
use recall_core::{
    init_logging, load_settings, open_store, DeckId, DeckStats, FsCorpus, Settings,
    SyncCoordinator, SyncReport,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "recall", about = "Spaced-repetition decks from markdown notes", version)]
struct Cli {
    /// Notes directory scanned for decks
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// SQLite database file (default: from settings, else in-memory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Absolute directory for rolling log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize decks and cards with the notes directory
    Sync {
        /// Re-read documents even when unchanged
        #[arg(long)]
        force: bool,
    },

    /// List decks with their card counts
    Decks {
        /// Ignore per-day new/review limits
        #[arg(long)]
        no_limits: bool,
    },

    /// Aggregate counts for a tag and every tag nested below it
    Stats {
        /// Group tag, e.g. `flashcards/spanish`
        #[arg(long, default_value = "flashcards")]
        tag: String,
        /// Ignore per-day new/review limits
        #[arg(long)]
        no_limits: bool,
    },

    /// Show today's review queue for one deck
    Queue {
        /// Deck id as printed by `decks`
        deck: DeckId,
        /// Ignore per-day new/review limits
        #[arg(long)]
        no_limits: bool,
    },

    /// Assign a configured profile to a deck
    Profile {
        /// Deck id as printed by `decks`
        deck: DeckId,
        /// Profile name from the settings file
        name: String,
    },

    /// Write a JSON snapshot of all decks, cards and review logs
    Export { file: PathBuf },

    /// Replace the store contents with a snapshot
    Import { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_failed module=cli status=error error={message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut settings = match cli.settings.as_ref() {
        Some(path) => load_settings(path).map_err(|err| err.to_string())?,
        None => Settings::default(),
    };
    if cli.db.is_some() {
        settings.store.path = cli.db.clone();
    }
    if cli.log_dir.is_some() {
        settings.logging.dir = cli.log_dir.clone();
    }
    if settings.logging.dir.is_some() {
        init_logging(&settings.logging)?;
    }

    let store = open_store(&settings.store).map_err(|err| err.to_string())?;
    let corpus = FsCorpus::new(cli.root.clone());
    let coordinator = SyncCoordinator::new(store, Box::new(corpus), settings);
    let now = now_epoch_ms();

    match cli.command {
        Command::Sync { force } => {
            let report = coordinator
                .perform_sync(force)
                .map_err(|err| err.to_string())?;
            print_report(&report, cli.format)?;
            if !report.success {
                return Err(report.error.unwrap_or_else(|| "sync failed".to_string()));
            }
        }
        Command::Decks { no_limits } => {
            let decks = coordinator
                .with_store(|store| store.list_decks())
                .map_err(|err| err.to_string())?;
            let mut rows = Vec::with_capacity(decks.len());
            for deck in decks {
                let stats = coordinator
                    .deck_stats(deck.id, !no_limits, now)
                    .map_err(|err| err.to_string())?;
                rows.push((deck, stats));
            }
            match cli.format {
                OutputFormat::Json => {
                    let value: Vec<_> = rows
                        .iter()
                        .map(|(deck, stats)| serde_json::json!({ "deck": deck, "stats": stats }))
                        .collect();
                    print_json(&value)?;
                }
                OutputFormat::Plain => {
                    for (deck, stats) in rows {
                        println!("{}  {}  [{}]  {}", deck.id, deck.name, deck.tag, stats_line(&stats));
                    }
                }
            }
        }
        Command::Stats { tag, no_limits } => {
            let stats = coordinator
                .group_stats(&tag, !no_limits, now)
                .map_err(|err| err.to_string())?;
            match cli.format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Plain => println!("{tag}: {}", stats_line(&stats)),
            }
        }
        Command::Queue { deck, no_limits } => {
            let cards = coordinator
                .review_queue(deck, now, !no_limits)
                .map_err(|err| err.to_string())?;
            match cli.format {
                OutputFormat::Json => print_json(&cards)?,
                OutputFormat::Plain => {
                    for card in cards {
                        println!("{}  {:<10}  {}", card.id, card.state.as_str(), card.front);
                    }
                }
            }
        }
        Command::Profile { deck, name } => {
            let deck = coordinator
                .set_deck_profile(deck, &name)
                .map_err(|err| err.to_string())?;
            match cli.format {
                OutputFormat::Json => print_json(&deck)?,
                OutputFormat::Plain => println!("{}  {}  profile={}", deck.id, deck.name, deck.profile),
            }
        }
        Command::Export { file } => {
            let bytes = coordinator
                .with_store(|store| store.export_snapshot())
                .map_err(|err| err.to_string())?;
            std::fs::write(&file, bytes)
                .map_err(|err| format!("failed to write `{}`: {err}", file.display()))?;
        }
        Command::Import { file } => {
            let bytes = std::fs::read(&file)
                .map_err(|err| format!("failed to read `{}`: {err}", file.display()))?;
            coordinator
                .with_store(|store| {
                    store.import_snapshot(&bytes)?;
                    store.save()
                })
                .map_err(|err| err.to_string())?;
        }
    }
    Ok(())
}

fn stats_line(stats: &DeckStats) -> String {
    format!(
        "new={} due={} mature={} total={}",
        stats.new_count, stats.due_count, stats.mature_count, stats.total_count
    )
}

fn print_report(report: &SyncReport, format: OutputFormat) -> Result<(), String> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }
    println!(
        "decks={} cards={} operations={} time_ms={}{}",
        report.total_decks,
        report.total_flashcards,
        report.operations,
        report.sync_time_ms,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for failure in &report.deck_failures {
        println!("failed: {} [{}]: {}", failure.path, failure.tag, failure.error);
    }
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}
