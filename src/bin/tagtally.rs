//! tagtally CLI: register books, submit user tags, moderate the directory.
//!
//! Usage:
//!   tagtally book add <id> <title> [--seed name=count ...]
//!   tagtally tags submit <user> <book> [--id N ...] [--name TEXT ...]
//!   tagtally tag merge <alias> <target>
//!   tagtally audit

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tagtally::{
    Book, BookId, EngineConfig, OpenStore, SeedTag, SqliteStore, TagEngine, TagError, TagId,
    TagSubmission, UserId,
};

#[derive(Parser)]
#[command(
    name = "tagtally",
    version,
    about = "Tag attribution and aggregation for a book catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML engine config
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage books
    Book {
        #[command(subcommand)]
        action: BookAction,
    },
    /// Read or change a user's tags on a book
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },
    /// Moderate the tag directory
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Check every counter against its attributions
    Audit,
}

#[derive(Subcommand)]
enum BookAction {
    /// Register a book with optional editorial seed tags
    Add {
        id: i64,
        title: String,
        /// Seed weight as name=count (repeatable)
        #[arg(long = "seed", value_parser = parse_seed)]
        seeds: Vec<SeedTag>,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Replace the user's tags on a book
    Submit {
        user: i64,
        book: i64,
        /// Existing tag id (repeatable)
        #[arg(long = "id")]
        ids: Vec<i64>,
        /// Free-text tag name (repeatable)
        #[arg(long = "name")]
        names: Vec<String>,
    },
    /// Remove all of the user's tags on a book
    Clear { user: i64, book: i64 },
    /// Show the user's current tags on a book
    Show { user: i64, book: i64 },
    /// Rank a book's tags by count
    Top {
        book: i64,
        /// Number of tags to show (defaults to the configured limit)
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// Block a tag from future submissions
    Block { id: i64 },
    /// Return a blocked tag to active
    Unblock { id: i64 },
    /// Merge an alias into a canonical tag
    Merge { alias: i64, target: i64 },
    /// Show global usage summed across the alias group
    Usage { id: i64 },
}

fn parse_seed(raw: &str) -> Result<SeedTag, String> {
    let (name, count) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected name=count, got '{}'", raw))?;
    let count = count
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid seed count '{}': {}", count, e))?;
    Ok(SeedTag::new(name, count))
}

/// Get the default database path (~/.local/share/tagtally/tagtally.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("tagtally").join("tagtally.db")
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn open_engine(db: Option<PathBuf>, config: Option<PathBuf>) -> Result<TagEngine, String> {
    let config = match config {
        Some(path) => EngineConfig::from_yaml_file(&path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?,
        None => EngineConfig::default(),
    };
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    TagEngine::with_config(Arc::new(store), config)
        .map_err(|e| format!("Failed to configure database: {}", e))
}

/// Print a result as JSON, or the error on stderr
fn emit<T: Serialize>(result: Result<T, TagError>) -> i32 {
    match result {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) if e.is_retryable() => {
            eprintln!("Error: {} (retry)", e);
            // EX_TEMPFAIL
            75
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run(engine: &TagEngine, command: Commands) -> i32 {
    match command {
        Commands::Book {
            action: BookAction::Add { id, title, seeds },
        } => emit(engine.register_book(Book::new(BookId::new(id), title), &seeds)),
        Commands::Tags { action } => match action {
            TagsAction::Submit {
                user,
                book,
                ids,
                names,
            } => {
                let submission = TagSubmission {
                    existing_tag_ids: ids.into_iter().map(TagId::new).collect(),
                    new_tag_names: names,
                };
                emit(engine.submit_tags(UserId::new(user), BookId::new(book), &submission))
            }
            TagsAction::Clear { user, book } => {
                emit(engine.clear_tags(UserId::new(user), BookId::new(book)))
            }
            TagsAction::Show { user, book } => {
                emit(engine.attributed_tags(UserId::new(user), BookId::new(book)))
            }
            TagsAction::Top { book, limit } => {
                let limit = limit.unwrap_or(engine.config().default_top_limit);
                emit(engine.top_tags_for_book(BookId::new(book), limit))
            }
        },
        Commands::Tag { action } => match action {
            TagAction::Block { id } => emit(engine.block_tag(TagId::new(id))),
            TagAction::Unblock { id } => emit(engine.unblock_tag(TagId::new(id))),
            TagAction::Merge { alias, target } => {
                emit(engine.merge_tag(TagId::new(alias), TagId::new(target)))
            }
            TagAction::Usage { id } => emit(engine.tag_usage(TagId::new(id))),
        },
        Commands::Audit => {
            let result = engine.audit_counters();
            let clean = matches!(&result, Ok(report) if report.is_clean());
            let code = emit(result);
            if code == 0 && !clean {
                2
            } else {
                code
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let engine = match open_engine(cli.db, cli.config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let code = run(&engine, cli.command);
    std::process::exit(code);
}
