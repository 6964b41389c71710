//! lesson-history: terminal front end for the saved-lesson history
//!
//! Lists, searches, opens and deletes saved lessons. Opening a gated quiz
//! result goes through the credit gate and asks before spending.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lesson_history::{
    AccessGate, AccountStore, Config, FileStorage, HistoryError, HistoryRecord, HistorySession,
    HistoryStore, HttpAccountSync, LessonViewer, LocalStorage, Outcome, Prompt, Role, UserAccount,
};

#[derive(Parser, Debug)]
#[command(name = "lesson-history")]
#[command(about = "Browse saved lessons and quizzes")]
struct Args {
    /// Path to config file (defaults to <data-dir>/config.toml when present)
    #[arg(short, long, env = "LESSON_HISTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(short, long, env = "LESSON_HISTORY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List saved records, newest first
    List {
        /// Case-insensitive filter on title or subject
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Open a record, paying credits if it is gated
    Open {
        id: String,
        /// Answer yes to the cost prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete a record
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Append records from a JSON array file
    Import { file: PathBuf },
    /// Store the signed-in account from a JSON file
    SetAccount { file: PathBuf },
    /// Show the signed-in account
    Whoami,
}

/// Prints opened records to stdout
struct TerminalViewer;

impl LessonViewer for TerminalViewer {
    fn show(&mut self, record: &HistoryRecord) {
        println!("{} ({})", record.title, record.subject_name);
        println!("{} | {}", record.category, record.date_created.format("%Y-%m-%d %H:%M"));
        match serde_json::to_string_pretty(&record.payload) {
            Ok(body) => println!("{}", body),
            Err(e) => warn!(error = %e, "Failed to render record payload"),
        }
    }

    fn close(&mut self) {}
}

/// Yes/no questions on stdin
struct StdinPrompt {
    assume_yes: bool,
}

impl Prompt for StdinPrompt {
    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            println!("{} yes", message);
            return true;
        }

        print!("{} [y/N] ", message);
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn alert(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("lesson_history=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let storage: Arc<dyn LocalStorage> = Arc::new(
        FileStorage::new(&config.storage_dir)
            .with_context(|| format!("opening {}", config.storage_dir.display()))?,
    );
    let accounts = AccountStore::new(storage.clone(), config.user_slot.clone());

    match args.command {
        Command::List { query } => {
            let store = HistoryStore::open(storage, config.history_slot.clone());
            let query = query.unwrap_or_default();
            let hits = lesson_history::search(&query, store.records());
            if hits.is_empty() {
                println!("No saved records.");
            }
            for record in hits {
                println!(
                    "{}  {}  [{}]  {} | {}",
                    record.id,
                    record.date_created.format("%Y-%m-%d"),
                    record.category,
                    record.title,
                    record.subject_name
                );
            }
        }
        Command::Open { id, yes } => {
            let mut session = open_session(&config, storage, accounts);
            let mut prompt = StdinPrompt { assume_yes: yes };

            let outcome = session.request_open(&id);
            match session.resolve(outcome, &mut prompt)? {
                Outcome::Opened { charged, .. } if charged > 0 => {
                    println!("Charged {} credit(s); {} left.", charged, session.user().credits);
                }
                Outcome::NotFound { id } => bail!("no record with id {}", id),
                _ => {}
            }
            session.gate().settle(Duration::from_secs(5)).await;
        }
        Command::Delete { id, yes } => {
            let mut session = open_session(&config, storage, accounts);
            let mut prompt = StdinPrompt { assume_yes: yes };

            let outcome = session.request_delete(&id);
            match session.resolve(outcome, &mut prompt)? {
                Outcome::Deleted { id } => println!("Deleted {}.", id),
                Outcome::NotFound { id } => bail!("no record with id {}", id),
                _ => {}
            }
        }
        Command::Import { file } => {
            let mut store = HistoryStore::open(storage, config.history_slot.clone());
            let imported = import_records(&mut store, &file)?;
            info!(imported, total = store.len(), "Import finished");
            println!("Imported {} record(s).", imported);
        }
        Command::SetAccount { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let account: UserAccount = serde_json::from_str(&text)?;
            accounts.save(&account)?;
            println!("Signed in as {} ({} credits).", account.id, account.credits);
        }
        Command::Whoami => match accounts.load() {
            Some(account) => {
                let now = chrono::Utc::now();
                println!("{} [{}]", account.id, account.role);
                println!("credits: {}", account.credits);
                if account.is_exempt(now) {
                    println!("history reopening is free for this account");
                } else {
                    println!("history reopening costs {} credit(s)", config.settings.resolved_cost());
                }
            }
            None => println!("No signed-in account."),
        },
    }

    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut defaults = Config::default();
            if let Some(dir) = &args.data_dir {
                defaults.storage_dir = dir.clone();
            }
            let path = defaults.config_path();
            if path.exists() {
                Config::load(&path).with_context(|| format!("loading {}", path.display()))?
            } else {
                defaults
            }
        }
    };

    if let Some(dir) = &args.data_dir {
        config.storage_dir = dir.clone();
    }
    Ok(config)
}

fn open_session(
    config: &Config,
    storage: Arc<dyn LocalStorage>,
    accounts: AccountStore,
) -> HistorySession<TerminalViewer> {
    let user = accounts.load().unwrap_or_else(|| {
        warn!("No stored account, continuing as guest");
        UserAccount::new("guest", Role::Student, 0)
    });

    let mut gate = AccessGate::new(config.settings.clone(), accounts);
    if let Some(sync) = &config.sync {
        let client = match &sync.api_key {
            Some(key) => HttpAccountSync::with_api_key(sync.base_url.clone(), key.clone()),
            None => HttpAccountSync::new(sync.base_url.clone()),
        };
        gate = gate.with_sync(Arc::new(client));
    }

    let store = HistoryStore::open(storage, config.history_slot.clone());
    HistorySession::new(store, gate, user, TerminalViewer)
}

/// Append records from a JSON array, generating ids where missing
fn import_records(store: &mut HistoryStore, file: &Path) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&text)?;

    let mut imported = 0;
    for mut value in values {
        if let Some(object) = value.as_object_mut() {
            if !object.contains_key("id") {
                object.insert("id".into(), uuid::Uuid::new_v4().to_string().into());
            }
        }

        let record: HistoryRecord = serde_json::from_value(value)?;
        match store.append(record) {
            Ok(()) => imported += 1,
            Err(HistoryError::DuplicateRecord(id)) => warn!(id = %id, "Skipping duplicate record"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(imported)
}
