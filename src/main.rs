use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bulletin::channel::LoaderChannel;
use bulletin::config::Config;
use bulletin::controller::Controller;
use bulletin::loader::{self, Fetcher, LoaderSettings};
use bulletin::preferences::PreferenceManager;
use bulletin::protocol::parse_transcript;
use bulletin::reporter::ErrorReporter;
use bulletin::session::{Effect, SessionMachine};
use bulletin::storage::{Database, DatabaseError};
use bulletin::ui;

/// Get the config directory path (~/.config/bulletin/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("bulletin"))
}

#[derive(Parser, Debug)]
#[command(name = "bulletin", about = "Terminal news reader with background loading")]
struct Args {
    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Config file (defaults to ~/.config/bulletin/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable exactly these categories, by name
    #[arg(long, value_name = "A,B,...", value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// Replay a JSON-lines loader transcript offline and print the phases
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(transcript) = &args.replay {
        return replay(transcript, &config);
    }

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    let db_path = config_dir.join("bulletin.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of bulletin appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    if !db.is_initialized().await? {
        db.seed_default_categories(&config.categories)
            .await
            .context("Failed to seed categories")?;
        tracing::info!(count = config.categories.len(), "Seeded categories");
    }

    if let Some(names) = &args.categories {
        enable_only(&db, names).await?;
    }

    let prefs = match PreferenceManager::load(&config, &db).await {
        Ok(prefs) => prefs,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load preferences, using config defaults");
            PreferenceManager::from_config(&config)
        }
    };

    let fetcher = Fetcher::new(Duration::from_secs(config.request_timeout_secs))
        .context("Failed to build HTTP client")?;
    let settings = LoaderSettings::from_config(&config, prefs.load_in_background());
    let (loader_tx, loader_task) = loader::spawn(db.clone(), fetcher, settings);

    let (channel, inbound) = LoaderChannel::new();
    let mut controller = Controller::new(db, &config, prefs, channel)
        .await
        .context("Failed to create controller")?;
    controller.connect(loader_tx).await;

    let status = ui::run(&mut controller, inbound).await?;

    controller.disconnect().await;
    if let Some(clear_out) = controller.take_clear_out() {
        if let Err(e) = clear_out.await {
            tracing::warn!(error = %e, "Clear-out task failed");
        }
    }
    // An in-flight background load ends with the runtime
    drop(loader_task);

    if let Some(code) = status {
        std::process::exit(code);
    }
    println!("Goodbye!");
    Ok(())
}

/// Enable exactly the named categories, disabling the rest.
async fn enable_only(db: &Database, names: &[String]) -> Result<()> {
    let categories = db.get_all_categories().await?;
    for name in names {
        if !categories.iter().any(|c| c.name.eq_ignore_ascii_case(name.trim())) {
            anyhow::bail!("Unknown category: {}", name.trim());
        }
    }
    let flags: Vec<bool> = categories
        .iter()
        .map(|c| names.iter().any(|n| c.name.eq_ignore_ascii_case(n.trim())))
        .collect();
    db.set_enabled_categories(&flags).await
}

/// Run a recorded transcript through the state machine and error reporter,
/// printing the phase after every message. Dialogs are acknowledged at once.
fn replay(path: &Path, config: &Config) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {}", path.display()))?;
    let messages = parse_transcript(&content)?;

    let mut machine = SessionMachine::new(
        None,
        config.stale_after_minutes,
        Duration::from_secs(config.watchdog_secs),
    );
    let mut reporter = ErrorReporter::new(config.display_full_error);
    let now = chrono::Utc::now().timestamp();

    for (i, message) in messages.into_iter().enumerate() {
        let name = message.name();
        let effects = machine.handle(message, now);
        for effect in effects {
            if let Effect::ReportError {
                kind,
                message,
                detail,
                repeat,
            } = effect
            {
                reporter.report(kind, message.as_deref(), detail.as_deref(), repeat);
            }
        }
        machine.set_error_visible(reporter.current().is_some());
        println!("{:>4}  {:<20} {:?}", i + 1, name, machine.phase());

        while let Some(dialog) = reporter.current() {
            println!("      dialog: {}", dialog.text.replace('\n', " "));
            if let Some(code) = reporter.acknowledge() {
                println!("      exit status {}", code);
                return Ok(());
            }
        }
        machine.set_error_visible(false);
    }

    if let Some(text) = machine.status_text() {
        println!("{}", text);
    }
    Ok(())
}
