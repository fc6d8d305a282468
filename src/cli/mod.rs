use std::env;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::settings::SettingsService;
use crate::storage;
use crate::tracker::{GitHubClient, TrackerApi};
use crate::worktime::{Clock, SystemClock};

pub mod commands;

use self::commands::{ItemsArgs, MessageArgs, PresetCommand};

#[derive(Parser, Debug)]
#[command(
    name = "kintai",
    version,
    about = "Compose work start/end status messages from GitHub issues and pull requests"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over KINTAI_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over KINTAI_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Manage saved filter presets
    #[command(subcommand)]
    Preset(PresetCommand),
    /// Print a start or end message built from the given tasks
    Message(MessageArgs),
    /// List repositories visible to the configured token
    Repos,
    /// List issues and pull requests matching a preset
    Items(ItemsArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // The local offset can only be read while the process is single threaded.
    let clock = SystemClock::detect();

    if let Some(path) = &cli.config {
        env::set_var("KINTAI_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("KINTAI_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);
    let log_file = match command {
        Commands::Tui => Some(paths.log_dir.as_path()),
        _ => None,
    };
    init_tracing(&cli.log_level, log_file)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let store = storage::init(&config.storage)?;
    let settings = SettingsService::load(Box::new(store));

    let config = Arc::new(config);
    match command {
        Commands::Tui => {
            let api: Arc<dyn TrackerApi> = Arc::new(GitHubClient::new(&config.github)?);
            let clock: Arc<dyn Clock> = Arc::new(clock);
            let mut app = App::new(config.clone(), settings, api, clock)?;
            commands::run_tui(&mut app)
        }
        Commands::Preset(command) => commands::handle_preset_command(settings, command),
        Commands::Message(args) => commands::print_message(&config, &clock, args),
        Commands::Repos => {
            let api = GitHubClient::new(&config.github)?;
            commands::list_repos(&api)
        }
        Commands::Items(args) => {
            let api = GitHubClient::new(&config.github)?;
            commands::list_items(settings, &api, args)
        }
    }
}

/// Logs go to stderr, or to `kintai.log` under `log_dir` while the TUI owns the terminal.
fn init_tracing(level: &str, log_dir: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match log_dir {
            Some(dir) => {
                let file = open_log_file(dir)?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
            None => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
        Ok(())
    })
    .map(|_| ())
}

fn open_log_file(dir: &Path) -> Result<File> {
    let path = dir.join("kintai.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))
}
