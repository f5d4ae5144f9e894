use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage::{self, NoteStore};

pub mod commands;

use self::commands::{EditArgs, IdArgs, ListArgs, NewArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notes-sync",
    version,
    about = "Notes with debounced search and autosave"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTESYNC_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTESYNC_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List active notes, optionally filtered (default)
    List(ListArgs),
    /// Create a note through the editor
    New(NewArgs),
    /// Edit an existing note through the editor
    Edit(EditArgs),
    /// Print one note
    Show(IdArgs),
    /// Move a note to the trash
    Delete(IdArgs),
    /// Bring a deleted note back
    Restore(IdArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);
    let store: Arc<dyn NoteStore> = Arc::new(storage::init(&config.storage)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));
    runtime.block_on(async move {
        match command {
            Commands::List(args) => commands::list_notes(config, store, args).await,
            Commands::New(args) => commands::new_note(config, store, args).await,
            Commands::Edit(args) => commands::edit_note(config, store, args).await,
            Commands::Show(args) => commands::show_note(store, args).await,
            Commands::Delete(args) => commands::delete_note(store, args).await,
            Commands::Restore(args) => commands::restore_note(store, args).await,
        }
    })
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
