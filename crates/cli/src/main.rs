mod commands;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use plib_core::{Clock, Side, SystemClock};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plib")]
#[command(about = "Picture library browser with a two-party points ledger")]
struct Cli {
    /// Library directory with config.json, library.json and status.json
    #[arg(long, env = "PLIB_DIR", default_value = "assets", global = true)]
    dir: PathBuf,

    /// Seed for the random draws (entropy when absent)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log file used while the terminal browser owns the screen
    #[arg(long, env = "PLIB_LOG", default_value = "plib.log", global = true)]
    log: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the terminal browser (default)
    Browse,
    /// Print the ledger position without changing it
    Status,
    /// Apply the daily decay for missed days
    Checkin,
    /// Resolve a claim for one side
    Claim {
        #[arg(long, value_enum)]
        side: SideArg,
    },
    /// Show how many draws each side gets in a permission negotiation
    Allocate,
    /// Drop index entries without files and list stray files
    Reconcile {
        /// Move stray files into this directory
        #[arg(long)]
        staging: Option<PathBuf>,
    },
    /// Delete items marked for deletion, files included
    Purge,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Us,
    You,
}

impl From<SideArg> for Side {
    fn from(value: SideArg) -> Self {
        match value {
            SideArg::Us => Side::Us,
            SideArg::You => Side::You,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Browse);
    let log_file = matches!(command, Command::Browse).then_some(cli.log.as_path());
    init_logging(log_file)?;

    let now: NaiveDateTime = SystemClock.now();
    let lines = match command {
        Command::Browse => {
            plib_cui::run(plib_cui::LaunchOptions {
                dir: cli.dir,
                seed: cli.seed,
            })?;
            return Ok(());
        }
        Command::Status => commands::status(&cli.dir, now)?,
        Command::Checkin => commands::check_in(&cli.dir, now)?,
        Command::Claim { side } => commands::claim(&cli.dir, side.into(), now)?,
        Command::Allocate => commands::allocate(&cli.dir)?,
        Command::Reconcile { staging } => commands::reconcile(&cli.dir, staging.as_deref())?,
        Command::Purge => commands::purge(&cli.dir)?,
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Level comes from `RUST_LOG`, default `info`. Output goes to stderr unless
/// a file is given.
fn init_logging(file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}
