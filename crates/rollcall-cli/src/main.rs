use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance register")]
struct Cli {
    /// TOML config file (overrides ROLLCALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a reference photo for a person
    Enroll {
        /// Identity label (file name in the faces directory)
        #[arg(short, long)]
        name: String,
        /// Photo containing the person's face
        #[arg(short, long)]
        photo: PathBuf,
        /// Replace an existing reference photo with the same name
        #[arg(long)]
        force: bool,
    },
    /// List enrolled identities
    List,
    /// Recognize the faces in a still image
    Identify {
        image: PathBuf,
        /// Record attendance for recognized faces
        #[arg(long)]
        mark: bool,
        #[arg(long)]
        json: bool,
    },
    /// Feed a directory of frames through a live attendance session
    Replay {
        /// Directory of frame images, processed in file name order
        frames: PathBuf,
        /// Simulated time between frames
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Frame indices on which to press the manual scan trigger
        #[arg(long, value_delimiter = ',')]
        manual: Vec<usize>,
    },
    /// Show the attendance listing and today's check-ins
    Report {
        /// Day to summarize (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Enroll { name, photo, force } => commands::enroll(&config, &name, &photo, force),
        Commands::List => commands::list(&config),
        Commands::Identify { image, mark, json } => commands::identify(&config, &image, mark, json),
        Commands::Replay {
            frames,
            interval_ms,
            manual,
        } => commands::replay(&config, &frames, interval_ms, &manual),
        Commands::Report { date, json } => commands::report(&config, date, json),
    }
}
