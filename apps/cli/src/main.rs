//! osufetch CLI - beatmap and replay acquisition
//!
//! Thin frontend over the acquisition core: resolves beatmaps by hash,
//! downloads beatmap files and replay data, and fetches scores from the
//! remote service.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osufetch_types::{Config, ScoreKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// osufetch - beatmap & replay acquisition for offline analysis
#[derive(Parser)]
#[command(name = "osufetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path
    #[arg(long, env = "OSUFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum ScoreKindArg {
    Best,
    Recent,
    Firsts,
}

impl From<ScoreKindArg> for ScoreKind {
    fn from(kind: ScoreKindArg) -> Self {
        match kind {
            ScoreKindArg::Best => ScoreKind::Best,
            ScoreKindArg::Recent => ScoreKind::Recent,
            ScoreKindArg::Firsts => ScoreKind::Firsts,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a beatmap file from its content hash
    Resolve {
        /// Beatmap content hash
        hash: String,
    },

    /// Download a beatmap file by its online id
    Download {
        /// Online beatmap id
        beatmap_id: String,

        /// Destination directory (defaults to the configured downloads dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download the replay data of a score
    Replay {
        /// Online score id
        score_id: String,

        /// Output file (defaults to <score_id>.osr)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch one of a user's scores
    UserScore {
        /// User name or numeric id
        user: String,

        /// Which score list to index into
        #[arg(long, value_enum, default_value = "recent")]
        kind: ScoreKindArg,

        /// Position in the list
        #[arg(long, default_value_t = 0)]
        index: u32,

        /// Include failed plays
        #[arg(long)]
        include_failed: bool,
    },

    /// Fetch a score from a beatmap's leaderboard
    BeatmapScore {
        /// Online beatmap id
        beatmap_id: String,

        /// Position on the leaderboard
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// Show or update configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the current configuration
    Show,

    /// Print the config file path
    Path,

    /// Update configuration values
    Set {
        /// v1 API key
        #[arg(long)]
        api_key: Option<String>,

        /// OAuth client id
        #[arg(long)]
        client_id: Option<String>,

        /// OAuth client secret
        #[arg(long)]
        client_secret: Option<String>,

        /// Game installation directory (contains osu!.db and Songs/)
        #[arg(long)]
        osu_dir: Option<PathBuf>,

        /// Directory for remotely fetched beatmaps
        #[arg(long)]
        downloads_dir: Option<PathBuf>,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("osufetch").join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".osufetch.json"))
    })
}

fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing config at {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_file = config_path(&cli);
    let config = load_config(&config_file)?;

    match cli.command {
        Commands::Resolve { hash } => {
            let core = commands::build_core(&config, cli.verbose)?;
            commands::resolve(&core, &hash, cli.output).await?
        }

        Commands::Download { beatmap_id, output } => {
            let core = commands::build_core(&config, cli.verbose)?;
            let dest = output.unwrap_or_else(|| config.downloads_dir.clone());
            commands::download(&core, &beatmap_id, &dest, cli.output).await?
        }

        Commands::Replay { score_id, output } => {
            let core = commands::build_core(&config, cli.verbose)?;
            commands::replay(&core, &score_id, output, cli.output).await?
        }

        Commands::UserScore {
            user,
            kind,
            index,
            include_failed,
        } => {
            let core = commands::build_core(&config, cli.verbose)?;
            commands::user_score(&core, &user, kind.into(), index, include_failed, cli.output)
                .await?
        }

        Commands::BeatmapScore { beatmap_id, index } => {
            let core = commands::build_core(&config, cli.verbose)?;
            commands::beatmap_score(&core, &beatmap_id, index, cli.output).await?
        }

        Commands::Config { action } => {
            commands::config_action(config, &config_file, action, cli.output)?
        }
    }

    Ok(())
}
