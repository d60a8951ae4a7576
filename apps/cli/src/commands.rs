//! CLI command implementations

use crate::{ConfigAction, OutputFormat};
use anyhow::{Context, Result};
use console::style;
use osufetch_core::OsufetchCore;
use osufetch_types::{Config, ResolveSource, ScoreKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Build the core and, when verbose, route its diagnostic events to the log.
pub fn build_core(config: &Config, verbose: bool) -> Result<OsufetchCore> {
    let core = OsufetchCore::new(config).context("initializing acquisition core")?;

    if verbose {
        let mut events = core.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                debug!(?event, "fetch event");
            }
        });
    }

    Ok(core)
}

// ============================================================================
// Acquisition Commands
// ============================================================================

pub async fn resolve(core: &OsufetchCore, hash: &str, format: OutputFormat) -> Result<()> {
    match core.resolve_beatmap(hash).await? {
        Some(resolved) => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
            OutputFormat::Human => {
                let source = match resolved.source {
                    ResolveSource::LocalDatabase => "local database",
                    ResolveSource::Remote => "remote download",
                };
                println!(
                    "{} {} ({})",
                    style("✓").green().bold(),
                    style(resolved.path.display()).cyan(),
                    source
                );
            }
        },
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Human => {
                println!("{} no beatmap found for hash {}", style("✗").red().bold(), hash)
            }
        },
    }
    Ok(())
}

pub async fn download(
    core: &OsufetchCore,
    beatmap_id: &str,
    dest: &Path,
    format: OutputFormat,
) -> Result<()> {
    let path = core.downloader().ensure_beatmap_file(beatmap_id, dest).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "beatmap_id": beatmap_id, "path": path }))
        }
        OutputFormat::Human => println!(
            "{} {}",
            style("✓").green().bold(),
            style(path.display()).cyan()
        ),
    }
    Ok(())
}

pub async fn replay(
    core: &OsufetchCore,
    score_id: &str,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.osr", score_id)));

    match core.api().fetch_replay_bytes(score_id).await? {
        Some(bytes) => {
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing replay to {}", path.display()))?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "score_id": score_id, "path": path, "bytes": bytes.len() })
                ),
                OutputFormat::Human => println!(
                    "{} {} ({} bytes)",
                    style("✓").green().bold(),
                    style(path.display()).cyan(),
                    bytes.len()
                ),
            }
        }
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Human => println!(
                "{} score {} has no replay data",
                style("✗").red().bold(),
                score_id
            ),
        },
    }
    Ok(())
}

// ============================================================================
// Score Commands
// ============================================================================

pub async fn user_score(
    core: &OsufetchCore,
    user: &str,
    kind: ScoreKind,
    index: u32,
    include_failed: bool,
    format: OutputFormat,
) -> Result<()> {
    // Numeric input is already an id; anything else is a name to resolve.
    let user_id = if user.chars().all(|c| c.is_ascii_digit()) {
        user.to_string()
    } else {
        core.api().lookup_user_id(user).await?
    };

    let score = core
        .api()
        .fetch_user_score(&user_id, kind, index, include_failed)
        .await?;
    print_score(score, format)
}

pub async fn beatmap_score(
    core: &OsufetchCore,
    beatmap_id: &str,
    index: usize,
    format: OutputFormat,
) -> Result<()> {
    let score = core.api().fetch_beatmap_score(beatmap_id, index).await?;
    print_score(score, format)
}

fn print_score(score: Option<serde_json::Value>, format: OutputFormat) -> Result<()> {
    match score {
        Some(score) => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&score)?),
            OutputFormat::Human => {
                let id = score.get("id").map(|v| v.to_string()).unwrap_or_default();
                let beatmap = score
                    .pointer("/beatmap/id")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{} score {} on beatmap {} (replay available)",
                    style("✓").green().bold(),
                    style(id).cyan(),
                    beatmap
                );
            }
        },
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Human => println!(
                "{} no eligible score at that position",
                style("✗").red().bold()
            ),
        },
    }
    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub fn config_action(
    mut config: Config,
    config_file: &Path,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            OutputFormat::Human => {
                println!("config file:    {}", config_file.display());
                println!(
                    "osu dir:        {}",
                    config
                        .osu_dir
                        .as_ref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_else(|| "(not set)".to_string())
                );
                println!("downloads dir:  {}", config.downloads_dir.display());
                println!(
                    "api key:        {}",
                    if config.credentials.api_key.is_empty() { "(not set)" } else { "(set)" }
                );
                println!(
                    "oauth client:   {}",
                    if config.credentials.client_id.is_empty() { "(not set)" } else { "(set)" }
                );
            }
        },

        ConfigAction::Path => println!("{}", config_file.display()),

        ConfigAction::Set {
            api_key,
            client_id,
            client_secret,
            osu_dir,
            downloads_dir,
        } => {
            if let Some(api_key) = api_key {
                config.credentials.api_key = api_key;
            }
            if let Some(client_id) = client_id {
                config.credentials.client_id = client_id;
            }
            if let Some(client_secret) = client_secret {
                config.credentials.client_secret = client_secret;
            }
            if let Some(osu_dir) = osu_dir {
                config.osu_dir = Some(osu_dir);
            }
            if let Some(downloads_dir) = downloads_dir {
                config.downloads_dir = downloads_dir;
            }

            if let Some(parent) = config_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_file, serde_json::to_string_pretty(&config)?)
                .with_context(|| format!("writing config to {}", config_file.display()))?;

            println!("{} config updated", style("✓").green().bold());
        }
    }
    Ok(())
}
