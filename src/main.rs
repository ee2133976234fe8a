//! # Cadence
//!
//! Command-line front end for the audio resolver and the variety selector.
//!
//! ## Usage
//!
//! ```bash
//! # Find a playable URL for a track
//! cadence resolve --id 42 --title "Ocean Waves"
//!
//! # Resolve a whole catalog export
//! cadence resolve-batch tracks.json --json
//!
//! # Build a playlist, remembering what alice heard
//! cadence select pool.json --count 10 --user alice --favorites 3,7
//! cadence history show --user alice
//! ```

use anyhow::Result;
use cadence::cli::{self, Command, HistoryAction};
use cadence::config::{self, CadenceConfig};
use cadence::history::{HistoryLimits, HistoryStore, SqliteHistoryStore};
use cadence::resolver::{AssetResolver, ResolutionResult};
use cadence::selector::VarietySelector;
use cadence::track::{self, Track};
use cadence::{completion, text};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Main entry point for the Cadence application.
///
/// Initializes logging, parses command-line arguments, loads configuration
/// and routes commands to the library.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug cadence resolve ...` - Enable debug logging
/// - `RUST_LOG=cadence::strategy=debug cadence resolve ...` - Module-specific logging
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    // Completions need no configuration
    if let Command::Completion { shell } = args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let config = CadenceConfig::load(args.config.as_deref())?
        .with_overrides(args.storage_url, args.api_key);
    debug!("Using storage at {}", config.resolver.storage_url);

    match args.command {
        Command::Resolve {
            id,
            title,
            bucket,
            key,
            category,
            genre,
            json,
        } => {
            let track = Track {
                id,
                title,
                storage_bucket: bucket,
                storage_key: key,
                category,
                genre,
                ..Track::default()
            };
            let resolver = AssetResolver::new(&config.resolver)?;
            let result = resolver.resolve_audio_url(&track).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(result.as_ref())?);
            } else {
                print_resolution(&track, &result);
            }
        }
        Command::ResolveBatch { tracks, json } => {
            resolve_batch(&config, &tracks, json).await?;
        }
        Command::Select {
            pool,
            count,
            user,
            favorites,
            json,
        } => {
            let pool = track::load_tracks(&pool)?;
            let selector = VarietySelector::new(config.selection.clone(), open_history(&config)?);
            let playlist = selector.select_variety_playlist(&pool, count, user.as_deref(), &favorites);

            if json {
                println!("{}", serde_json::to_string_pretty(&playlist)?);
            } else {
                for (position, track) in playlist.iter().enumerate() {
                    let marker = if favorites.contains(&track.id) { " ♥" } else { "" };
                    println!("{:>3}. {} [{}]{marker}", position + 1, track.title, track.id);
                }
            }
        }
        Command::History { action } => {
            let history = open_history(&config)?;
            match action {
                HistoryAction::Show { user } => {
                    let ids = history.recent_ids(&user)?;
                    if ids.is_empty() {
                        println!("No recent history for {user}");
                    }
                    for id in ids {
                        println!("{id}");
                    }
                }
                HistoryAction::Clear { user } => {
                    history.clear(&user)?;
                    info!("Cleared recent history for {user}");
                    println!("Cleared recent history for {user}");
                }
            }
        }
        Command::Slug { title } => {
            println!("{}", text::slugify(&title));
            for variation in text::slug_variations(&title).iter().skip(1) {
                println!("  {variation}.mp3");
            }
        }
        Command::Completion { .. } => {}
    }

    Ok(())
}

async fn resolve_batch(config: &CadenceConfig, path: &Path, json: bool) -> Result<()> {
    let tracks = track::load_tracks(path)?;
    let resolver = AssetResolver::new(&config.resolver)?;
    info!(
        "Resolving {} tracks via {}",
        tracks.len(),
        resolver.strategy_names().join(" -> ")
    );

    let results = resolver.resolve_many(&tracks).await;
    let mut resolved = 0;
    let mut invalid = 0;
    let mut rows = Vec::with_capacity(results.len());

    for (track, result) in tracks.iter().zip(results) {
        match result {
            Ok(result) => {
                if result.success {
                    resolved += 1;
                }
                if json {
                    rows.push(serde_json::to_value(result.as_ref())?);
                } else {
                    print_resolution(track, &result);
                }
            }
            Err(e) => {
                invalid += 1;
                if json {
                    rows.push(json!({ "id": track.id, "title": track.title, "error": e.to_string() }));
                } else {
                    println!("{}: error: {e}", track.title);
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{resolved}/{} tracks playable", tracks.len());
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} of {} tracks were invalid", tracks.len());
    }
    Ok(())
}

fn print_resolution(track: &Track, result: &ResolutionResult) {
    match (&result.resolved_url, &result.strategy_name) {
        (Some(url), Some(strategy)) => println!("{}: {url} ({strategy})", track.title),
        (Some(url), None) => println!("{}: {url}", track.title),
        _ => println!(
            "{}: unavailable ({} attempts)",
            track.title,
            result.attempts.len()
        ),
    }
}

fn open_history(config: &CadenceConfig) -> Result<Arc<dyn HistoryStore>> {
    let path = config::get_history_db_path()?;
    let store = SqliteHistoryStore::open(&path, HistoryLimits::from(&config.selection))?;
    Ok(Arc::new(store))
}
