//! Audio asset resolution and variety playlist selection for a therapeutic
//! music catalog.
//!
//! Core modules:
//! - [`resolver`] - Turns catalog tracks into playable URLs
//! - [`strategy`] - The ordered naming strategies the resolver tries
//! - [`probe`] - HEAD-request existence checks
//! - [`selector`] - Builds varied playlists from a candidate pool
//! - [`spacing`] - Keeps similar tracks apart in a playlist
//! - [`similarity`] - Pairwise track similarity
//! - [`history`] - Per-user recent playback history
//!
//! ### Supporting Modules
//!
//! - [`config`] - Configuration and data directory management
//! - [`storage`] - Bucket listing for fuzzy file lookup
//! - [`text`] - Slugs and title tokenization
//! - [`track`] - Track records
//! - [`error`] - Library error types
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use cadence::config::CadenceConfig;
//! use cadence::resolver::AssetResolver;
//! use cadence::selector::VarietySelector;
//! use cadence::track::Track;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = CadenceConfig::load(None)?;
//!
//! let pool = vec![
//!     Track::new("1", "Ocean Waves").with_features(Some(64.0), Some(2.0)),
//!     Track::new("2", "Morning Focus").with_features(Some(110.0), Some(6.0)),
//!     Track::new("3", "Nocturne Op.9 No.2"),
//! ];
//! let selector = VarietySelector::in_memory(config.selection.clone());
//! let playlist = selector.select_variety_playlist(&pool, 2, Some("user-1"), &["3".to_string()]);
//!
//! let resolver = AssetResolver::new(&config.resolver)?;
//! for track in &playlist {
//!     let result = resolver.resolve_audio_url(track).await?;
//!     match &result.resolved_url {
//!         Some(url) => println!("{} -> {url}", track.title),
//!         None => println!("{} unavailable", track.title),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Unreachable audio is an outcome, not an error: resolution returns
//! `success == false` with the attempts it made, and selection always returns
//! a playlist. Typed errors ([`error`]) cover malformed input and backing
//! store failures; application glue uses `anyhow::Result`.
//!
//! ## Logging
//!
//! Everything logs through the `log` facade. The binary installs
//! `env_logger`, so `RUST_LOG=cadence::resolver=debug` shows every probe.

pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod history;
pub mod probe;
pub mod resolver;
pub mod selector;
pub mod similarity;
pub mod spacing;
pub mod storage;
pub mod strategy;
pub mod text;
pub mod track;
