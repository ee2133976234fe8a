//! # Configuration Module
//!
//! Runtime configuration and data directory management for Cadence.
//!
//! ## Data Storage
//!
//! Cadence keeps its files in the platform-standard data directory:
//! - Linux: `~/.local/share/cadence/`
//! - macOS: `~/Library/Application Support/cadence/`
//! - Windows: `%APPDATA%\cadence\`
//!
//! The directory holds an optional `config.json` and the `history.db` used by
//! the CLI to remember recently selected tracks between invocations.
//!
//! ## Loading
//!
//! [`CadenceConfig::load`] reads an explicit file if given, otherwise
//! `config.json` from the data directory if present, otherwise defaults.
//! Every field is optional in the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the Cadence data directory, creating it if needed.
///
/// # Errors
///
/// Fails if the platform data directory cannot be determined or the
/// `cadence` subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let cadence_dir = data_dir.join("cadence");
    fs::create_dir_all(&cadence_dir).with_context(|| {
        format!(
            "Failed to create Cadence data directory at {}. Please check file permissions.",
            cadence_dir.display()
        )
    })?;

    Ok(cadence_dir)
}

/// Path of the SQLite playback history database.
pub fn get_history_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("history.db"))
}

/// Path of the default configuration file (may not exist).
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.json"))
}

/// Keyword rule steering the secondary-bucket strategy.
///
/// When any keyword occurs in a track's lowercased title, category or genre,
/// the rule's buckets are tried before the configured secondary buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHint {
    pub keywords: Vec<String>,
    pub buckets: Vec<String>,
}

impl BucketHint {
    fn new(keywords: &[&str], buckets: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(ToString::to_string).collect(),
            buckets: buckets.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Asset resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL of the storage provider project.
    pub storage_url: String,
    /// Key sent with listing calls. Public object probes never need it.
    pub api_key: Option<String>,
    pub default_bucket: String,
    pub secondary_buckets: Vec<String>,
    pub bucket_hints: Vec<BucketHint>,
    /// Bucket and prefix of the `{prefix}/{id}.mp3` last-resort layout.
    pub id_bucket: String,
    pub id_prefix: String,
    /// Objects requested from a single bucket listing.
    pub listing_page_size: usize,
    /// Minimum fuzzy score a listed file needs before it is probed.
    pub fuzzy_min_score: u32,
    pub probe_timeout_secs: u64,
    pub max_concurrent_probes: usize,
    pub cache_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            storage_url: "https://pbtgvcjniayedqlajjzz.supabase.co".to_string(),
            api_key: None,
            default_bucket: "neuralpositivemusic".to_string(),
            secondary_buckets: vec![
                "energyboost".to_string(),
                "Chopin".to_string(),
                "classicalfocus".to_string(),
            ],
            bucket_hints: vec![
                BucketHint::new(&["chopin", "sonata", "baroque", "peaceful-piano"], &["Chopin"]),
                BucketHint::new(
                    &["stress", "anxiety"],
                    &["newageworldstressanxietyreduction", "sonatasforstress"],
                ),
                BucketHint::new(
                    &["focus"],
                    &["focus-music", "classicalfocus", "NewAgeandWorldFocus"],
                ),
                BucketHint::new(&["energy", "boost"], &["ENERGYBOOST"]),
                BucketHint::new(
                    &["classical"],
                    &["Chopin", "classicalfocus", "sonatasforstress"],
                ),
            ],
            id_bucket: "audio".to_string(),
            id_prefix: "tracks".to_string(),
            listing_page_size: 1000,
            fuzzy_min_score: 2,
            probe_timeout_secs: 10,
            max_concurrent_probes: 8,
            cache_capacity: 1024,
        }
    }
}

impl ResolverConfig {
    /// Public object URL prefix, without trailing slash.
    pub fn public_base(&self) -> String {
        format!(
            "{}/storage/v1/object/public",
            self.storage_url.trim_end_matches('/')
        )
    }
}

/// Playlist selection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Upper bound on the favorites share of a playlist (rounded up).
    pub favorites_ratio: f64,
    /// Recently selected track ids remembered per user.
    pub history_limit: usize,
    /// Feature snapshots remembered per user.
    pub snapshot_limit: usize,
    /// Share of the pool kept when history would filter out everything.
    pub fallback_ratio: f64,
    /// A recently played favorite this similar to a very recent track is dropped.
    pub favorite_similarity_threshold: f64,
    /// How many of the latest snapshots count as "very recent".
    pub favorite_recent_window: usize,
    /// Placed tracks the spacing planner compares a candidate against.
    pub spacing_window: usize,
    pub variety_bonus_weight: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            favorites_ratio: 0.3,
            history_limit: 50,
            snapshot_limit: 20,
            fallback_ratio: 0.3,
            favorite_similarity_threshold: 0.9,
            favorite_recent_window: 5,
            spacing_window: 3,
            variety_bonus_weight: 0.2,
        }
    }
}

/// Top-level configuration file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub resolver: ResolverConfig,
    pub selection: SelectionConfig,
}

impl CadenceConfig {
    /// Load configuration from `path`, or from the data directory, or defaults.
    ///
    /// # Errors
    ///
    /// An explicitly given file that is missing or malformed is an error. A
    /// malformed default file is an error too; a missing one is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = get_config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    log::debug!("No config file at {}, using defaults", default_path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply command-line / environment overrides.
    #[must_use]
    pub fn with_overrides(mut self, storage_url: Option<String>, api_key: Option<String>) -> Self {
        if let Some(url) = storage_url {
            self.resolver.storage_url = url;
        }
        if api_key.is_some() {
            self.resolver.api_key = api_key;
        }
        self
    }
}
