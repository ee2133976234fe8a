//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Cadence using Clap derive macros.
//!
//! ## Commands
//!
//! - `resolve`: Find a playable URL for one track
//! - `resolve-batch`: Resolve every track in a JSON file
//! - `select`: Build a variety playlist from a JSON pool
//! - `history`: Inspect or reset a user's recent history
//! - `slug`: Show the file names tried for a title
//!
//! ## Examples
//!
//! ```bash
//! cadence resolve --id 42 --title "Ocean Waves" --bucket neuralpositivemusic --key ocean.mp3
//! cadence select pool.json --count 10 --user alice --favorites 3,7
//! cadence history clear --user alice
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Global options override values from the configuration file.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Cadence: resolve therapeutic audio assets and build varied playlists")]
#[command(version)]
pub struct Args {
    /// Configuration file (defaults to config.json in the data directory)
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Storage project base URL
    #[arg(long, global = true, env = "CADENCE_STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Key sent with bucket listing requests
    #[arg(long, global = true, env = "CADENCE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find a playable URL for a single track
    ///
    /// Tries the recorded location first, then the slugified title, a fuzzy
    /// match against the bucket listing, secondary buckets and finally the
    /// id-based layout. A track that cannot be resolved prints
    /// "unavailable" and is not an error.
    Resolve {
        /// Catalog track id
        #[arg(long)]
        id: String,

        /// Track title
        #[arg(long)]
        title: String,

        /// Recorded storage bucket
        #[arg(long)]
        bucket: Option<String>,

        /// Recorded object key within the bucket
        #[arg(long)]
        key: Option<String>,

        /// Catalog category, used for bucket hints
        #[arg(long)]
        category: Option<String>,

        /// Genre, used for bucket hints
        #[arg(long)]
        genre: Option<String>,

        /// Print the full result including every attempt as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve every track in a JSON array file
    ResolveBatch {
        /// File containing a JSON array of tracks
        #[arg(value_hint = clap::ValueHint::FilePath)]
        tracks: PathBuf,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Build a variety playlist from a candidate pool
    ///
    /// Recent history is kept per user in the data directory, so repeated
    /// invocations avoid replaying the same tracks.
    Select {
        /// File containing a JSON array of candidate tracks
        #[arg(value_hint = clap::ValueHint::FilePath)]
        pool: PathBuf,

        /// Number of tracks wanted
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// User whose history is consulted and updated
        #[arg(short, long)]
        user: Option<String>,

        /// Comma-separated favorite track ids
        #[arg(long, value_delimiter = ',')]
        favorites: Vec<String>,

        /// Print the playlist as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or reset recent playback history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show the slug and file name variations tried for a title
    Slug {
        #[arg(value_hint = clap::ValueHint::Other)]
        title: String,
    },

    /// Generate shell completions
    ///
    /// Usage: cadence completion bash > ~/.local/share/bash-completion/completions/cadence
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// History management actions
#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List the recently selected track ids, oldest first
    Show {
        #[arg(short, long)]
        user: String,
    },

    /// Forget a user's recent history
    Clear {
        #[arg(short, long)]
        user: String,
    },
}
