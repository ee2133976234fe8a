//! # Track Model
//!
//! Read-only track records as handed over by the catalog, plus the ephemeral
//! shapes derived from them during resolution and selection.
//!
//! Tracks are deserialized straight from catalog rows, so field names follow
//! the catalog's column names (`storage_bucket`, `energy_level`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Where the catalog believes the audio object lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub key: String,
}

/// A catalog track.
///
/// Only `id` and `title` are required. Audio features are optional and only
/// ever feed variety heuristics, never correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// Goal/category name, used for bucket hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    /// Harmonic (Camelot) key, e.g. `8A`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camelot_key: Option<String>,
}

impl Track {
    /// Minimal track with just an id and a title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Builder-style helper for attaching a recorded storage location.
    #[must_use]
    pub fn with_location(mut self, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        self.storage_bucket = Some(bucket.into());
        self.storage_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_features(mut self, bpm: Option<f64>, energy_level: Option<f64>) -> Self {
        self.bpm = bpm;
        self.energy_level = energy_level;
        self
    }

    /// The recorded location, only when both halves are present and non-empty.
    pub fn storage_location(&self) -> Option<StorageLocation> {
        match (&self.storage_bucket, &self.storage_key) {
            (Some(bucket), Some(key)) if !bucket.trim().is_empty() && !key.trim().is_empty() => {
                Some(StorageLocation {
                    bucket: bucket.clone(),
                    key: key.clone(),
                })
            }
            _ => None,
        }
    }

    /// Snapshot of the attributes the similarity scorer looks at.
    pub fn snapshot(&self) -> FeatureSnapshot {
        FeatureSnapshot {
            track_id: self.id.clone(),
            title: self.title.clone(),
            bpm: self.bpm,
            energy_level: self.energy_level,
        }
    }
}

/// Read a JSON array of catalog tracks.
///
/// # Errors
///
/// Fails if the file cannot be read or is not an array of tracks.
pub fn load_tracks(path: &Path) -> Result<Vec<Track>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read track file {}", path.display()))?;
    let tracks: Vec<Track> = serde_json::from_str(&raw)
        .with_context(|| format!("Track file {} is not a JSON array of tracks", path.display()))?;
    log::debug!("Loaded {} tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}

/// The slice of a track kept in playback history for similarity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub track_id: String,
    pub title: String,
    pub bpm: Option<f64>,
    pub energy_level: Option<f64>,
}

/// Anything the similarity scorer can compare.
pub trait Comparable {
    fn title(&self) -> &str;
    fn bpm(&self) -> Option<f64>;
    fn energy_level(&self) -> Option<f64>;
}

impl Comparable for Track {
    fn title(&self) -> &str {
        &self.title
    }
    fn bpm(&self) -> Option<f64> {
        self.bpm
    }
    fn energy_level(&self) -> Option<f64> {
        self.energy_level
    }
}

impl Comparable for FeatureSnapshot {
    fn title(&self) -> &str {
        &self.title
    }
    fn bpm(&self) -> Option<f64> {
        self.bpm
    }
    fn energy_level(&self) -> Option<f64> {
        self.energy_level
    }
}

/// A track annotated for one selection call. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedTrack {
    pub track: Track,
    pub is_favorite: bool,
    /// Always within `[0, 1]`.
    pub variety_score: f64,
}

impl Comparable for EnhancedTrack {
    fn title(&self) -> &str {
        &self.track.title
    }
    fn bpm(&self) -> Option<f64> {
        self.track.bpm
    }
    fn energy_level(&self) -> Option<f64> {
        self.track.energy_level
    }
}
