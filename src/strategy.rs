//! # Resolution Strategies
//!
//! Each strategy knows one naming convention the catalog has used for audio
//! objects and probes the candidate URLs that convention implies. The
//! resolver runs them in order and stops at the first confirmed URL, so new
//! conventions are added by appending a strategy, not by touching the
//! resolver.
//!
//! Default order:
//!
//! 1. [`RecordedLocation`] - the catalog's own bucket/key, encoded then raw
//! 2. [`CanonicalSlug`] - `{slug}.mp3` in the default bucket
//! 3. [`FuzzyCatalog`] - best title match from a listing of the default bucket
//! 4. [`SecondaryBuckets`] - slug variations across hinted and known buckets
//! 5. [`IdentifierPath`] - `{prefix}/{id}.mp3` in the id bucket

use crate::config::{BucketHint, ResolverConfig};
use crate::probe::{ExistenceProbe, ProbeOutcome};
use crate::storage::{self, BucketLister};
use crate::text;
use crate::track::Track;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One probe made while resolving a track. Kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub candidate_url: String,
    pub strategy_name: String,
    pub http_status: u16,
}

/// Probes issued during one resolution, in order.
pub struct ProbeSession<'a> {
    probe: &'a dyn ExistenceProbe,
    attempts: Vec<ResolutionAttempt>,
}

impl<'a> ProbeSession<'a> {
    pub fn new(probe: &'a dyn ExistenceProbe) -> Self {
        Self {
            probe,
            attempts: Vec::new(),
        }
    }

    /// Probe `url` on behalf of `strategy` and log the attempt.
    pub async fn try_url(&mut self, strategy: &str, url: String) -> ProbeOutcome {
        let outcome = self.probe.probe(&url).await;
        debug!("[{strategy}] {} -> {}", url, outcome.http_status);
        self.attempts.push(ResolutionAttempt {
            candidate_url: url,
            strategy_name: strategy.to_string(),
            http_status: outcome.http_status,
        });
        outcome
    }

    /// Probe each URL in turn, returning the first that exists.
    pub async fn first_found(
        &mut self,
        strategy: &str,
        urls: impl IntoIterator<Item = String> + Send,
    ) -> Option<String> {
        for url in urls {
            let outcome = self.try_url(strategy, url).await;
            if outcome.is_found() {
                return Some(outcome.url);
            }
        }
        None
    }

    pub fn attempts(&self) -> &[ResolutionAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<ResolutionAttempt> {
        self.attempts
    }
}

/// A naming convention that may locate a track's audio object.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// Stable name recorded in attempts and results.
    fn name(&self) -> &str;

    /// Probe this convention's candidates; the first URL answering 200 wins.
    ///
    /// Returning `None` without probing is fine when the convention does not
    /// apply to the track.
    async fn attempt(&self, track: &Track, session: &mut ProbeSession<'_>) -> Option<String>;
}

fn object_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{base}/{bucket}/{key}")
}

/// The catalog's recorded bucket and key.
///
/// The key is URL-encoded first; on a 404 the raw key is tried once, for
/// keys stored in a form that differs between encoded and raw.
#[derive(Debug, Clone)]
pub struct RecordedLocation {
    base: String,
}

impl RecordedLocation {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl ResolutionStrategy for RecordedLocation {
    fn name(&self) -> &str {
        "recorded_location"
    }

    async fn attempt(&self, track: &Track, session: &mut ProbeSession<'_>) -> Option<String> {
        let location = track.storage_location()?;

        let encoded = object_url(&self.base, &location.bucket, &urlencoding::encode(&location.key));
        let outcome = session.try_url(self.name(), encoded.clone()).await;
        if outcome.is_found() {
            return Some(outcome.url);
        }

        if outcome.http_status == 404 {
            let raw = object_url(&self.base, &location.bucket, &location.key);
            if raw != encoded {
                let retry = session.try_url(self.name(), raw).await;
                if retry.is_found() {
                    return Some(retry.url);
                }
            }
        }

        None
    }
}

/// `{slug}.mp3` in the default bucket.
#[derive(Debug, Clone)]
pub struct CanonicalSlug {
    base: String,
    bucket: String,
}

impl CanonicalSlug {
    pub fn new(base: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ResolutionStrategy for CanonicalSlug {
    fn name(&self) -> &str {
        "canonical_slug"
    }

    async fn attempt(&self, track: &Track, session: &mut ProbeSession<'_>) -> Option<String> {
        let slug = text::slugify(&track.title);
        if slug.is_empty() {
            return None;
        }
        let url = object_url(&self.base, &self.bucket, &urlencoding::encode(&format!("{slug}.mp3")));
        session.first_found(self.name(), [url]).await
    }
}

/// Score a listed filename against a title's meaningful words.
///
/// One point per title word present among the filename tokens, plus two
/// when the first title word is also the filename's first token.
pub fn fuzzy_score(title_words: &[String], filename: &str) -> u32 {
    let tokens = text::filename_tokens(filename);
    let token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();

    let overlap = title_words
        .iter()
        .filter(|w| token_set.contains(w.as_str()))
        .count();
    #[allow(clippy::cast_possible_truncation)]
    let mut score = overlap as u32;

    if let (Some(first_word), Some(first_token)) = (title_words.first(), tokens.first()) {
        if first_word == first_token {
            score += 2;
        }
    }
    score
}

/// Highest-scoring audio file for the title, if it clears `min_score`.
/// Ties go to the earliest listed name.
pub fn best_fuzzy_match(title: &str, names: &[String], min_score: u32) -> Option<(String, u32)> {
    let words = text::title_words(title);
    if words.is_empty() {
        return None;
    }

    let mut best: Option<(&String, u32)> = None;
    for name in names {
        let score = fuzzy_score(&words, name);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((name, score));
        }
    }

    best.filter(|(_, score)| *score >= min_score)
        .map(|(name, score)| (name.clone(), score))
}

/// Best title match from a single listing page of the default bucket.
#[derive(Clone)]
pub struct FuzzyCatalog {
    base: String,
    bucket: String,
    lister: Arc<dyn BucketLister>,
    page_size: usize,
    min_score: u32,
}

impl FuzzyCatalog {
    pub fn new(
        base: impl Into<String>,
        bucket: impl Into<String>,
        lister: Arc<dyn BucketLister>,
        page_size: usize,
        min_score: u32,
    ) -> Self {
        Self {
            base: base.into(),
            bucket: bucket.into(),
            lister,
            page_size,
            min_score,
        }
    }
}

#[async_trait]
impl ResolutionStrategy for FuzzyCatalog {
    fn name(&self) -> &str {
        "fuzzy_catalog"
    }

    async fn attempt(&self, track: &Track, session: &mut ProbeSession<'_>) -> Option<String> {
        let names = match self.lister.list(&self.bucket, self.page_size).await {
            Ok(names) => storage::audio_files(names),
            Err(e) => {
                warn!("Listing bucket '{}' failed, skipping fuzzy search: {e}", self.bucket);
                return None;
            }
        };

        let (name, score) = best_fuzzy_match(&track.title, &names, self.min_score)?;
        debug!("Fuzzy match for '{}': '{}' (score {score})", track.title, name);

        let url = object_url(&self.base, &self.bucket, &urlencoding::encode(&name));
        session.first_found(self.name(), [url]).await
    }
}

/// Slug variations across hinted buckets, then the known secondary buckets.
#[derive(Debug, Clone)]
pub struct SecondaryBuckets {
    base: String,
    default_bucket: String,
    buckets: Vec<String>,
    hints: Vec<BucketHint>,
}

impl SecondaryBuckets {
    pub fn new(
        base: impl Into<String>,
        default_bucket: impl Into<String>,
        buckets: Vec<String>,
        hints: Vec<BucketHint>,
    ) -> Self {
        Self {
            base: base.into(),
            default_bucket: default_bucket.into(),
            buckets,
            hints,
        }
    }

    /// Buckets to try for this track, hinted ones first, without duplicates
    /// and without the default bucket.
    pub fn buckets_for(&self, track: &Track) -> Vec<String> {
        let haystack = [
            Some(track.title.as_str()),
            track.category.as_deref(),
            track.genre.as_deref(),
        ]
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

        let hinted = self
            .hints
            .iter()
            .filter(|hint| hint.keywords.iter().any(|k| haystack.contains(&k.to_lowercase())))
            .flat_map(|hint| hint.buckets.iter());

        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for bucket in hinted.chain(self.buckets.iter()) {
            if *bucket != self.default_bucket && seen.insert(bucket.clone()) {
                ordered.push(bucket.clone());
            }
        }
        ordered
    }
}

#[async_trait]
impl ResolutionStrategy for SecondaryBuckets {
    fn name(&self) -> &str {
        "secondary_bucket"
    }

    async fn attempt(&self, track: &Track, session: &mut ProbeSession<'_>) -> Option<String> {
        let variations = text::slug_variations(&track.title);
        if variations.is_empty() {
            return None;
        }

        let urls: Vec<String> = self
            .buckets_for(track)
            .iter()
            .flat_map(|bucket| {
                variations.iter().map(move |slug| {
                    object_url(&self.base, bucket, &urlencoding::encode(&format!("{slug}.mp3")))
                })
            })
            .collect();

        session.first_found(self.name(), urls).await
    }
}

/// `{prefix}/{id}.mp3` in the id bucket.
#[derive(Debug, Clone)]
pub struct IdentifierPath {
    base: String,
    bucket: String,
    prefix: String,
}

impl IdentifierPath {
    pub fn new(base: impl Into<String>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ResolutionStrategy for IdentifierPath {
    fn name(&self) -> &str {
        "identifier_path"
    }

    async fn attempt(&self, track: &Track, session: &mut ProbeSession<'_>) -> Option<String> {
        let file = format!("{}.mp3", urlencoding::encode(&track.id));
        let prefix = self.prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            file
        } else {
            format!("{prefix}/{file}")
        };
        session
            .first_found(self.name(), [object_url(&self.base, &self.bucket, &key)])
            .await
    }
}

/// The standard strategy chain for a configuration.
pub fn default_strategies(
    config: &ResolverConfig,
    lister: Arc<dyn BucketLister>,
) -> Vec<Box<dyn ResolutionStrategy>> {
    let base = config.public_base();
    vec![
        Box::new(RecordedLocation::new(base.clone())),
        Box::new(CanonicalSlug::new(base.clone(), config.default_bucket.clone())),
        Box::new(FuzzyCatalog::new(
            base.clone(),
            config.default_bucket.clone(),
            lister,
            config.listing_page_size,
            config.fuzzy_min_score,
        )),
        Box::new(SecondaryBuckets::new(
            base.clone(),
            config.default_bucket.clone(),
            config.secondary_buckets.clone(),
            config.bucket_hints.clone(),
        )),
        Box::new(IdentifierPath::new(
            base,
            config.id_bucket.clone(),
            config.id_prefix.clone(),
        )),
    ]
}
