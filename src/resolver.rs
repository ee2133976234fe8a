//! # Asset Resolver
//!
//! Turns a catalog track into a playable URL by running the strategy chain
//! (see [`crate::strategy`]) until one probe answers 200.
//!
//! ## Behaviour
//!
//! - Strategies run strictly one after another; nothing is probed in
//!   parallel within a single resolution.
//! - Results, successful or not, are memoized per `(id, bucket, key)` in a
//!   bounded LRU cache until evicted or [`AssetResolver::clear_cache`] is
//!   called. Concurrent calls for the same uncached track may both probe.
//! - Probe failures never surface as errors. An exhausted chain yields
//!   `success == false` with every attempt recorded; only malformed input is
//!   an `Err`.
//!
//! ```no_run
//! use cadence::config::ResolverConfig;
//! use cadence::resolver::AssetResolver;
//! use cadence::track::Track;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let resolver = AssetResolver::new(&ResolverConfig::default())?;
//! let track = Track::new("42", "Ocean Waves").with_location("neuralpositivemusic", "ocean-waves.mp3");
//! let result = resolver.resolve_audio_url(&track).await?;
//! if let Some(url) = &result.resolved_url {
//!     println!("play {url}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::probe::{ExistenceProbe, HttpProbe};
use crate::storage::{BucketLister, HttpBucketLister};
use crate::strategy::{self, ProbeSession, ResolutionAttempt, ResolutionStrategy};
use crate::track::Track;
use anyhow::Context;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of resolving one track. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub success: bool,
    pub resolved_url: Option<String>,
    pub strategy_name: Option<String>,
    pub attempts: Vec<ResolutionAttempt>,
}

impl ResolutionResult {
    fn found(url: String, strategy: &str, attempts: Vec<ResolutionAttempt>) -> Self {
        Self {
            success: true,
            resolved_url: Some(url),
            strategy_name: Some(strategy.to_string()),
            attempts,
        }
    }

    fn exhausted(attempts: Vec<ResolutionAttempt>) -> Self {
        Self {
            success: false,
            resolved_url: None,
            strategy_name: None,
            attempts,
        }
    }
}

/// Cache identity of a resolution: the track id plus its recorded location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub id: String,
    pub bucket: Option<String>,
    pub key: Option<String>,
}

impl From<&Track> for CacheKey {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            bucket: track.storage_bucket.clone(),
            key: track.storage_key.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.id,
            self.bucket.as_deref().unwrap_or(""),
            self.key.as_deref().unwrap_or("")
        )
    }
}

/// Snapshot of the resolution cache for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    /// Up to ten most recently used keys.
    pub keys: Vec<String>,
}

type ResolutionCache = Mutex<LruCache<CacheKey, Arc<ResolutionResult>>>;

/// Resolves playable URLs for tracks, memoizing outcomes.
pub struct AssetResolver {
    probe: Arc<dyn ExistenceProbe>,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    cache: ResolutionCache,
    max_in_flight: usize,
}

impl AssetResolver {
    /// Resolver over HTTP with the default strategy chain.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .context("Failed to build HTTP client for audio resolution")?;

        let probe = Arc::new(HttpProbe::with_client(client.clone(), config.max_concurrent_probes));
        let lister = Arc::new(HttpBucketLister::new(client, config));
        Ok(Self::with_backends(config, probe, lister))
    }

    /// Default strategy chain over caller-supplied network backends.
    pub fn with_backends(
        config: &ResolverConfig,
        probe: Arc<dyn ExistenceProbe>,
        lister: Arc<dyn BucketLister>,
    ) -> Self {
        let strategies = strategy::default_strategies(config, lister);
        Self::with_strategies(
            probe,
            strategies,
            config.cache_capacity,
            config.max_concurrent_probes,
        )
    }

    /// Fully custom strategy chain.
    pub fn with_strategies(
        probe: Arc<dyn ExistenceProbe>,
        strategies: Vec<Box<dyn ResolutionStrategy>>,
        cache_capacity: usize,
        max_in_flight: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            probe,
            strategies,
            cache: Mutex::new(LruCache::new(capacity)),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Names of the configured strategies, in the order they run.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Find a working URL for `track`.
    ///
    /// # Errors
    ///
    /// [`ResolveError::InvalidTrack`] when the id or title is empty. Network
    /// failures are never errors.
    pub async fn resolve_audio_url(&self, track: &Track) -> Result<Arc<ResolutionResult>, ResolveError> {
        validate(track)?;
        let key = CacheKey::from(track);

        if let Some(cached) = self.cached(&key) {
            debug!("Cache hit for '{}' ({key})", track.title);
            return Ok(cached);
        }

        debug!("Resolving '{}' ({key})", track.title);
        let result = Arc::new(self.run_chain(track).await);

        match &result.resolved_url {
            Some(url) => info!(
                "Resolved '{}' via {} after {} probe(s): {url}",
                track.title,
                result.strategy_name.as_deref().unwrap_or("?"),
                result.attempts.len()
            ),
            None => warn!(
                "No working audio URL for '{}' after {} probe(s)",
                track.title,
                result.attempts.len()
            ),
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, Arc::clone(&result));
        }
        Ok(result)
    }

    /// Resolve many tracks, results in input order.
    ///
    /// At most `max_concurrent_probes` resolutions run at once.
    pub async fn resolve_many(
        &self,
        tracks: &[Track],
    ) -> Vec<Result<Arc<ResolutionResult>, ResolveError>> {
        stream::iter(tracks)
            .map(|track| self.resolve_audio_url(track))
            .buffered(self.max_in_flight)
            .collect()
            .await
    }

    async fn run_chain(&self, track: &Track) -> ResolutionResult {
        let mut session = ProbeSession::new(self.probe.as_ref());

        for strategy in &self.strategies {
            if let Some(url) = strategy.attempt(track, &mut session).await {
                return ResolutionResult::found(url, strategy.name(), session.into_attempts());
            }
            debug!("Strategy {} found nothing for '{}'", strategy.name(), track.title);
        }

        ResolutionResult::exhausted(session.into_attempts())
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<ResolutionResult>> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    pub fn cache_stats(&self) -> CacheStats {
        match self.cache.lock() {
            Ok(cache) => CacheStats {
                size: cache.len(),
                capacity: cache.cap().get(),
                keys: cache.iter().take(10).map(|(k, _)| k.to_string()).collect(),
            },
            Err(_) => CacheStats {
                size: 0,
                capacity: 0,
                keys: Vec::new(),
            },
        }
    }

    /// Forget every memoized result, e.g. after the catalog was repaired.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        info!("Audio resolution cache cleared");
    }
}

fn validate(track: &Track) -> Result<(), ResolveError> {
    if track.id.trim().is_empty() {
        return Err(ResolveError::InvalidTrack(format!(
            "track '{}' has an empty id",
            track.title
        )));
    }
    if track.title.trim().is_empty() {
        return Err(ResolveError::InvalidTrack(format!(
            "track {} has an empty title",
            track.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::probe::ProbeOutcome;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        found: HashSet<String>,
        calls: AtomicUsize,
    }

    impl CountingProbe {
        fn new(found: &[String]) -> Arc<Self> {
            Arc::new(Self {
                found: found.iter().cloned().collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExistenceProbe for CountingProbe {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let http_status = if self.found.contains(url) { 200 } else { 404 };
            ProbeOutcome {
                url: url.to_string(),
                http_status,
            }
        }
    }

    struct EmptyLister;

    #[async_trait]
    impl BucketLister for EmptyLister {
        async fn list(&self, _bucket: &str, _limit: usize) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn resolver(probe: Arc<CountingProbe>) -> AssetResolver {
        let config = ResolverConfig {
            storage_url: "https://store.test".to_string(),
            ..ResolverConfig::default()
        };
        AssetResolver::with_backends(&config, probe, Arc::new(EmptyLister))
    }

    fn public(path: &str) -> String {
        format!("https://store.test/storage/v1/object/public/{path}")
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let probe = CountingProbe::new(&[public("calm/rain.mp3")]);
        let resolver = resolver(Arc::clone(&probe));
        let track = Track::new("1", "Rain").with_location("calm", "rain.mp3");

        let first = resolver.resolve_audio_url(&track).await.expect("valid track");
        let second = resolver.resolve_audio_url(&track).await.expect("valid track");

        assert_eq!(probe.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cache_stats().size, 1);
    }

    #[tokio::test]
    async fn test_recorded_location_short_circuits_chain() {
        let probe = CountingProbe::new(&[public("calm/rain.mp3")]);
        let resolver = resolver(Arc::clone(&probe));
        let track = Track::new("1", "Rain").with_location("calm", "rain.mp3");

        let result = resolver.resolve_audio_url(&track).await.expect("valid track");

        assert!(result.success);
        assert_eq!(result.strategy_name.as_deref(), Some("recorded_location"));
        assert_eq!(result.resolved_url, Some(public("calm/rain.mp3")));
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_through_to_identifier_path() {
        let probe = CountingProbe::new(&[public("audio/tracks/xyz.mp3")]);
        let resolver = resolver(Arc::clone(&probe));

        let result = resolver
            .resolve_audio_url(&Track::new("xyz", "Unknown Piece"))
            .await
            .expect("valid track");

        assert!(result.success);
        assert_eq!(result.strategy_name.as_deref(), Some("identifier_path"));
        let last = result.attempts.last().expect("attempts recorded");
        assert_eq!(last.http_status, 200);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_strategy() {
        let probe = CountingProbe::new(&[]);
        let resolver = resolver(Arc::clone(&probe));
        let track = Track::new("9", "Lost Song").with_location("calm", "lost song.mp3");

        let result = resolver.resolve_audio_url(&track).await.expect("valid track");

        assert!(!result.success);
        assert!(result.resolved_url.is_none());
        assert_eq!(result.attempts.len(), probe.calls());

        let strategies: HashSet<&str> =
            result.attempts.iter().map(|a| a.strategy_name.as_str()).collect();
        // fuzzy search has nothing listed, so it never probes
        for name in ["recorded_location", "canonical_slug", "secondary_bucket", "identifier_path"] {
            assert!(strategies.contains(name), "missing attempts for {name}");
        }
        assert!(result.attempts.iter().all(|a| a.http_status == 404));
    }

    #[tokio::test]
    async fn test_invalid_track_is_error() {
        let resolver = resolver(CountingProbe::new(&[]));
        let err = resolver
            .resolve_audio_url(&Track::new("1", "  "))
            .await
            .expect_err("empty title");
        assert!(matches!(err, ResolveError::InvalidTrack(_)));

        assert!(resolver.resolve_audio_url(&Track::new("", "Rain")).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_reprobe() {
        let probe = CountingProbe::new(&[public("calm/rain.mp3")]);
        let resolver = resolver(Arc::clone(&probe));
        let track = Track::new("1", "Rain").with_location("calm", "rain.mp3");

        resolver.resolve_audio_url(&track).await.expect("valid track");
        resolver.clear_cache();
        resolver.resolve_audio_url(&track).await.expect("valid track");

        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let probe = CountingProbe::new(&[]);
        let config = ResolverConfig {
            storage_url: "https://store.test".to_string(),
            cache_capacity: 2,
            ..ResolverConfig::default()
        };
        let resolver = AssetResolver::with_backends(&config, probe, Arc::new(EmptyLister));

        for id in ["a", "b", "c"] {
            resolver
                .resolve_audio_url(&Track::new(id, "Rain"))
                .await
                .expect("valid track");
        }

        let stats = resolver.cache_stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.keys, vec!["c--", "b--"]);
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order() {
        let probe = CountingProbe::new(&[public("calm/b.mp3")]);
        let resolver = resolver(Arc::clone(&probe));
        let tracks = vec![
            Track::new("a", "Alpha"),
            Track::new("b", "Beta").with_location("calm", "b.mp3"),
            Track::new("c", ""),
        ];

        let results = resolver.resolve_many(&tracks).await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].as_ref().expect("valid").success);
        assert!(results[1].as_ref().expect("valid").success);
        assert!(results[2].is_err());
    }

    /// Tracks how many probes are running at the same time.
    struct SlowProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ExistenceProbe for SlowProbe {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome {
                url: url.to_string(),
                http_status: 404,
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_many_bounds_in_flight_resolutions() {
        let probe = Arc::new(SlowProbe {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = ResolverConfig {
            storage_url: "https://store.test".to_string(),
            max_concurrent_probes: 3,
            ..ResolverConfig::default()
        };
        let resolver = AssetResolver::with_backends(&config, probe.clone() as Arc<dyn ExistenceProbe>, Arc::new(EmptyLister));
        let tracks: Vec<Track> = (0..10)
            .map(|i| Track::new(format!("id{i}"), format!("Piece {i}")))
            .collect();

        let results = resolver.resolve_many(&tracks).await;

        assert_eq!(results.len(), 10);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak of {peak} concurrent probes");
        assert!(peak > 1, "resolutions never overlapped");
    }

    #[test]
    fn test_strategy_names_in_chain_order() {
        let resolver = resolver(CountingProbe::new(&[]));
        assert_eq!(
            resolver.strategy_names(),
            vec![
                "recorded_location",
                "canonical_slug",
                "fuzzy_catalog",
                "secondary_bucket",
                "identifier_path"
            ]
        );
    }
}
