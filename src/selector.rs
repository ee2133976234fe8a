//! # Variety Selector
//!
//! Builds a playlist from a goal-filtered candidate pool:
//!
//! 1. **Annotate**: mark favorites and give every track a variety score.
//! 2. **Filter**: drop tracks the user heard recently. A recent favorite gets
//!    a second chance unless it is near-identical to one of the very latest
//!    snapshots. If nothing survives, keep the top slice by variety score.
//! 3. **Mix**: at most `ceil(favorites_ratio * count)` favorites in random
//!    order, the rest from non-favorites by descending variety score. When
//!    non-favorites run short, favorites are trimmed until they are within
//!    `ceil(favorites_ratio * len)` of the playlist actually returned.
//! 4. **Space**: reorder with the [`SpacingPlanner`].
//! 5. **Record**: remember what was picked in the [`HistoryStore`].
//!
//! History trouble never fails a selection; it is logged and skipped.

use crate::config::SelectionConfig;
use crate::history::{HistoryLimits, HistoryStore, MemoryHistoryStore};
use crate::similarity;
use crate::spacing::SpacingPlanner;
use crate::track::{EnhancedTrack, FeatureSnapshot, Track};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::collections::HashSet;
use std::sync::Arc;

pub struct VarietySelector {
    config: SelectionConfig,
    history: Arc<dyn HistoryStore>,
}

impl VarietySelector {
    pub fn new(config: SelectionConfig, history: Arc<dyn HistoryStore>) -> Self {
        Self { config, history }
    }

    /// Selector backed by a process-local history.
    pub fn in_memory(config: SelectionConfig) -> Self {
        let history = Arc::new(MemoryHistoryStore::new(HistoryLimits::from(&config)));
        Self::new(config, history)
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Select and order up to `count` tracks from `pool`.
    ///
    /// Without a `user_id` no history is consulted or recorded. A non-empty
    /// pool with `count > 0` always yields at least one track as long as
    /// `favorites_ratio` is above zero.
    pub fn select_variety_playlist(
        &self,
        pool: &[Track],
        count: usize,
        user_id: Option<&str>,
        favorites: &[String],
    ) -> Vec<Track> {
        self.select_with_rng(pool, count, user_id, favorites, &mut thread_rng())
    }

    /// [`Self::select_variety_playlist`] with an explicit random source.
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        pool: &[Track],
        count: usize,
        user_id: Option<&str>,
        favorites: &[String],
        rng: &mut R,
    ) -> Vec<Track> {
        if pool.is_empty() || count == 0 {
            return Vec::new();
        }

        let favorite_ids: HashSet<&str> = favorites.iter().map(String::as_str).collect();
        let annotated = annotate(pool, &favorite_ids, rng);
        let candidates = match user_id {
            Some(user) => self.filter_recent(annotated, user),
            None => annotated,
        };

        let selection = self.mix(candidates, count, rng);
        let favorites_picked = selection.iter().filter(|t| t.is_favorite).count();

        let planner = SpacingPlanner::new(self.config.spacing_window, self.config.variety_bonus_weight);
        let ordered: Vec<Track> = planner
            .plan(selection, rng)
            .into_iter()
            .map(|enhanced| enhanced.track)
            .collect();

        if let Some(user) = user_id {
            let played: Vec<FeatureSnapshot> = ordered.iter().map(Track::snapshot).collect();
            if let Err(e) = self.history.record_played(user, &played) {
                warn!("Could not record history for user {user}: {e}");
            }
        }

        info!(
            "Selected {} tracks ({} favorites) from a pool of {}",
            ordered.len(),
            favorites_picked,
            pool.len()
        );
        ordered
    }

    /// Forget a user's recent history ("show me something different").
    pub fn clear_history(&self, user_id: &str) {
        match self.history.clear(user_id) {
            Ok(()) => info!("Cleared recent history for user {user_id}"),
            Err(e) => warn!("Could not clear history for user {user_id}: {e}"),
        }
    }

    fn filter_recent(&self, tracks: Vec<EnhancedTrack>, user_id: &str) -> Vec<EnhancedTrack> {
        let recent_ids: HashSet<String> = match self.history.recent_ids(user_id) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("Ignoring history for user {user_id}: {e}");
                return tracks;
            }
        };
        if recent_ids.is_empty() {
            return tracks;
        }

        let snapshots = self.history.recent_snapshots(user_id).unwrap_or_else(|e| {
            warn!("Ignoring recent snapshots for user {user_id}: {e}");
            Vec::new()
        });
        let latest = &snapshots[snapshots.len().saturating_sub(self.config.favorite_recent_window)..];

        let (kept, dropped): (Vec<EnhancedTrack>, Vec<EnhancedTrack>) =
            tracks.into_iter().partition(|candidate| {
                if !recent_ids.contains(&candidate.track.id) {
                    return true;
                }
                candidate.is_favorite
                    && !latest.iter().any(|snapshot| {
                        similarity::similarity(candidate, snapshot)
                            >= self.config.favorite_similarity_threshold
                    })
            });

        debug!(
            "History filter for user {user_id}: kept {}, dropped {}",
            kept.len(),
            dropped.len()
        );

        if kept.is_empty() {
            let fallback = top_by_variety(dropped, self.config.fallback_ratio);
            warn!(
                "Every candidate was played recently; falling back to the top {} by variety",
                fallback.len()
            );
            return fallback;
        }
        kept
    }

    fn mix<R: Rng + ?Sized>(
        &self,
        candidates: Vec<EnhancedTrack>,
        count: usize,
        rng: &mut R,
    ) -> Vec<EnhancedTrack> {
        let (mut favorites, mut others): (Vec<EnhancedTrack>, Vec<EnhancedTrack>) =
            candidates.into_iter().partition(|t| t.is_favorite);

        favorites.shuffle(rng);
        favorites.truncate(favorite_cap(count, self.config.favorites_ratio));

        others.sort_by(|a, b| b.variety_score.total_cmp(&a.variety_score));
        others.truncate(count - favorites.len());

        // the share holds against the returned length, not the requested one
        while !favorites.is_empty()
            && favorites.len() > favorite_cap(others.len() + favorites.len(), self.config.favorites_ratio)
        {
            favorites.pop();
        }

        debug!(
            "Mixing {} variety tracks with {} favorites",
            others.len(),
            favorites.len()
        );
        others.extend(favorites);
        others
    }
}

/// Upper bound on favorites in a playlist of `count` tracks, `ceil(ratio * count)`.
pub fn favorite_cap(count: usize, ratio: f64) -> usize {
    ceil_share(count, ratio)
}

/// `ceil(len * ratio)`, with `ratio` clamped to `[0, 1]`. The epsilon keeps
/// `10 * 0.3` at 3.
fn ceil_share(len: usize, ratio: f64) -> usize {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let share = (len as f64 * ratio.clamp(0.0, 1.0) - 1e-9).ceil().max(0.0) as usize;
    share.min(len)
}

/// Random base in `[0, 1)` plus boosts for atypical features, capped at 1.
pub fn variety_score<R: Rng + ?Sized>(track: &Track, rng: &mut R) -> f64 {
    let mut score: f64 = rng.gen();

    if track.bpm.is_some_and(|bpm| bpm < 80.0 || bpm > 140.0) {
        score += 0.2;
    }
    if track.energy_level.is_some_and(|energy| energy < 3.0 || energy > 7.0) {
        score += 0.2;
    }
    if track.camelot_key.as_deref().is_some_and(|key| !key.trim().is_empty()) {
        score += 0.1;
    }
    if track.valence.is_some_and(|valence| valence < 0.3 || valence > 0.8) {
        score += 0.1;
    }

    score.min(1.0)
}

/// Annotate the pool, dropping repeated ids (first occurrence wins).
fn annotate<R: Rng + ?Sized>(
    pool: &[Track],
    favorite_ids: &HashSet<&str>,
    rng: &mut R,
) -> Vec<EnhancedTrack> {
    let mut seen = HashSet::new();
    pool.iter()
        .filter(|track| seen.insert(track.id.as_str()))
        .map(|track| EnhancedTrack {
            track: track.clone(),
            is_favorite: favorite_ids.contains(track.id.as_str()),
            variety_score: variety_score(track, rng),
        })
        .collect()
}

fn top_by_variety(mut tracks: Vec<EnhancedTrack>, ratio: f64) -> Vec<EnhancedTrack> {
    tracks.sort_by(|a, b| b.variety_score.total_cmp(&a.variety_score));
    let keep = ceil_share(tracks.len(), ratio).max(1);
    tracks.truncate(keep);
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool(n: usize) -> Vec<Track> {
        (0..n)
            .map(|i| Track::new(format!("t{i}"), format!("Piece {i}")))
            .collect()
    }

    fn ids(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|t| t.id.clone()).collect()
    }

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn record_played(&self, _: &str, _: &[FeatureSnapshot]) -> Result<(), HistoryError> {
            Err(HistoryError::Poisoned)
        }
        fn recent_ids(&self, _: &str) -> Result<Vec<String>, HistoryError> {
            Err(HistoryError::Poisoned)
        }
        fn recent_snapshots(&self, _: &str) -> Result<Vec<FeatureSnapshot>, HistoryError> {
            Err(HistoryError::Poisoned)
        }
        fn clear(&self, _: &str) -> Result<(), HistoryError> {
            Err(HistoryError::Poisoned)
        }
    }

    #[test]
    fn test_variety_score_bounds_and_boosts() {
        let mut rng = StdRng::seed_from_u64(3);
        let plain = Track::new("p", "Plain").with_features(Some(100.0), Some(5.0));
        let mut extreme = Track::new("e", "Extreme").with_features(Some(60.0), Some(9.0));
        extreme.camelot_key = Some("8A".to_string());
        extreme.valence = Some(0.95);

        for _ in 0..200 {
            let score = variety_score(&plain, &mut rng);
            assert!((0.0..1.0).contains(&score));
            let boosted = variety_score(&extreme, &mut rng);
            assert!((0.6..=1.0).contains(&boosted), "{boosted}");
        }
    }

    #[test]
    fn test_favorite_cap_rounds_up() {
        assert_eq!(favorite_cap(5, 0.3), 2);
        assert_eq!(favorite_cap(1, 0.3), 1);
        assert_eq!(favorite_cap(10, 0.3), 3);
        assert_eq!(favorite_cap(4, 0.0), 0);
        assert_eq!(favorite_cap(4, 2.0), 4);
    }

    #[test]
    fn test_end_to_end_ten_tracks_two_favorites() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let favorites = vec!["t1".to_string(), "t7".to_string()];
        let mut rng = StdRng::seed_from_u64(11);

        let playlist = selector.select_with_rng(&pool(10), 5, Some("u"), &favorites, &mut rng);

        assert_eq!(playlist.len(), 5);
        let favorite_count = playlist.iter().filter(|t| favorites.contains(&t.id)).count();
        assert!(favorite_count <= 2);
        let unique: HashSet<String> = ids(&playlist).into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_favorites_cap_with_many_favorites() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let all_favorites: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let playlist = selector.select_with_rng(&pool(20), 7, None, &all_favorites[..15], &mut rng);
            let favorite_count = playlist
                .iter()
                .filter(|t| all_favorites[..15].contains(&t.id))
                .count();
            assert!(favorite_count <= favorite_cap(7, 0.3));
            assert_eq!(playlist.len(), 7);
        }
    }

    #[test]
    fn test_favorites_share_holds_for_short_playlists() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let tracks = pool(5);
        let all_favorites = ids(&tracks);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let playlist = selector.select_with_rng(&tracks, 5, None, &all_favorites, &mut rng);
            // every track is a favorite, so only one fits the share
            assert_eq!(playlist.len(), 1);
        }

        // mostly favorites: one plain track, four favorites
        let favorites = all_favorites[1..].to_vec();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let playlist = selector.select_with_rng(&tracks, 5, None, &favorites, &mut rng);
            let picked = playlist.iter().filter(|t| favorites.contains(&t.id)).count();
            assert_eq!(playlist.len(), 2);
            assert_eq!(picked, 1);
            assert!(picked <= favorite_cap(playlist.len(), 0.3));
        }
    }

    #[test]
    fn test_never_empty_when_everything_is_recent() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let tracks = pool(4);
        let snapshots: Vec<FeatureSnapshot> = tracks.iter().map(Track::snapshot).collect();
        selector.history().record_played("u", &snapshots).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let playlist = selector.select_with_rng(&tracks, 4, Some("u"), &[], &mut rng);

        // top 30% of 4, rounded up
        assert_eq!(playlist.len(), 2);
    }

    #[test]
    fn test_recent_tracks_are_skipped() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let tracks = pool(6);
        selector
            .history()
            .record_played("u", &[tracks[0].snapshot(), tracks[1].snapshot()])
            .unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let playlist = selector.select_with_rng(&tracks, 6, Some("u"), &[], &mut rng);

        let picked = ids(&playlist);
        assert_eq!(picked.len(), 4);
        assert!(!picked.contains(&"t0".to_string()));
        assert!(!picked.contains(&"t1".to_string()));
    }

    #[test]
    fn test_recent_favorite_gets_second_chance_unless_near_identical() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let favorite = Track::new("fav", "Gentle Rain");
        let twin = Track::new("twin", "Gentle Rain");
        let other = Track::new("other", "Mountain Air");

        // favorite played long ago, then five unrelated tracks
        let mut played = vec![favorite.snapshot()];
        played.extend((0..5).map(|i| Track::new(format!("x{i}"), format!("Filler {i}")).snapshot()));
        selector.history().record_played("u", &played).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let picked = ids(&selector.select_with_rng(
            &[favorite.clone(), other.clone()],
            2,
            Some("u"),
            &["fav".to_string()],
            &mut rng,
        ));
        assert!(picked.contains(&"fav".to_string()));

        // now something with an identical title was just played
        selector.history().record_played("u", &[twin.snapshot()]).unwrap();
        let fresh = Track::new("fresh", "Desert Wind");
        let picked = ids(&selector.select_with_rng(
            &[favorite, other, fresh],
            2,
            Some("u"),
            &["fav".to_string()],
            &mut rng,
        ));
        assert_eq!(picked, vec!["fresh".to_string()]);
    }

    #[test]
    fn test_history_bound_after_sixty_selections() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let tracks = pool(60);
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..60 {
            let playlist = selector.select_with_rng(&tracks, 1, Some("u"), &[], &mut rng);
            assert_eq!(playlist.len(), 1);
        }

        let recent = selector.history().recent_ids("u").unwrap();
        assert!(recent.len() <= 50);
    }

    #[test]
    fn test_duplicate_pool_entries_collapse() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let mut tracks = pool(3);
        tracks.push(tracks[0].clone());
        let mut rng = StdRng::seed_from_u64(2);

        let playlist = selector.select_with_rng(&tracks, 10, None, &[], &mut rng);
        assert_eq!(playlist.len(), 3);
    }

    #[test]
    fn test_empty_inputs() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        assert!(selector.select_variety_playlist(&[], 5, Some("u"), &[]).is_empty());
        assert!(selector.select_variety_playlist(&pool(3), 0, Some("u"), &[]).is_empty());
        assert!(selector.history().recent_ids("u").unwrap().is_empty());
    }

    #[test]
    fn test_broken_history_still_selects() {
        let selector = VarietySelector::new(SelectionConfig::default(), Arc::new(BrokenHistory));
        let playlist = selector.select_variety_playlist(&pool(5), 3, Some("u"), &[]);
        assert_eq!(playlist.len(), 3);
        selector.clear_history("u");
    }

    #[test]
    fn test_clear_history_allows_repeats() {
        let selector = VarietySelector::in_memory(SelectionConfig::default());
        let tracks = pool(3);
        let first = selector.select_variety_playlist(&tracks, 3, Some("u"), &[]);
        assert_eq!(first.len(), 3);

        selector.clear_history("u");
        assert!(selector.history().recent_ids("u").unwrap().is_empty());
        let second = selector.select_variety_playlist(&tracks, 3, Some("u"), &[]);
        assert_eq!(second.len(), 3);
    }
}
