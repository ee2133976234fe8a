//! # Spacing Planner
//!
//! Reorders a selection so that similar tracks are not played close together.
//!
//! Greedy construction: a random first track, then repeatedly the remaining
//! candidate with the lowest
//!
//! ```text
//! cost = max(similarity to each of the last `window` placed tracks)
//!        - bonus_weight * variety_bonus
//! ```
//!
//! where `variety_bonus` rewards BPM/energy that deviate from the window's
//! average. Ties go to the earliest candidate. Local heuristic, O(n²).

use crate::similarity::{self, BPM_SPAN, ENERGY_SPAN};
use crate::track::EnhancedTrack;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct SpacingPlanner {
    /// Number of most recently placed tracks a candidate is compared with.
    pub window: usize,
    pub bonus_weight: f64,
}

impl Default for SpacingPlanner {
    fn default() -> Self {
        Self {
            window: 3,
            bonus_weight: 0.2,
        }
    }
}

impl SpacingPlanner {
    pub fn new(window: usize, bonus_weight: f64) -> Self {
        Self {
            window: window.max(1),
            bonus_weight,
        }
    }

    /// Permutation of `tracks` with near-duplicates pushed apart.
    pub fn plan<R: Rng + ?Sized>(&self, tracks: Vec<EnhancedTrack>, rng: &mut R) -> Vec<EnhancedTrack> {
        if tracks.len() < 2 {
            return tracks;
        }

        let mut remaining = tracks;
        let mut placed = Vec::with_capacity(remaining.len());
        let seed = rng.gen_range(0..remaining.len());
        placed.push(remaining.remove(seed));

        while !remaining.is_empty() {
            let window_start = placed.len().saturating_sub(self.window.max(1));
            let recent = &placed[window_start..];

            let mut best_index = 0;
            let mut best_cost = f64::INFINITY;
            for (index, candidate) in remaining.iter().enumerate() {
                let cost = self.cost(candidate, recent);
                if cost < best_cost {
                    best_cost = cost;
                    best_index = index;
                }
            }

            log::trace!(
                "Placing '{}' at {} (cost {:.3})",
                remaining[best_index].track.title,
                placed.len(),
                best_cost
            );
            placed.push(remaining.remove(best_index));
        }

        placed
    }

    fn cost(&self, candidate: &EnhancedTrack, recent: &[EnhancedTrack]) -> f64 {
        let closest = recent
            .iter()
            .map(|placed| similarity::similarity(candidate, placed))
            .fold(0.0, f64::max);
        closest - self.bonus_weight * variety_bonus(candidate, recent)
    }
}

/// How far a candidate's tempo and energy sit from the window's average,
/// in `[0, 1]`. Zero when nothing is comparable.
pub fn variety_bonus(candidate: &EnhancedTrack, recent: &[EnhancedTrack]) -> f64 {
    let deviations: Vec<f64> = [
        deviation(candidate.track.bpm, recent.iter().map(|t| t.track.bpm), BPM_SPAN),
        deviation(
            candidate.track.energy_level,
            recent.iter().map(|t| t.track.energy_level),
            ENERGY_SPAN,
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    if deviations.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = deviations.iter().sum::<f64>() / deviations.len() as f64;
    mean.min(1.0)
}

fn deviation(value: Option<f64>, window: impl Iterator<Item = Option<f64>>, span: f64) -> Option<f64> {
    let value = value?;
    let known: Vec<f64> = window.flatten().collect();
    if known.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let average = known.iter().sum::<f64>() / known.len() as f64;
    Some(((value - average).abs() / span).min(1.0))
}
