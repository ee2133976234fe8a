//! Pairwise track similarity.
//!
//! Used to keep near-duplicates (two versions of the same piece) apart in a
//! playlist and to give recently played favorites a stricter second look.

use crate::text;
use crate::track::Comparable;
use std::collections::HashSet;

/// Weight of the title-overlap term.
pub const TITLE_WEIGHT: f64 = 0.7;
/// Weight of the BPM-closeness term.
pub const BPM_WEIGHT: f64 = 0.2;
/// Weight of the energy-closeness term.
pub const ENERGY_WEIGHT: f64 = 0.1;

/// BPM difference at which tempo closeness drops to zero.
pub const BPM_SPAN: f64 = 30.0;
/// Energy-level difference at which energy closeness drops to zero.
pub const ENERGY_SPAN: f64 = 4.0;

/// Similarity of two tracks in `[0, 1]`.
///
/// Weighted blend of title-word Jaccard overlap (0.7), BPM closeness (0.2)
/// and energy closeness (0.1). Terms whose attributes are missing on either
/// side are left out and the remaining weights renormalized. Returns `0.0`
/// when nothing could be compared.
///
/// Symmetric by construction.
#[must_use]
pub fn similarity<A: Comparable + ?Sized, B: Comparable + ?Sized>(a: &A, b: &B) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    if let Some(title) = title_overlap(a.title(), b.title()) {
        weighted += TITLE_WEIGHT * title;
        total_weight += TITLE_WEIGHT;
    }

    if let (Some(x), Some(y)) = (a.bpm(), b.bpm()) {
        weighted += BPM_WEIGHT * linear_closeness(x, y, BPM_SPAN);
        total_weight += BPM_WEIGHT;
    }

    if let (Some(x), Some(y)) = (a.energy_level(), b.energy_level()) {
        weighted += ENERGY_WEIGHT * linear_closeness(x, y, ENERGY_SPAN);
        total_weight += ENERGY_WEIGHT;
    }

    if total_weight == 0.0 {
        return 0.0;
    }

    let score = (weighted / total_weight).clamp(0.0, 1.0);
    log::trace!("similarity({:?}, {:?}) = {:.3}", a.title(), b.title(), score);
    score
}

/// Jaccard overlap of meaningful title words, `None` when both titles are
/// empty of meaningful words.
#[must_use]
pub fn title_overlap(a: &str, b: &str) -> Option<f64> {
    let words_a: HashSet<String> = text::title_words(a).into_iter().collect();
    let words_b: HashSet<String> = text::title_words(b).into_iter().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return None;
    }
    let intersection = words_a.intersection(&words_b).count();

    #[allow(clippy::cast_precision_loss)]
    Some(intersection as f64 / union as f64)
}

/// 1 at equal values, 0 at `span` apart or more, linear in between.
#[inline]
fn linear_closeness(x: f64, y: f64, span: f64) -> f64 {
    (1.0 - (x - y).abs() / span).max(0.0)
}
