//! Temporal de-duplication of candidate frames.
//!
//! Candidates that sit too close together in time make for a repetitive
//! comparison, so each pool is thinned to frames at least `min_gap` frames
//! apart and then randomly subsampled down to the requested count.

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;

/// Thin a sorted list of frame numbers to entries at least `min_gap` apart.
///
/// The first element is always kept. A later candidate `x` is kept when
/// `x >= last_kept + min_gap` and some earlier candidate `y` (kept or not)
/// satisfies `x >= y + min_gap`.
///
/// ```
/// use compshot::dedupe;
///
/// assert_eq!(dedupe(&[0, 1, 2, 10, 11, 20], 5), vec![0, 10, 20]);
/// ```
pub fn dedupe(sorted: &[u64], min_gap: u64) -> Vec<u64> {
    let Some((&first, rest)) = sorted.split_first() else {
        return Vec::new();
    };

    let mut kept = vec![first];
    let mut last_kept = first;

    for (position, &candidate) in rest.iter().enumerate() {
        // Both conditions must hold; testing the one independent of `y`
        // first keeps the prefix scan from going quadratic.
        if !reaches(candidate, last_kept, min_gap) {
            continue;
        }
        let earlier = &sorted[..=position];
        if earlier
            .iter()
            .any(|&scanned| reaches(candidate, scanned, min_gap))
        {
            kept.push(candidate);
            last_kept = candidate;
        }
    }

    kept
}

fn reaches(candidate: u64, from: u64, min_gap: u64) -> bool {
    from.checked_add(min_gap)
        .is_some_and(|threshold| candidate >= threshold)
}

/// Pick `count` entries uniformly without replacement, reproducibly.
///
/// Lists no longer than `count` come back untouched. Otherwise the result is
/// in sampling order, not sorted. The same `seed` always yields the same
/// picks for the same input.
pub fn subsample(candidates: Vec<u64>, count: usize, seed: u64) -> Vec<u64> {
    if candidates.len() <= count {
        return candidates;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    index::sample(&mut rng, candidates.len(), count)
        .into_iter()
        .map(|position| candidates[position])
        .collect()
}
