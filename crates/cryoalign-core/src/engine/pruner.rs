use super::candidate::Candidate;
use tracing::trace;

/// Keeps the best candidates that are pairwise more than `min_separation` degrees
/// apart, at most `capacity` of them.
///
/// Candidates are stable-sorted by ascending score and accepted greedily, so the
/// first survivor is always the best input and ties keep their input order.
pub fn select_survivors(
    mut candidates: Vec<Candidate>,
    capacity: usize,
    min_separation: f64,
) -> Vec<Candidate> {
    candidates.sort_by(Candidate::rank);

    let mut survivors: Vec<Candidate> = Vec::with_capacity(capacity.min(candidates.len()));
    for candidate in candidates {
        if survivors.len() >= capacity {
            break;
        }
        let distinct = survivors
            .iter()
            .all(|kept| kept.transform.spin_distance(&candidate.transform) > min_separation);
        if distinct {
            survivors.push(candidate);
        } else {
            trace!(score = candidate.score, "Pruned near-duplicate candidate");
        }
    }
    survivors
}
