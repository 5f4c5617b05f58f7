use crate::core::geometry::transform::RigidTransform;
use std::cmp::Ordering;

/// Score assigned to transforms outside the search bounds. Correlation-based scores
/// never exceed it, so rejected candidates always rank last.
pub const REJECTED_SCORE: f64 = 1.0;

/// A transform and its score at the rung that produced it. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub transform: RigidTransform,
    pub score: f64,
}

impl Candidate {
    pub fn new(transform: RigidTransform, score: f64) -> Self {
        Self { transform, score }
    }

    /// Ascending score order; NaN sorts after every number.
    pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
        let key = |c: &Candidate| if c.score.is_nan() { f64::INFINITY } else { c.score };
        key(a).total_cmp(&key(b))
    }
}

/// The survivors carried from one rung to the next and the capacity of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    capacity: usize,
}

impl CandidatePool {
    pub fn new(candidates: Vec<Candidate>, capacity: usize) -> Self {
        Self {
            candidates,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Capacity for the next rung: half of the current one, never below one.
    pub fn next_capacity(&self) -> usize {
        (self.capacity / 2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_by_ascending_score_with_nan_last() {
        let mut candidates = vec![
            Candidate::new(RigidTransform::identity(), f64::NAN),
            Candidate::new(RigidTransform::identity(), -0.2),
            Candidate::new(RigidTransform::identity(), REJECTED_SCORE),
            Candidate::new(RigidTransform::identity(), -0.9),
        ];

        candidates.sort_by(Candidate::rank);

        let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
        assert_eq!(&scores[..3], &[-0.9, -0.2, 1.0]);
        assert!(scores[3].is_nan());
    }

    #[test]
    fn capacity_halves_with_a_floor_of_one() {
        let pool = CandidatePool::new(Vec::new(), 32);
        assert_eq!(pool.next_capacity(), 16);
        assert_eq!(CandidatePool::new(Vec::new(), 1).next_capacity(), 1);
        assert_eq!(CandidatePool::new(Vec::new(), 0).capacity(), 1);
    }
}
