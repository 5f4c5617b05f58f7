//! # Resolution Ladder Controller
//!
//! Drives one particle from its starting candidates to the final survivors by
//! walking the resolution ladder from coarse to fine.
//!
//! ## Per-rung cycle
//!
//! 1. The aligner prepares an immutable view of the particle at the rung's box.
//! 2. A cold start at rung 0 scores every sampled orientation with
//!    [`RungAligner::coarse_search`]; every other rung refines each survivor (and
//!    the anchor prior, when there is one) with [`RungAligner::refine`].
//! 3. Results are pruned to the pool capacity with a separation of four angular
//!    steps, rescaled to the full box and wrapped into `(-ny/2, ny/2]`.
//! 4. The capacity is halved and the walk stops after a rung whose box reached
//!    the ceiling, never before rung 1.
//!
//! The controller only deals in full-box transforms; aligners see transforms with
//! translations in rung pixels.

use super::candidate::{Candidate, CandidatePool};
use super::error::EngineError;
use super::ladder::{ResolutionLadder, Rung, RungPolicy};
use super::pruner::select_survivors;
use crate::core::geometry::transform::RigidTransform;
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Survivors must be at least this many angular steps apart.
const SEPARATION_STEPS: f64 = 4.0;

/// The alignment mode specific half of the ladder walk.
pub trait RungAligner: Sync {
    /// Per-rung data shared by every candidate of the rung.
    type View: Sync;

    fn prepare(&self, rung: &Rung) -> Result<Self::View, EngineError>;

    /// Scores sampled orientations without local optimization.
    fn coarse_search(
        &self,
        view: &Self::View,
        rung: &Rung,
        orientations: &[RigidTransform],
    ) -> Vec<Candidate>;

    /// Locally optimizes one starting transform.
    fn refine(&self, view: &Self::View, rung: &Rung, start: &RigidTransform) -> Candidate;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LadderStart {
    /// Coarse search over sampled orientations at rung 0.
    Cold { orientations: Vec<RigidTransform> },
    /// Refinement of `seeds` from rung `rung` onward.
    Warm {
        rung: usize,
        seeds: Vec<RigidTransform>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LadderPlan {
    pub start: LadderStart,
    pub capacity: usize,
    /// Prior re-seeded at every refinement rung.
    pub anchor: Option<RigidTransform>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LadderOutcome {
    /// Survivors of the last rung, best first, in full-box pixels.
    pub pool: CandidatePool,
    pub final_rung: Rung,
    pub rungs_visited: Vec<usize>,
}

impl LadderOutcome {
    pub fn best(&self) -> Option<&Candidate> {
        self.pool.best()
    }
}

pub fn run_ladder<A: RungAligner>(
    aligner: &A,
    ladder: &ResolutionLadder,
    policy: &RungPolicy,
    plan: LadderPlan,
    particle: usize,
) -> Result<LadderOutcome, EngineError> {
    let full_box = ladder.full_box();
    let (first, cold, mut starts) = match plan.start {
        LadderStart::Cold { orientations } => (0, true, orientations),
        LadderStart::Warm { rung, seeds } => (rung.min(ladder.len() - 1), false, seeds),
    };

    let mut capacity = plan.capacity.max(1);
    let mut pool = CandidatePool::new(Vec::new(), capacity);
    let mut rungs_visited = Vec::new();

    for index in first..ladder.len() {
        let rung = ladder.rung(index, policy);
        let view = aligner.prepare(&rung)?;
        let to_rung = |xf: &RigidTransform| xf.rescaled(full_box, rung.box_size);

        let candidates = if cold && index == first {
            let orientations: Vec<RigidTransform> = starts.iter().map(to_rung).collect();
            aligner.coarse_search(&view, &rung, &orientations)
        } else {
            let mut seeds: Vec<RigidTransform> = starts.iter().map(to_rung).collect();
            if let Some(anchor) = &plan.anchor {
                seeds.push(to_rung(anchor));
            }
            refine_all(aligner, &view, &rung, &seeds)
        };
        trace!(rung = index, candidates = candidates.len(), "Scored rung");

        let survivors: Vec<Candidate> =
            select_survivors(candidates, capacity, SEPARATION_STEPS * rung.angular_step)
                .into_iter()
                .map(|c| {
                    Candidate::new(
                        c.transform.rescaled(rung.box_size, full_box).wrapped(full_box),
                        c.score,
                    )
                })
                .collect();
        if survivors.is_empty() {
            return Err(EngineError::EmptyPool {
                particle,
                rung: index,
            });
        }

        debug!(
            particle,
            rung = index,
            box_size = rung.box_size,
            survivors = survivors.len(),
            best = survivors[0].score,
            "Rung complete"
        );

        starts = survivors.iter().map(|c| c.transform).collect();
        pool = CandidatePool::new(survivors, capacity);
        capacity = pool.next_capacity();
        rungs_visited.push(index);

        if ladder.is_terminal(index) {
            break;
        }
    }

    let last = rungs_visited
        .last()
        .copied()
        .ok_or_else(|| EngineError::Internal(format!("no rung ran for particle {}", particle)))?;

    Ok(LadderOutcome {
        pool,
        final_rung: ladder.rung(last, policy),
        rungs_visited,
    })
}

fn refine_all<A: RungAligner>(
    aligner: &A,
    view: &A::View,
    rung: &Rung,
    seeds: &[RigidTransform],
) -> Vec<Candidate> {
    let iterator = seeds.iter();

    #[cfg(feature = "parallel")]
    let iterator = seeds.par_iter();

    iterator
        .map(|seed| aligner.refine(view, rung, seed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::transform::axis_rotation;
    use crate::engine::ladder::{BandPolicy, ShiftPolicy};
    use nalgebra::Vector3;
    use std::sync::Mutex;

    const POLICY: RungPolicy = RungPolicy {
        shift: ShiftPolicy::Fraction(8),
        band: BandPolicy::Projection { min_res_pixels: 4 },
    };

    /// Scores by angular distance to a hidden rotation about z, and "refines" by
    /// moving halfway towards it.
    struct TowardsTarget {
        target: f64,
        prepared: Mutex<Vec<usize>>,
        refined: Mutex<Vec<RigidTransform>>,
    }

    impl TowardsTarget {
        fn new(target: f64) -> Self {
            Self {
                target,
                prepared: Mutex::new(Vec::new()),
                refined: Mutex::new(Vec::new()),
            }
        }

        fn about_z(degrees: f64) -> RigidTransform {
            RigidTransform::from_rotation(axis_rotation(&Vector3::z_axis(), degrees))
        }

        fn score(&self, xf: &RigidTransform) -> f64 {
            xf.spin_distance(&Self::about_z(self.target)) / 180.0 - 1.0
        }
    }

    impl RungAligner for TowardsTarget {
        type View = usize;

        fn prepare(&self, rung: &Rung) -> Result<usize, EngineError> {
            self.prepared.lock().unwrap().push(rung.box_size);
            Ok(rung.box_size)
        }

        fn coarse_search(
            &self,
            _view: &usize,
            _rung: &Rung,
            orientations: &[RigidTransform],
        ) -> Vec<Candidate> {
            orientations
                .iter()
                .map(|xf| Candidate::new(*xf, self.score(xf)))
                .collect()
        }

        fn refine(&self, _view: &usize, _rung: &Rung, start: &RigidTransform) -> Candidate {
            self.refined.lock().unwrap().push(*start);
            let current = start.rotation().angle().to_degrees() * start.rotation().axis().map_or(1.0, |a| a.z.signum());
            let moved = Self::about_z(current + (self.target - current) / 2.0)
                .with_translation(start.translation());
            Candidate::new(moved, self.score(&moved))
        }
    }

    fn grid(step: f64) -> Vec<RigidTransform> {
        (0..(360.0 / step) as usize)
            .map(|i| TowardsTarget::about_z(i as f64 * step))
            .collect()
    }

    #[test]
    fn cold_start_walks_every_rung_up_to_the_ceiling() {
        let ladder = ResolutionLadder::new(128, 64);
        let aligner = TowardsTarget::new(100.0);
        let plan = LadderPlan {
            start: LadderStart::Cold {
                orientations: grid(10.0),
            },
            capacity: 8,
            anchor: None,
        };

        let outcome = run_ladder(&aligner, &ladder, &POLICY, plan, 0).unwrap();

        assert_eq!(outcome.rungs_visited, vec![0, 1, 2]);
        assert_eq!(*aligner.prepared.lock().unwrap(), vec![24, 48, 64]);
        assert_eq!(outcome.final_rung.box_size, 64);
        assert_eq!(outcome.pool.capacity(), 2);
        assert!(outcome.pool.len() <= 2);
        let best = outcome.best().unwrap();
        assert!(best.transform.spin_distance(&TowardsTarget::about_z(100.0)) < 2.0);
    }

    #[test]
    fn survivors_are_sorted_and_within_capacity() {
        let ladder = ResolutionLadder::new(64, 64);
        let aligner = TowardsTarget::new(-40.0);
        let plan = LadderPlan {
            start: LadderStart::Cold {
                orientations: grid(15.0),
            },
            capacity: 4,
            anchor: None,
        };

        let outcome = run_ladder(&aligner, &ladder, &POLICY, plan, 3).unwrap();

        let scores: Vec<f64> = outcome.pool.candidates().iter().map(|c| c.score).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
        assert!(outcome.pool.len() <= outcome.pool.capacity());
    }

    #[test]
    fn warm_start_skips_rungs_and_reseeds_the_anchor() {
        let ladder = ResolutionLadder::new(128, 128);
        let aligner = TowardsTarget::new(30.0);
        let anchor = TowardsTarget::about_z(20.0);
        let plan = LadderPlan {
            start: LadderStart::Warm {
                rung: 2,
                seeds: vec![TowardsTarget::about_z(0.0), TowardsTarget::about_z(60.0)],
            },
            capacity: 8,
            anchor: Some(anchor),
        };

        let outcome = run_ladder(&aligner, &ladder, &POLICY, plan, 1).unwrap();

        assert_eq!(outcome.rungs_visited, vec![2, 3]);
        let refined = aligner.refined.lock().unwrap();
        let anchored = refined
            .iter()
            .filter(|xf| xf.spin_distance(&anchor) < 1e-4)
            .count();
        assert_eq!(anchored, 2);
    }

    #[test]
    fn translations_come_back_in_full_box_pixels_and_wrapped() {
        let ladder = ResolutionLadder::new(64, 64);
        let aligner = TowardsTarget::new(0.0);
        let start = TowardsTarget::about_z(0.0).with_translation(Vector3::new(40.0, -6.0, 0.0));
        let plan = LadderPlan {
            start: LadderStart::Warm {
                rung: 1,
                seeds: vec![start],
            },
            capacity: 1,
            anchor: None,
        };

        let outcome = run_ladder(&aligner, &ladder, &POLICY, plan, 0).unwrap();

        let t = outcome.best().unwrap().transform.translation();
        assert!((t - Vector3::new(-24.0, -6.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn empty_start_reports_an_empty_pool() {
        let ladder = ResolutionLadder::new(64, 64);
        let plan = LadderPlan {
            start: LadderStart::Cold {
                orientations: Vec::new(),
            },
            capacity: 4,
            anchor: None,
        };

        let result = run_ladder(&TowardsTarget::new(0.0), &ladder, &POLICY, plan, 7);

        assert!(matches!(
            result,
            Err(EngineError::EmptyPool { particle: 7, rung: 0 })
        ));
    }
}
