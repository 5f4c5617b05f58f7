//! Start policies: where a particle's search begins on the resolution ladder.

use crate::core::geometry::symmetry::SymmetryGroup;
use crate::core::geometry::transform::{RigidTransform, XyzAngles};
use rand::prelude::*;
use rand_distr::{Normal, NormalError};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Invalid perturbation spread: {0}. Spread must be finite and non-negative")]
    InvalidSpread(f64),
    #[error("Failed to create normal distribution: {source}")]
    Distribution {
        #[from]
        source: NormalError,
    },
}

/// Deterministic generator for one particle, so a batch can be re-run particle by
/// particle and reproduce the same perturbations.
pub fn particle_rng(seed: u64, particle: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ particle as u64)
}

/// The prior followed by `count - 1` copies whose `xyz` angles are perturbed by
/// `N(0, spread)` degrees. Translations are kept.
#[instrument(level = "trace", skip_all, fields(count, spread))]
pub fn perturbed_seeds(
    prior: &RigidTransform,
    count: usize,
    spread: f64,
    rng: &mut impl Rng,
) -> Result<Vec<RigidTransform>, SamplingError> {
    if !(spread.is_finite() && spread >= 0.0) {
        return Err(SamplingError::InvalidSpread(spread));
    }
    let normal = Normal::new(0.0, spread)?;
    let angles = prior.xyz_angles();
    let translation = prior.translation();

    let mut seeds = Vec::with_capacity(count.max(1));
    seeds.push(*prior);
    for _ in 1..count {
        let perturbed = XyzAngles {
            xtilt: angles.xtilt + normal.sample(rng),
            ytilt: angles.ytilt + normal.sample(rng),
            ztilt: angles.ztilt + normal.sample(rng),
        };
        seeds.push(RigidTransform::from_xyz(perturbed, translation));
    }
    Ok(seeds)
}

/// Seeds for a sub-tomogram local search: the prior, or all of its symmetry mates
/// when a symmetry is being broken.
pub fn symmetry_seeds(
    prior: &RigidTransform,
    break_symmetry: Option<&SymmetryGroup>,
) -> Vec<RigidTransform> {
    match break_symmetry {
        Some(group) => group.symmetry_mates(prior),
        None => vec![*prior],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn prior() -> RigidTransform {
        RigidTransform::from_xyz(
            XyzAngles {
                xtilt: 12.0,
                ytilt: -30.0,
                ztilt: 75.0,
            },
            Vector3::new(2.0, -1.0, 0.0),
        )
    }

    #[test]
    fn perturbed_seeds_start_with_the_prior_and_keep_translation() {
        let mut rng = particle_rng(5, 3);

        let seeds = perturbed_seeds(&prior(), 8, 3.0, &mut rng).unwrap();

        assert_eq!(seeds.len(), 8);
        assert_eq!(seeds[0], prior());
        for seed in &seeds {
            assert_eq!(seed.translation(), prior().translation());
            assert!(seed.spin_distance(&prior()) < 30.0);
        }
    }

    #[test]
    fn perturbations_are_reproducible_per_particle() {
        let a = perturbed_seeds(&prior(), 4, 3.0, &mut particle_rng(9, 1)).unwrap();
        let b = perturbed_seeds(&prior(), 4, 3.0, &mut particle_rng(9, 1)).unwrap();
        let c = perturbed_seeds(&prior(), 4, 3.0, &mut particle_rng(9, 2)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_spread_replicates_the_prior() {
        let seeds = perturbed_seeds(&prior(), 3, 0.0, &mut particle_rng(0, 0)).unwrap();

        for seed in &seeds {
            assert!(seed.approx_eq(&prior(), 1e-4, 1e-12));
        }
    }

    #[test]
    fn invalid_spread_is_rejected() {
        let result = perturbed_seeds(&prior(), 3, -1.0, &mut particle_rng(0, 0));

        assert!(matches!(result, Err(SamplingError::InvalidSpread(_))));
    }

    #[test]
    fn symmetry_seeds_expand_to_all_mates() {
        let group = SymmetryGroup::parse("c4").unwrap();

        assert_eq!(symmetry_seeds(&prior(), None), vec![prior()]);
        assert_eq!(symmetry_seeds(&prior(), Some(&group)).len(), 4);
    }
}
