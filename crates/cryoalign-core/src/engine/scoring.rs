//! # Multi-Resolution Scorer
//!
//! Scores compare a transformed reference with an observed particle at one rung of
//! the resolution ladder and return a negated correlation, so lower is better and
//! a perfect match scores `-1`.
//!
//! - [`ProjectionScorer`] projects the reference, aligns the projection to the
//!   particle by cross-correlation within the rung's shift limit, and averages the
//!   FSC over the rung's band, optionally weighted by the particle's CTF curve.
//! - [`SubtiltScorer`] projects the reference under every tilt of a sub-tilt series
//!   and averages the per-tilt FSC scores.
//! - [`VolumeScorer`] rotates the reference volume, aligns it by 3D
//!   cross-correlation and scores the overlap of the populated Fourier voxels.
//!
//! All scorers are pure functions of their inputs and only read shared buffers, so
//! candidates within a rung can be scored in parallel.

use super::candidate::Candidate;
use super::ladder::Rung;
use crate::core::geometry::transform::RigidTransform;
use crate::core::imaging::ctf::CtfWeights;
use crate::core::imaging::{FourierImage, FourierVolume, FscShell, Reference};
use nalgebra::Vector3;
use std::ops::Range;

/// `-Σ fsc·w / Σ w` over the shells of `band` present in `fsc`.
///
/// Missing or all-zero weights fall back to a plain mean. An empty band scores 0.
pub fn band_average(fsc: &[FscShell], band: &Range<usize>, weights: Option<&CtfWeights>) -> f64 {
    let shells: Vec<&FscShell> = fsc.iter().filter(|s| band.contains(&s.index)).collect();
    if shells.is_empty() {
        return 0.0;
    }

    if let Some(weights) = weights {
        let (weighted, total) = shells.iter().fold((0.0, 0.0), |(num, den), s| {
            let w = weights.weight(s.index);
            (num + s.correlation * w, den + w)
        });
        if total > 0.0 {
            return -weighted / total;
        }
    }

    -shells.iter().map(|s| s.correlation).sum::<f64>() / shells.len() as f64
}

/// Scores single-particle projections at one rung.
pub struct ProjectionScorer<'a, R: Reference + ?Sized> {
    reference: &'a R,
    particle: &'a FourierImage,
    rung: &'a Rung,
    weights: Option<&'a CtfWeights>,
}

impl<'a, R: Reference + ?Sized> ProjectionScorer<'a, R> {
    /// `particle` must already be clipped to the rung's box.
    pub fn new(
        reference: &'a R,
        particle: &'a FourierImage,
        rung: &'a Rung,
        weights: Option<&'a CtfWeights>,
    ) -> Self {
        Self {
            reference,
            particle,
            rung,
            weights,
        }
    }

    /// Scores `xf` after moving it to the best translation within the rung's shift
    /// limit around its current one. The returned candidate carries that translation.
    pub fn score(&self, xf: &RigidTransform) -> Candidate {
        let projection = self.reference.project(xf, self.rung.box_size);
        let shift = projection.cross_correlation_peak(
            self.particle,
            self.rung.max_shift,
            self.rung.max_shift,
        );
        let aligned = projection.shifted(shift.x, shift.y);
        let fsc = self.particle.fourier_shell_correlation(&aligned);

        Candidate::new(
            xf.translated(Vector3::new(shift.x, shift.y, 0.0)),
            band_average(&fsc, &self.rung.band, self.weights),
        )
    }
}

/// One tilt of a series: its projection geometry and observed image, both already
/// expressed at the rung's box size.
#[derive(Debug, Clone)]
pub struct TiltView {
    pub projection: RigidTransform,
    pub image: FourierImage,
}

/// Scores a 3D transform against every image of a sub-tilt series at one rung.
pub struct SubtiltScorer<'a, R: Reference + ?Sized> {
    reference: &'a R,
    tilts: &'a [TiltView],
    box_size: usize,
    band: Range<usize>,
}

impl<'a, R: Reference + ?Sized> SubtiltScorer<'a, R> {
    pub fn new(reference: &'a R, tilts: &'a [TiltView], rung: &Rung) -> Self {
        Self {
            reference,
            tilts,
            box_size: rung.box_size,
            band: rung.band.clone(),
        }
    }

    pub fn per_tilt_scores(&self, xf: &RigidTransform) -> Vec<f64> {
        self.tilts
            .iter()
            .map(|tilt| {
                let projection = self
                    .reference
                    .project(&tilt.projection.compose(xf), self.box_size);
                let fsc = tilt.image.fourier_shell_correlation(&projection);
                band_average(&fsc, &self.band, None)
            })
            .collect()
    }

    pub fn score(&self, xf: &RigidTransform) -> f64 {
        let scores = self.per_tilt_scores(xf);
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Scores a 3D transform against a sub-tomogram volume at one rung.
pub struct VolumeScorer<'a, R: Reference + ?Sized> {
    reference: &'a R,
    particle: &'a FourierVolume,
    rung: &'a Rung,
}

impl<'a, R: Reference + ?Sized> VolumeScorer<'a, R> {
    pub fn new(reference: &'a R, particle: &'a FourierVolume, rung: &'a Rung) -> Self {
        Self {
            reference,
            particle,
            rung,
        }
    }

    pub fn score(&self, xf: &RigidTransform) -> Candidate {
        let rotated = self.reference.transformed_volume(xf, self.rung.box_size);
        let shift = rotated.cross_correlation_peak(self.particle, self.rung.max_shift);
        let aligned = rotated.shifted(shift.x, shift.y, shift.z);
        let correlation = aligned.normalized_correlation(self.particle, self.rung.band.clone());

        Candidate::new(xf.translated(shift), -correlation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::transform::{XyzAngles, axis_rotation};
    use crate::core::imaging::GaussianModel;
    use crate::core::imaging::ctf::CtfParams;
    use crate::engine::ladder::{BandPolicy, ResolutionLadder, RungPolicy, ShiftPolicy};

    fn model() -> GaussianModel {
        GaussianModel::random(32, 2.0, 10, 9.0, 1.8, 21).unwrap()
    }

    fn spa_rung(index: usize) -> Rung {
        ResolutionLadder::new(32, 32).rung(
            index,
            &RungPolicy {
                shift: ShiftPolicy::Fraction(8),
                band: BandPolicy::Projection { min_res_pixels: 2 },
            },
        )
    }

    fn shells(values: &[f64]) -> Vec<FscShell> {
        values
            .iter()
            .enumerate()
            .map(|(index, &correlation)| FscShell {
                index,
                frequency: index as f64 / 16.0,
                correlation,
            })
            .collect()
    }

    #[test]
    fn band_average_is_a_negated_mean_over_the_band() {
        let fsc = shells(&[1.0, 1.0, 0.5, 0.7, 0.9, 0.0]);

        assert!((band_average(&fsc, &(2..5), None) + 0.7).abs() < 1e-12);
        assert_eq!(band_average(&fsc, &(10..12), None), 0.0);
    }

    #[test]
    fn band_average_applies_ctf_weights() {
        let fsc = shells(&[0.0; 40].map(|_: f64| 0.5));
        let ctf = CtfParams {
            defocus: 2.0,
            voltage: 300.0,
            cs: 2.7,
            ampcont: 10.0,
            bfactor: 0.0,
        };
        let weights = CtfWeights::derive(&ctf, 40, 2.0).unwrap();

        let score = band_average(&fsc, &(4..16), Some(&weights));

        assert!((score + 0.5).abs() < 1e-12);
    }

    #[test]
    fn projection_scored_against_itself_is_minus_one() {
        let model = model();
        let rung = spa_rung(0);
        let particle = model.project(&RigidTransform::identity(), 32).clip(rung.box_size);
        let scorer = ProjectionScorer::new(&model, &particle, &rung, None);

        let candidate = scorer.score(&RigidTransform::identity());

        assert!((candidate.score + 1.0).abs() < 1e-6, "score {}", candidate.score);
        assert!(candidate.transform.translation().norm() < 1e-6);
    }

    #[test]
    fn projection_scorer_recovers_translation() {
        let model = model();
        let rung = spa_rung(0);
        let truth = RigidTransform::from_translation(Vector3::new(2.0, -1.0, 0.0));
        let particle = model.project(&truth, rung.box_size);
        let scorer = ProjectionScorer::new(&model, &particle, &rung, None);

        let candidate = scorer.score(&RigidTransform::identity());

        assert!((candidate.transform.translation() - truth.translation()).norm() < 0.3);
        assert!(candidate.score < -0.95);
    }

    #[test]
    fn wrong_orientation_scores_worse() {
        let model = model();
        let rung = spa_rung(1);
        let particle = model.project(&RigidTransform::identity(), rung.box_size);
        let scorer = ProjectionScorer::new(&model, &particle, &rung, None);

        let right = scorer.score(&RigidTransform::identity());
        let wrong = scorer.score(&RigidTransform::from_xyz(
            XyzAngles {
                xtilt: 50.0,
                ytilt: 20.0,
                ztilt: 0.0,
            },
            Vector3::zeros(),
        ));

        assert!(right.score < wrong.score);
    }

    #[test]
    fn subtilt_scores_are_per_tilt_and_averaged() {
        let model = model();
        let rung = spa_rung(1);
        let tilts: Vec<TiltView> = [-30.0, 0.0, 30.0]
            .iter()
            .map(|&angle| {
                let projection =
                    RigidTransform::from_rotation(axis_rotation(&Vector3::y_axis(), angle));
                TiltView {
                    projection,
                    image: model.project(&projection, rung.box_size),
                }
            })
            .collect();
        let scorer = SubtiltScorer::new(&model, &tilts, &rung);

        let per_tilt = scorer.per_tilt_scores(&RigidTransform::identity());

        assert_eq!(per_tilt.len(), 3);
        for score in &per_tilt {
            assert!((score + 1.0).abs() < 1e-6);
        }
        assert!((scorer.score(&RigidTransform::identity()) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn volume_scorer_finds_shift_and_matches_itself() {
        let model = model();
        let rung = ResolutionLadder::new(32, 32).rung(
            0,
            &RungPolicy {
                shift: ShiftPolicy::Fraction(6),
                band: BandPolicy::Shells { min: 1, max: 12 },
            },
        );
        let truth = RigidTransform::from_translation(Vector3::new(1.0, 0.0, -2.0));
        let particle = model
            .transformed_volume(&truth, rung.box_size)
            .with_missing_wedge(60.0);
        let scorer = VolumeScorer::new(&model, &particle, &rung);

        let candidate = scorer.score(&RigidTransform::identity());

        assert!((candidate.transform.translation() - truth.translation()).norm() < 0.3);
        assert!(candidate.score < -0.95);
    }
}
