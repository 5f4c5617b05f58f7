use super::report_particle;
use crate::core::geometry::symmetry::SymmetryGroup;
use crate::core::geometry::transform::RigidTransform;
use crate::core::imaging::ctf::CtfWeights;
use crate::core::imaging::{FourierImage, ImageSource, Reference};
use crate::core::models::particle::{ParticleRecord, ReferencePair};
use crate::core::models::result::AlignmentRecord;
use crate::engine::candidate::{Candidate, REJECTED_SCORE};
use crate::engine::config::{SearchMode, SpaAlignConfig};
use crate::engine::controller::{LadderPlan, LadderStart, RungAligner, run_ladder};
use crate::engine::dispatch::AlignTask;
use crate::engine::error::EngineError;
use crate::engine::ladder::{
    BandPolicy, ResolutionLadder, Rung, RungPolicy, ShiftPolicy, warm_capacity,
};
use crate::engine::optimizer::{NelderMead, SearchBounds, axis_simplex};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::sampling::{particle_rng, perturbed_seeds};
use crate::engine::scoring::ProjectionScorer;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Shift window of a projection rung, as a fraction of its box.
const SHIFT_DIVISOR: usize = 8;

/// Everything shared by the single-particle alignments of one run.
pub struct SpaAlignContext {
    pub references: ReferencePair<dyn Reference>,
    pub source: Arc<dyn ImageSource>,
    pub config: SpaAlignConfig,
    ladder: ResolutionLadder,
    orientations: Vec<RigidTransform>,
}

impl SpaAlignContext {
    pub fn new(
        references: ReferencePair<dyn Reference>,
        source: Arc<dyn ImageSource>,
        config: SpaAlignConfig,
    ) -> Result<Self, EngineError> {
        let reference = &references.even;
        let ladder = ResolutionLadder::for_reference(
            reference.box_size(),
            reference.pixel_size(),
            config.resolution.max_resolution,
        );
        let orientations = match config.search {
            SearchMode::Global => SymmetryGroup::new(config.symmetry)?
                .gen_orientations(config.coarse_step, config.include_mirror),
            SearchMode::Local { .. } => Vec::new(),
        };
        info!(
            ladder = ?ladder.sizes(),
            orientations = orientations.len(),
            "Prepared single-particle alignment"
        );

        Ok(Self {
            references,
            source,
            config,
            ladder,
            orientations,
        })
    }

    pub fn ladder(&self) -> &ResolutionLadder {
        &self.ladder
    }

    pub fn orientations(&self) -> &[RigidTransform] {
        &self.orientations
    }

    fn rung_policy(&self) -> RungPolicy {
        RungPolicy {
            shift: ShiftPolicy::Fraction(SHIFT_DIVISOR),
            band: BandPolicy::Projection {
                min_res_pixels: self.config.resolution.min_res_pixels,
            },
        }
    }

    fn plan(&self, particle: &ParticleRecord) -> Result<LadderPlan, EngineError> {
        match self.config.search {
            SearchMode::Global => Ok(LadderPlan {
                start: LadderStart::Cold {
                    orientations: self.orientations.clone(),
                },
                capacity: self.config.initial_pool,
                anchor: particle.prior,
            }),
            SearchMode::Local { strength } => {
                let prior = particle
                    .prior
                    .ok_or(EngineError::MissingPrior { particle: particle.id })?;
                let rung = self.ladder.local_start(strength);
                let capacity = warm_capacity(self.config.initial_pool, strength);
                let mut rng = particle_rng(self.config.seed, particle.id);
                let seeds = perturbed_seeds(
                    &prior,
                    capacity,
                    self.config.perturbation_spread,
                    &mut rng,
                )?;
                Ok(LadderPlan {
                    start: LadderStart::Warm { rung, seeds },
                    capacity,
                    anchor: Some(prior),
                })
            }
        }
    }

    /// Angular limit around the prior, only enforced in local refinement.
    fn bounds(&self, particle: &ParticleRecord) -> SearchBounds {
        match (self.config.search, self.config.max_angle, particle.prior) {
            (SearchMode::Local { .. }, Some(max_angle), Some(prior)) => SearchBounds {
                max_shift: None,
                max_angle: Some(max_angle),
                origin: Some(RigidTransform::from_rotation(*prior.rotation())),
            },
            _ => SearchBounds::unbounded(),
        }
    }
}

/// Optimizes the three `xyz` angles of a projection; the translation comes from the
/// cross-correlation peak at every evaluation.
struct ProjectionAligner<'a> {
    reference: &'a dyn Reference,
    image: &'a FourierImage,
    weights: Option<&'a CtfWeights>,
    bounds: SearchBounds,
    optimizer: NelderMead,
}

impl ProjectionAligner<'_> {
    fn evaluate(&self, view: &FourierImage, rung: &Rung, xf: &RigidTransform) -> Candidate {
        let candidate = ProjectionScorer::new(self.reference, view, rung, self.weights).score(xf);
        if self.bounds.admits(&candidate.transform) {
            candidate
        } else {
            Candidate::new(candidate.transform, REJECTED_SCORE)
        }
    }
}

impl RungAligner for ProjectionAligner<'_> {
    type View = FourierImage;

    fn prepare(&self, rung: &Rung) -> Result<FourierImage, EngineError> {
        Ok(self.image.clip(rung.box_size))
    }

    fn coarse_search(
        &self,
        view: &FourierImage,
        rung: &Rung,
        orientations: &[RigidTransform],
    ) -> Vec<Candidate> {
        let iterator = orientations.iter();

        #[cfg(feature = "parallel")]
        let iterator = orientations.par_iter();

        iterator.map(|xf| self.evaluate(view, rung, xf)).collect()
    }

    fn refine(&self, view: &FourierImage, rung: &Rung, start: &RigidTransform) -> Candidate {
        let translation = start.translation();
        let at = |params: &[f64]| RigidTransform::from_xyz_params(params, translation);
        let x0 = start.to_xyz_params();
        let step = rung.angular_step;

        let minimum = self.optimizer.minimize(
            |x| self.evaluate(view, rung, &at(x.as_slice())).score,
            axis_simplex(&x0, &[step, step, step]),
        );

        self.evaluate(view, rung, &at(minimum.point.as_slice()))
    }
}

#[instrument(skip_all, fields(particle = particle.id))]
pub fn align_particle(
    context: &SpaAlignContext,
    particle: &ParticleRecord,
) -> Result<AlignmentRecord, EngineError> {
    let half = particle.half_set();
    let reference = context.references.for_half(half);
    let image = context.source.read_image(&particle.src, particle.idx)?;

    let weights = particle.ctf.as_ref().and_then(|ctf| {
        CtfWeights::derive(ctf, context.ladder.full_box(), reference.pixel_size())
            .map_err(|e| debug!(error = %e, "CTF weighting unavailable, using uniform weights"))
            .ok()
    });

    let aligner = ProjectionAligner {
        reference: reference.as_ref(),
        image: &image,
        weights: weights.as_ref(),
        bounds: context.bounds(particle),
        optimizer: NelderMead::from(&context.config.optimizer),
    };
    let plan = context.plan(particle)?;
    let outcome = run_ladder(
        &aligner,
        &context.ladder,
        &context.rung_policy(),
        plan,
        particle.id,
    )?;
    let best = outcome.best().ok_or(EngineError::EmptyPool {
        particle: particle.id,
        rung: outcome.final_rung.index,
    })?;
    debug!(score = best.score, rungs = ?outcome.rungs_visited, "Particle aligned");

    Ok(AlignmentRecord {
        id: particle.id,
        src: particle.src.clone(),
        idx: particle.idx,
        projection: best.transform,
        score: best.score,
        class: half,
    })
}

/// One batch of a single-particle alignment run. Outputs are tagged with the
/// particles' positions in the input list.
pub struct SpaAlignTask {
    pub context: Arc<SpaAlignContext>,
    pub batch: usize,
    pub particles: Vec<(usize, ParticleRecord)>,
}

impl AlignTask for SpaAlignTask {
    type Output = Vec<(usize, AlignmentRecord)>;

    fn name(&self) -> String {
        format!("spa-batch-{}", self.batch)
    }

    #[instrument(skip_all, name = "spa_align_task", fields(batch = self.batch))]
    fn execute(&self, progress: &ProgressReporter) -> Result<Self::Output, EngineError> {
        progress.report(Progress::TaskStart {
            total_steps: self.particles.len() as u64,
        });
        let mut aligned = Vec::with_capacity(self.particles.len());
        for (position, particle) in &self.particles {
            let record = align_particle(&self.context, particle)?;
            report_particle(progress, record.id, record.score);
            aligned.push((*position, record));
        }
        progress.report(Progress::TaskFinish);
        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::transform::XyzAngles;
    use crate::core::imaging::ctf::CtfParams;
    use crate::core::imaging::{GaussianModel, SyntheticStack};
    use crate::engine::config::{OptimizerConfig, SpaAlignConfigBuilder};
    use nalgebra::Vector3;

    fn model() -> Arc<GaussianModel> {
        Arc::new(GaussianModel::random(32, 2.0, 12, 9.0, 1.6, 5).unwrap())
    }

    fn truth() -> RigidTransform {
        RigidTransform::from_xyz(
            XyzAngles {
                xtilt: 10.0,
                ytilt: 0.0,
                ztilt: 0.0,
            },
            Vector3::new(2.0, -3.0, 0.0),
        )
    }

    fn context(model: Arc<GaussianModel>, config: SpaAlignConfig) -> SpaAlignContext {
        let mut stack = SyntheticStack::new(Arc::clone(&model));
        stack.insert("particles", 0, truth());
        let reference: Arc<dyn Reference> = model;
        SpaAlignContext::new(ReferencePair::shared(reference), Arc::new(stack), config).unwrap()
    }

    fn optimizer() -> OptimizerConfig {
        OptimizerConfig {
            max_iterations: 200,
            f_tolerance: 1e-6,
            x_tolerance: 1e-2,
        }
    }

    fn assert_recovered(record: &AlignmentRecord) {
        let angle = record.projection.spin_distance(&truth());
        let shift = (record.projection.translation() - truth().translation()).norm();
        assert!(angle < 2.0, "angular error {} deg", angle);
        assert!(shift < 1.0, "translation error {} px", shift);
    }

    #[test]
    fn global_search_recovers_a_synthetic_projection() {
        let config = SpaAlignConfigBuilder::new()
            .coarse_step(15.0)
            .optimizer(optimizer())
            .build()
            .unwrap();
        let context = context(model(), config);

        let record = align_particle(&context, &ParticleRecord::new(0, "particles", 0)).unwrap();

        assert_recovered(&record);
        assert!(record.score < -0.9);
        assert_eq!(context.ladder().sizes(), &[24, 32]);
    }

    #[test]
    fn global_search_with_default_settings_recovers_a_synthetic_projection() {
        let context = context(model(), SpaAlignConfigBuilder::new().build().unwrap());

        let record = align_particle(&context, &ParticleRecord::new(0, "particles", 0)).unwrap();

        assert_recovered(&record);
        assert!(record.score < -0.9);
    }

    #[test]
    fn warm_start_pool_shrinks_with_the_full_ladder_depth() {
        let config = SpaAlignConfigBuilder::new().local_refine(2).build().unwrap();
        let context = context(model(), config);
        let particle = ParticleRecord::new(0, "particles", 0).with_prior(truth());

        let plan = context.plan(&particle).unwrap();

        assert_eq!(context.ladder().sizes(), &[24, 32]);
        assert_eq!(plan.capacity, 8);
        match plan.start {
            LadderStart::Warm { rung, seeds } => {
                assert_eq!(rung, 1);
                assert_eq!(seeds.len(), 8);
            }
            other => panic!("expected a warm start, got {:?}", other),
        }
    }

    #[test]
    fn local_refinement_recovers_from_a_nearby_prior() {
        let config = SpaAlignConfigBuilder::new()
            .local_refine(1)
            .optimizer(optimizer())
            .seed(9)
            .build()
            .unwrap();
        let context = context(model(), config);
        let prior = RigidTransform::from_xyz(
            XyzAngles {
                xtilt: 14.0,
                ytilt: -2.0,
                ztilt: 3.0,
            },
            Vector3::new(1.0, -2.0, 0.0),
        );
        let particle = ParticleRecord::new(0, "particles", 0).with_prior(prior);

        let record = align_particle(&context, &particle).unwrap();

        assert_recovered(&record);
        assert!(context.orientations().is_empty());
    }

    #[test]
    fn ctf_weighted_and_unweighted_runs_both_align() {
        let config = SpaAlignConfigBuilder::new()
            .local_refine(1)
            .optimizer(optimizer())
            .build()
            .unwrap();
        let context = context(model(), config);
        let prior = truth().translated(Vector3::new(0.5, 0.5, 0.0));
        let plain = ParticleRecord::new(0, "particles", 0).with_prior(prior);
        let weighted = plain.clone().with_ctf(CtfParams {
            defocus: 1.5,
            voltage: 300.0,
            cs: 2.7,
            ampcont: 10.0,
            bfactor: 0.0,
        });
        let broken = plain.clone().with_ctf(CtfParams {
            voltage: -1.0,
            ..weighted.ctf.unwrap()
        });

        for particle in [plain, weighted, broken] {
            let record = align_particle(&context, &particle).unwrap();
            assert_recovered(&record);
        }
    }

    #[test]
    fn local_refinement_without_a_prior_fails() {
        let config = SpaAlignConfigBuilder::new().local_refine(1).build().unwrap();
        let context = context(model(), config);

        let result = align_particle(&context, &ParticleRecord::new(4, "particles", 0));

        assert!(matches!(result, Err(EngineError::MissingPrior { particle: 4 })));
    }

    #[test]
    fn missing_image_is_an_image_source_error() {
        let config = SpaAlignConfigBuilder::new().local_refine(1).build().unwrap();
        let context = context(model(), config);
        let particle = ParticleRecord::new(0, "particles", 7).with_prior(truth());

        let result = align_particle(&context, &particle);

        assert!(matches!(result, Err(EngineError::ImageSource { .. })));
    }

    #[test]
    fn batch_task_tags_outputs_with_input_positions() {
        let config = SpaAlignConfigBuilder::new()
            .local_refine(1)
            .optimizer(optimizer())
            .build()
            .unwrap();
        let task = SpaAlignTask {
            context: Arc::new(context(model(), config)),
            batch: 2,
            particles: vec![
                (5, ParticleRecord::new(5, "particles", 0).with_prior(truth())),
                (9, ParticleRecord::new(9, "particles", 0).with_prior(truth())),
            ],
        };

        let output = task.execute(&ProgressReporter::new()).unwrap();

        assert_eq!(task.name(), "spa-batch-2");
        assert_eq!(output.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![5, 9]);
        assert_eq!(output[1].1.class, crate::core::models::particle::HalfSet::Odd);
    }
}
