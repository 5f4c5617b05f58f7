use super::report_particle;
use crate::core::geometry::symmetry::SymmetryGroup;
use crate::core::geometry::transform::RigidTransform;
use crate::core::imaging::{FourierImage, FourierVolume, ImageSource, Reference};
use crate::core::models::particle::{ReferencePair, SubtomogramRecord};
use crate::core::models::result::{SptAlignment, SubtiltAlignment, SubtomogramAlignment};
use crate::engine::candidate::{Candidate, REJECTED_SCORE};
use crate::engine::config::SptAlignConfig;
use crate::engine::controller::{LadderPlan, LadderStart, RungAligner, run_ladder};
use crate::engine::dispatch::AlignTask;
use crate::engine::error::EngineError;
use crate::engine::ladder::{BandPolicy, ResolutionLadder, Rung, RungPolicy, ShiftPolicy};
use crate::engine::optimizer::{NelderMead, SearchBounds, axis_simplex};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::sampling::symmetry_seeds;
use crate::engine::scoring::{SubtiltScorer, TiltView, VolumeScorer};
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Default shift window of a sub-tomogram rung, as a fraction of its box.
const SHIFT_DIVISOR: usize = 6;
/// Lowest shell scored when no minimum resolution is requested.
const DEFAULT_MIN_SHELL: usize = 2;
/// Simplex offset of the translation parameters, in rung pixels.
const TRANSLATION_STEP: f64 = 1.0;

/// Everything shared by the sub-tomogram alignments of one run.
pub struct SptAlignContext {
    pub references: ReferencePair<dyn Reference>,
    pub source: Arc<dyn ImageSource>,
    pub config: SptAlignConfig,
    ladder: ResolutionLadder,
    orientations: Vec<RigidTransform>,
    break_symmetry: Option<SymmetryGroup>,
    band: BandPolicy,
}

impl SptAlignContext {
    pub fn new(
        references: ReferencePair<dyn Reference>,
        source: Arc<dyn ImageSource>,
        config: SptAlignConfig,
    ) -> Result<Self, EngineError> {
        let reference = &references.even;
        let (box_size, pixel_size) = (reference.box_size(), reference.pixel_size());
        let ladder = ResolutionLadder::for_reference(
            box_size,
            pixel_size,
            config.resolution.max_resolution,
        );
        let orientations = if config.from_scratch {
            SymmetryGroup::new(config.symmetry)?
                .gen_orientations(config.coarse_step, config.include_mirror)
        } else {
            Vec::new()
        };
        let break_symmetry = config.break_symmetry.map(SymmetryGroup::new).transpose()?;

        let shell = |res: f64| (box_size as f64 * pixel_size / res).ceil() as usize;
        let band = BandPolicy::Shells {
            min: config
                .resolution
                .min_resolution
                .map_or(DEFAULT_MIN_SHELL, shell),
            max: config
                .resolution
                .max_resolution
                .map_or((box_size as f64 * 0.4) as usize, shell),
        };
        info!(
            ladder = ?ladder.sizes(),
            orientations = orientations.len(),
            band = ?band,
            "Prepared sub-tomogram alignment"
        );

        Ok(Self {
            references,
            source,
            config,
            ladder,
            orientations,
            break_symmetry,
            band,
        })
    }

    pub fn ladder(&self) -> &ResolutionLadder {
        &self.ladder
    }

    fn rung_policy(&self) -> RungPolicy {
        RungPolicy {
            shift: self
                .config
                .max_shift
                .map_or(ShiftPolicy::Fraction(SHIFT_DIVISOR), ShiftPolicy::Absolute),
            band: self.band,
        }
    }

    /// The prior in the reference-to-particle direction the search works in.
    fn prior(&self, record: &SubtomogramRecord) -> Result<RigidTransform, EngineError> {
        record
            .align3d
            .map(|xf| xf.inverse())
            .ok_or(EngineError::MissingPrior { particle: record.id })
    }

    fn plan(&self, record: &SubtomogramRecord) -> Result<LadderPlan, EngineError> {
        if self.config.from_scratch {
            return Ok(LadderPlan {
                start: LadderStart::Cold {
                    orientations: self.orientations.clone(),
                },
                capacity: self.config.initial_pool,
                anchor: None,
            });
        }
        let prior = self.prior(record)?;
        let rung = self.ladder.final_start();
        Ok(LadderPlan {
            start: LadderStart::Warm {
                rung,
                seeds: symmetry_seeds(&prior, self.break_symmetry.as_ref()),
            },
            capacity: (self.config.initial_pool >> rung).max(1),
            anchor: None,
        })
    }
}

/// A sub-tilt series and optionally its reconstructed volume, clipped to one rung.
struct SeriesView {
    tilts: Vec<TiltView>,
    volume: Option<FourierVolume>,
}

/// Optimizes the six `eman` parameters of a sub-tomogram against its sub-tilts.
struct SeriesAligner<'a> {
    reference: &'a dyn Reference,
    record: &'a SubtomogramRecord,
    images: &'a [FourierImage],
    volume: Option<&'a FourierVolume>,
    max_angle: f64,
    local: bool,
    optimizer: NelderMead,
}

impl SeriesAligner<'_> {
    fn bounds(&self, rung: &Rung, start: &RigidTransform) -> SearchBounds {
        SearchBounds {
            max_shift: Some(rung.max_shift as f64),
            max_angle: self.local.then_some(self.max_angle),
            origin: self.local.then_some(*start),
        }
    }

    fn per_tilt_scores(&self, view: &SeriesView, rung: &Rung, xf: &RigidTransform) -> Vec<f64> {
        SubtiltScorer::new(self.reference, &view.tilts, rung).per_tilt_scores(xf)
    }
}

impl RungAligner for SeriesAligner<'_> {
    type View = SeriesView;

    fn prepare(&self, rung: &Rung) -> Result<SeriesView, EngineError> {
        let tilts = self
            .record
            .subtilts
            .iter()
            .zip(self.images)
            .map(|(subtilt, image)| TiltView {
                projection: subtilt.projection.rescaled(rung.full_box, rung.box_size),
                image: image.clip(rung.box_size),
            })
            .collect();
        let volume = match (rung.index, self.volume) {
            (0, Some(volume)) => Some(volume.clip(rung.box_size)),
            _ => None,
        };
        Ok(SeriesView { tilts, volume })
    }

    fn coarse_search(
        &self,
        view: &SeriesView,
        rung: &Rung,
        orientations: &[RigidTransform],
    ) -> Vec<Candidate> {
        let iterator = orientations.iter();

        #[cfg(feature = "parallel")]
        let iterator = orientations.par_iter();

        match &view.volume {
            Some(volume) => {
                let scorer = VolumeScorer::new(self.reference, volume, rung);
                iterator.map(|xf| scorer.score(xf)).collect()
            }
            None => {
                let scorer = SubtiltScorer::new(self.reference, &view.tilts, rung);
                iterator
                    .map(|xf| Candidate::new(*xf, scorer.score(xf)))
                    .collect()
            }
        }
    }

    fn refine(&self, view: &SeriesView, rung: &Rung, start: &RigidTransform) -> Candidate {
        let scorer = SubtiltScorer::new(self.reference, &view.tilts, rung);
        let bounds = self.bounds(rung, start);
        let step = rung.angular_step;
        let objective = |x: &[f64]| {
            let xf = RigidTransform::from_eman_params(x);
            if bounds.admits(&xf) {
                scorer.score(&xf)
            } else {
                REJECTED_SCORE
            }
        };

        let x0 = start.to_eman_params();
        let steps = [
            TRANSLATION_STEP,
            TRANSLATION_STEP,
            TRANSLATION_STEP,
            step,
            step,
            step,
        ];
        let minimum = self
            .optimizer
            .minimize(|x| objective(x.as_slice()), axis_simplex(&x0, &steps));

        Candidate::new(
            RigidTransform::from_eman_params(minimum.point.as_slice()),
            minimum.value,
        )
    }
}

#[instrument(skip_all, fields(particle = record.id))]
pub fn align_subtomogram(
    context: &SptAlignContext,
    record: &SubtomogramRecord,
) -> Result<SptAlignment, EngineError> {
    let half = record.half_set();
    let reference = context.references.for_half(half);
    let images = record
        .subtilts
        .iter()
        .map(|subtilt| context.source.read_image(&subtilt.src, subtilt.idx))
        .collect::<Result<Vec<_>, _>>()?;
    let volume = if context.config.from_scratch {
        Some(context.source.read_volume(&record.src, record.idx)?)
    } else {
        None
    };

    let aligner = SeriesAligner {
        reference: reference.as_ref(),
        record,
        images: &images,
        volume: volume.as_ref(),
        max_angle: context.config.max_angle,
        local: !context.config.from_scratch,
        optimizer: NelderMead::from(&context.config.optimizer),
    };
    let policy = context.rung_policy();

    let (best, final_rung) = if context.config.skip_align {
        let prior = context.prior(record)?;
        let rung = context.ladder.rung(context.ladder.len() - 1, &policy);
        debug!("Skipping alignment, scoring the prior");
        (prior, rung)
    } else {
        let outcome = run_ladder(&aligner, &context.ladder, &policy, context.plan(record)?, record.id)?;
        let best = outcome.best().ok_or(EngineError::EmptyPool {
            particle: record.id,
            rung: outcome.final_rung.index,
        })?;
        debug!(score = best.score, rungs = ?outcome.rungs_visited, "Sub-tomogram aligned");
        (best.transform, outcome.final_rung)
    };

    let view = aligner.prepare(&final_rung)?;
    let scores = aligner.per_tilt_scores(
        &view,
        &final_rung,
        &best.rescaled(final_rung.full_box, final_rung.box_size),
    );
    Ok(assemble(record, &best, scores))
}

fn assemble(record: &SubtomogramRecord, best: &RigidTransform, scores: Vec<f64>) -> SptAlignment {
    let mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let class = record.half_set();
    let subtilts = record
        .subtilts
        .iter()
        .zip(scores)
        .map(|(subtilt, score)| SubtiltAlignment {
            src: subtilt.src.clone(),
            idx: subtilt.idx,
            projection: subtilt.projection.compose(best),
            score,
            ptcl3d_id: record.id,
            class,
            tilt_id: subtilt.tilt_id,
        })
        .collect();

    SptAlignment {
        volume: SubtomogramAlignment {
            id: record.id,
            src: record.src.clone(),
            idx: record.idx,
            align3d: best.inverse(),
            score: mean,
            orig_idx: record.orig_idx,
        },
        subtilts,
    }
}

/// One batch of a sub-tomogram alignment run.
pub struct SptAlignTask {
    pub context: Arc<SptAlignContext>,
    pub batch: usize,
    pub particles: Vec<(usize, SubtomogramRecord)>,
}

impl AlignTask for SptAlignTask {
    type Output = Vec<(usize, SptAlignment)>;

    fn name(&self) -> String {
        format!("spt-batch-{}", self.batch)
    }

    #[instrument(skip_all, name = "spt_align_task", fields(batch = self.batch))]
    fn execute(&self, progress: &ProgressReporter) -> Result<Self::Output, EngineError> {
        progress.report(Progress::TaskStart {
            total_steps: self.particles.len() as u64,
        });
        let mut aligned = Vec::with_capacity(self.particles.len());
        for (position, record) in &self.particles {
            let alignment = align_subtomogram(&self.context, record)?;
            report_particle(progress, record.id, alignment.volume.score);
            aligned.push((*position, alignment));
        }
        progress.report(Progress::TaskFinish);
        Ok(aligned)
    }
}
