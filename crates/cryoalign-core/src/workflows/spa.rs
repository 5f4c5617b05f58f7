use super::run_batches;
use crate::core::imaging::{ImageSource, Reference};
use crate::core::models::particle::{ParticleRecord, ReferencePair};
use crate::core::models::result::AlignmentRecord;
use crate::engine::config::SpaAlignConfig;
use crate::engine::dispatch::{TaskQueue, split_batches};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::tasks::spa_align::{SpaAlignContext, SpaAlignTask};
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(skip_all, name = "spa_workflow", fields(particles = particles.len()))]
pub fn run<Q: TaskQueue>(
    particles: Vec<ParticleRecord>,
    references: ReferencePair<dyn Reference>,
    source: Arc<dyn ImageSource>,
    config: SpaAlignConfig,
    queue: &Q,
    reporter: &ProgressReporter,
) -> Result<Vec<AlignmentRecord>, EngineError> {
    // === Phase 1: Shared context ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let context = Arc::new(SpaAlignContext::new(references, source, config)?);
    reporter.report(Progress::PhaseFinish);

    if particles.is_empty() {
        info!("Particle list is empty, nothing to align.");
        return Ok(Vec::new());
    }

    // === Phase 2: Batched alignment ===
    reporter.report(Progress::PhaseStart { name: "Alignment" });
    let total = particles.len();
    let tasks: Vec<SpaAlignTask> = split_batches(particles, queue.workers())
        .into_iter()
        .enumerate()
        .map(|(batch, particles)| SpaAlignTask {
            context: Arc::clone(&context),
            batch,
            particles,
        })
        .collect();
    let aligned = run_batches(queue, tasks, total, reporter, |r: &AlignmentRecord| {
        (r.id, r.score)
    })?;
    reporter.report(Progress::PhaseFinish);

    let mean = aligned.iter().map(|r| r.score).sum::<f64>() / aligned.len() as f64;
    info!(particles = aligned.len(), mean_score = mean, "Single-particle alignment complete.");
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::transform::{RigidTransform, XyzAngles};
    use crate::core::imaging::{GaussianModel, SyntheticStack};
    use crate::engine::config::SpaAlignConfigBuilder;
    use crate::engine::dispatch::InlineQueue;
    use nalgebra::Vector3;
    use std::sync::Mutex;

    fn truth(i: usize) -> RigidTransform {
        RigidTransform::from_xyz(
            XyzAngles {
                xtilt: 10.0 * i as f64,
                ytilt: 5.0,
                ztilt: -20.0,
            },
            Vector3::new(1.0, -1.0, 0.0),
        )
    }

    fn inputs(count: usize) -> (Vec<ParticleRecord>, ReferencePair<dyn Reference>, Arc<dyn ImageSource>) {
        let model = Arc::new(GaussianModel::random(32, 2.0, 10, 8.0, 1.8, 2).unwrap());
        let mut stack = SyntheticStack::new(Arc::clone(&model));
        let particles = (0..count)
            .map(|i| {
                stack.insert("stack", i, truth(i));
                ParticleRecord::new(i, "stack", i).with_prior(truth(i))
            })
            .collect();
        let reference: Arc<dyn Reference> = model;
        (particles, ReferencePair::shared(reference), Arc::new(stack))
    }

    fn config() -> SpaAlignConfig {
        SpaAlignConfigBuilder::new().local_refine(1).build().unwrap()
    }

    #[test]
    fn outputs_follow_the_input_order() {
        let (particles, references, source) = inputs(9);
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::ParticleAligned { id, .. } = event {
                events.lock().unwrap().push(id);
            }
        }));

        let aligned = run(particles, references, source, config(), &InlineQueue, &reporter).unwrap();

        assert_eq!(aligned.iter().map(|r| r.id).collect::<Vec<_>>(), (0..9).collect::<Vec<_>>());
        assert_eq!(events.lock().unwrap().len(), 9);
        for record in &aligned {
            assert!(record.projection.spin_distance(&truth(record.id)) < 2.0);
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn thread_pool_and_inline_runs_agree() {
        use crate::engine::dispatch::ThreadPoolQueue;

        let (particles, references, source) = inputs(8);
        let queue = ThreadPoolQueue::new(2).unwrap();

        let pooled = run(
            particles.clone(),
            references.clone(),
            Arc::clone(&source),
            config(),
            &queue,
            &ProgressReporter::new(),
        )
        .unwrap();
        let inline = run(particles, references, source, config(), &InlineQueue, &ProgressReporter::new())
            .unwrap();

        assert_eq!(pooled, inline);
    }

    #[test]
    fn a_particle_without_prior_fails_the_run() {
        let (mut particles, references, source) = inputs(5);
        particles[3].prior = None;

        let result = run(particles, references, source, config(), &InlineQueue, &ProgressReporter::new());

        assert!(matches!(result, Err(EngineError::MissingPrior { particle: 3 })));
    }

    #[test]
    fn empty_list_returns_no_records() {
        let (_, references, source) = inputs(0);

        let aligned = run(Vec::new(), references, source, config(), &InlineQueue, &ProgressReporter::new())
            .unwrap();

        assert!(aligned.is_empty());
    }
}
