use super::run_batches;
use crate::core::imaging::{ImageSource, Reference};
use crate::core::models::particle::{ReferencePair, SubtomogramRecord};
use crate::core::models::result::SptAlignment;
use crate::engine::config::SptAlignConfig;
use crate::engine::dispatch::{TaskQueue, split_batches};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::tasks::spt_align::{SptAlignContext, SptAlignTask};
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(skip_all, name = "spt_workflow", fields(particles = particles.len()))]
pub fn run<Q: TaskQueue>(
    particles: Vec<SubtomogramRecord>,
    references: ReferencePair<dyn Reference>,
    source: Arc<dyn ImageSource>,
    config: SptAlignConfig,
    queue: &Q,
    reporter: &ProgressReporter,
) -> Result<Vec<SptAlignment>, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let context = Arc::new(SptAlignContext::new(references, source, config)?);
    reporter.report(Progress::PhaseFinish);

    if particles.is_empty() {
        info!("Particle list is empty, nothing to align.");
        return Ok(Vec::new());
    }

    reporter.report(Progress::PhaseStart { name: "Alignment" });
    let total = particles.len();
    let tasks: Vec<SptAlignTask> = split_batches(particles, queue.workers())
        .into_iter()
        .enumerate()
        .map(|(batch, particles)| SptAlignTask {
            context: Arc::clone(&context),
            batch,
            particles,
        })
        .collect();
    let aligned = run_batches(queue, tasks, total, reporter, |a: &SptAlignment| {
        (a.volume.id, a.volume.score)
    })?;
    reporter.report(Progress::PhaseFinish);

    let subtilts: usize = aligned.iter().map(|a| a.subtilts.len()).sum();
    info!(
        particles = aligned.len(),
        subtilts, "Sub-tomogram alignment complete."
    );
    Ok(aligned)
}
