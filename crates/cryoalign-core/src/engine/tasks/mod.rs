//! Per-particle alignment tasks.
//!
//! Each submodule pairs a [`RungAligner`](super::controller::RungAligner) for one
//! alignment mode with the code that plans a particle's ladder walk, runs it and
//! turns the survivors into output records. The batch task types wrap a slice of a
//! particle list so it can be handed to a [`TaskQueue`](super::dispatch::TaskQueue).

pub mod spa_align;
pub mod spt_align;

use super::progress::{Progress, ProgressReporter};

/// Reports a finished particle and advances the batch's progress.
fn report_particle(reporter: &ProgressReporter, id: usize, score: f64) {
    reporter.report(Progress::ParticleAligned { id, score });
    reporter.report(Progress::TaskIncrement);
}
