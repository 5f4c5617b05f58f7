//! # Workflows Module
//!
//! This module provides the top-level entry points of the library: align a whole
//! particle list against a reference pair and get one record per particle back.
//!
//! ## Overview
//!
//! A workflow validates its inputs, prepares the context shared by every particle
//! (resolution ladder, sampled orientations, symmetry groups), splits the particle
//! list into batches, submits them to a [`TaskQueue`] and waits for the results in
//! submission order. Outputs are merged back into the order of the input list.
//!
//! ## Architecture
//!
//! - **Single-particle workflow** ([`spa`]) - 2D projections with optional CTF weights,
//!   global search or local refinement around a prior.
//! - **Sub-tomogram workflow** ([`spt`]) - 3D alignment of sub-tilt series, from scratch
//!   or around an existing alignment, producing 3D and per-tilt 2D records.
//!
//! The first failing batch aborts the workflow with its error; nothing is retried.

pub mod spa;
pub mod spt;

use crate::engine::dispatch::{AlignTask, TaskHandle, TaskQueue, merge_in_order};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info};

/// Submits every batch, then waits on them in submission order.
fn run_batches<Q, T, O>(
    queue: &Q,
    tasks: Vec<T>,
    total_particles: usize,
    reporter: &ProgressReporter,
    summary: impl Fn(&O) -> (usize, f64),
) -> Result<Vec<O>, EngineError>
where
    Q: TaskQueue,
    T: AlignTask<Output = Vec<(usize, O)>>,
{
    info!(
        batches = tasks.len(),
        workers = queue.workers(),
        "Dispatching alignment batches"
    );
    let handles: Vec<TaskHandle<T::Output>> = tasks.into_iter().map(|t| queue.submit(t)).collect();

    reporter.report(Progress::TaskStart {
        total_steps: total_particles as u64,
    });
    let mut batches = Vec::with_capacity(handles.len());
    for handle in handles {
        let task = handle.task().to_string();
        let outputs = handle.wait()?;
        debug!(task = %task, particles = outputs.len(), "Batch finished");
        for (_, output) in &outputs {
            let (id, score) = summary(output);
            reporter.report(Progress::ParticleAligned { id, score });
            reporter.report(Progress::TaskIncrement);
        }
        batches.push(outputs);
    }
    reporter.report(Progress::TaskFinish);

    Ok(merge_in_order(batches))
}
