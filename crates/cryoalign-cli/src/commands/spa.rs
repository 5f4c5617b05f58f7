use super::{load_references, open_stack, print_score_summary, worker_pool};
use crate::cli::SpaArgs;
use crate::config::build_spa_config;
use crate::data;
use crate::error::Result;
use crate::utils::progress::AlignmentProgress;
use cryoalign::engine::dispatch::InlineQueue;
use cryoalign::engine::progress::ProgressReporter;
use cryoalign::workflows;
use tracing::{info, warn};

pub fn run(args: SpaArgs, threads: Option<usize>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_spa_config(&args)?;

    let particles = data::read_spa_particles(&app.input_path)?;
    let references = load_references(&app.data)?;
    let source = open_stack(&app.data)?;

    let progress = AlignmentProgress::new();
    let reporter = ProgressReporter::with_callback(progress.callback());

    println!("Aligning {} particle(s)...", particles.len());
    info!("Invoking the single-particle alignment workflow...");

    let aligned = if app.inline {
        workflows::spa::run(
            particles,
            references,
            source,
            app.core_config,
            &InlineQueue,
            &reporter,
        )?
    } else {
        let queue = worker_pool(threads)?;
        workflows::spa::run(
            particles,
            references,
            source,
            app.core_config,
            &queue,
            &reporter,
        )?
    };

    if aligned.is_empty() {
        warn!("The particle list was empty; writing an empty output list.");
    }
    data::write_alignments(&app.output_path, &aligned)?;

    println!(
        "✓ {} aligned particle(s) written to: {}",
        aligned.len(),
        app.output_path.display()
    );
    print_score_summary(&progress.tally());
    Ok(())
}
