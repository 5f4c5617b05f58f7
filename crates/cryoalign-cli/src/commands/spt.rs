use super::{load_references, open_stack, print_score_summary, worker_pool};
use crate::cli::SptArgs;
use crate::config::build_spt_config;
use crate::data;
use crate::error::Result;
use crate::utils::progress::AlignmentProgress;
use cryoalign::engine::dispatch::InlineQueue;
use cryoalign::engine::progress::ProgressReporter;
use cryoalign::workflows;
use tracing::info;

pub fn run(args: SptArgs, threads: Option<usize>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_spt_config(&args)?;

    let particles = data::read_subtomograms(&app.input_path)?;
    let references = load_references(&app.data)?;
    let source = open_stack(&app.data)?;

    let progress = AlignmentProgress::new();
    let reporter = ProgressReporter::with_callback(progress.callback());

    let mode = if app.core_config.skip_align {
        "Scoring"
    } else if app.core_config.from_scratch {
        "Searching"
    } else {
        "Refining"
    };
    println!("{} {} sub-tomogram(s)...", mode, particles.len());
    info!("Invoking the sub-tomogram alignment workflow...");

    let aligned = if app.inline {
        workflows::spt::run(
            particles,
            references,
            source,
            app.core_config,
            &InlineQueue,
            &reporter,
        )?
    } else {
        let queue = worker_pool(threads)?;
        workflows::spt::run(
            particles,
            references,
            source,
            app.core_config,
            &queue,
            &reporter,
        )?
    };

    data::write_spt_alignments(&app.output_path, &app.subtilt_output_path, &aligned)?;

    println!(
        "✓ {} aligned sub-tomogram(s) written to: {}",
        aligned.len(),
        app.output_path.display()
    );
    println!(
        "  Sub-tilt alignments written to: {}",
        app.subtilt_output_path.display()
    );
    print_score_summary(&progress.tally());
    Ok(())
}
