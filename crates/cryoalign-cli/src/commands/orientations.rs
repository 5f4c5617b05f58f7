use crate::cli::OrientationsArgs;
use crate::data;
use crate::error::{CliError, Result};
use cryoalign::core::geometry::symmetry::SymmetryGroup;
use cryoalign::engine::error::EngineError;
use tracing::info;

pub fn run(args: OrientationsArgs) -> Result<()> {
    if !(args.step.is_finite() && args.step > 0.0) {
        return Err(CliError::Argument(format!(
            "--step must be a positive number of degrees, got {}",
            args.step
        )));
    }
    let group = SymmetryGroup::parse(&args.symmetry).map_err(EngineError::from)?;
    let orientations = group.gen_orientations(args.step, args.mirror);
    info!(
        symmetry = %group.symmetry(),
        step = args.step,
        mirror = args.mirror,
        count = orientations.len(),
        "Sampled the asymmetric unit."
    );

    println!(
        "{} orientation(s) for {} at {}° ({})",
        orientations.len(),
        group.symmetry(),
        args.step,
        if args.mirror { "with mirror" } else { "no mirror" }
    );
    if let Some(path) = &args.output {
        data::write_orientations(path, &orientations)?;
        println!("✓ Orientations written to: {}", path.display());
    }
    Ok(())
}
