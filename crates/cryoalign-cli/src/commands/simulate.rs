use crate::cli::{SimulateArgs, SimulationMode};
use crate::data::{self, StackManifest};
use crate::error::{CliError, Result};
use cryoalign::core::geometry::transform::RigidTransform;
use cryoalign::core::imaging::GaussianModel;
use cryoalign::core::models::particle::{ParticleRecord, SubtiltRecord, SubtomogramRecord};
use rand::prelude::*;
use std::fs;
use tracing::info;

const MODEL_FILE: &str = "model.toml";
const STACK_FILE: &str = "stack.toml";
const PARTICLES_FILE: &str = "particles.csv";
const MAX_TRUE_SHIFT: f64 = 2.0;

/// A uniformly distributed orientation with a small random shift.
fn random_truth(rng: &mut StdRng, shift_z: bool) -> RigidTransform {
    let alt = rng.gen_range(-1.0f64..=1.0).acos().to_degrees();
    let az = rng.gen_range(0.0..360.0);
    let phi = rng.gen_range(0.0..360.0);
    let mut shift = || rng.gen_range(-MAX_TRUE_SHIFT..=MAX_TRUE_SHIFT);
    let (tx, ty) = (shift(), shift());
    let tz = if shift_z { shift() } else { 0.0 };
    RigidTransform::from_eman_params(&[tx, ty, tz, alt, az, phi])
}

/// Rotates `truth` by exactly `error` degrees about a random in-plane axis.
fn perturbed(rng: &mut StdRng, truth: &RigidTransform, error: f64) -> RigidTransform {
    let axis = rng.gen_range(0.0..360.0);
    truth.compose(&RigidTransform::from_eman_params(&[0.0, 0.0, 0.0, error, -axis, axis]))
}

/// Rotation by `angle` degrees about the y axis.
fn tilt(angle: f64) -> RigidTransform {
    RigidTransform::from_eman_params(&[0.0, 0.0, 0.0, angle, -90.0, 90.0])
}

pub fn run(args: SimulateArgs) -> Result<()> {
    if args.count == 0 {
        return Err(CliError::Argument("--count must be at least 1".to_string()));
    }
    if args.mode == SimulationMode::Spt && args.tilts == 0 {
        return Err(CliError::Argument("--tilts must be at least 1".to_string()));
    }
    fs::create_dir_all(&args.output_dir)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let radius = args.box_size as f64 * 0.25;
    let sigma = (args.box_size as f64 / 24.0).max(1.5);
    let model = GaussianModel::random(
        args.box_size,
        args.pixel_size,
        args.blobs,
        radius,
        sigma,
        rng.r#gen(),
    )?;
    model.save(&args.output_dir.join(MODEL_FILE))?;
    info!(
        blobs = args.blobs,
        box_size = args.box_size,
        "Wrote random reference model."
    );

    let mut manifest = StackManifest::new(MODEL_FILE);
    manifest.noise_sigma = args.noise;
    manifest.seed = args.seed;
    let particles_path = args.output_dir.join(PARTICLES_FILE);

    match args.mode {
        SimulationMode::Spa => {
            let records: Vec<ParticleRecord> = (0..args.count)
                .map(|i| {
                    let truth = random_truth(&mut rng, false);
                    manifest.push("particles", i, &truth);
                    let record = ParticleRecord::new(i, "particles", i);
                    if args.no_prior {
                        record
                    } else {
                        record.with_prior(perturbed(&mut rng, &truth, args.prior_error))
                    }
                })
                .collect();
            data::write_spa_particles(&particles_path, &records)?;
        }
        SimulationMode::Spt => {
            let half_span = (args.tilts - 1) as f64 / 2.0;
            let angles: Vec<f64> = (0..args.tilts)
                .map(|t| (t as f64 - half_span) * args.tilt_step)
                .collect();
            manifest.missing_wedge = Some(half_span * args.tilt_step.abs());

            let records: Vec<SubtomogramRecord> = (0..args.count)
                .map(|i| {
                    let truth = random_truth(&mut rng, true);
                    manifest.push("subtomograms", i, &truth);
                    let subtilts = angles
                        .iter()
                        .enumerate()
                        .map(|(t, angle)| {
                            let idx = i * angles.len() + t;
                            manifest.push("subtilts", idx, &tilt(*angle).compose(&truth));
                            SubtiltRecord {
                                src: "subtilts".to_string(),
                                idx,
                                projection: tilt(*angle),
                                tilt_id: t,
                            }
                        })
                        .collect();
                    let align3d = (!args.no_prior)
                        .then(|| perturbed(&mut rng, &truth, args.prior_error).inverse());
                    SubtomogramRecord {
                        id: i,
                        src: "subtomograms".to_string(),
                        idx: i,
                        align3d,
                        orig_idx: Some(i),
                        subtilts,
                    }
                })
                .collect();
            data::write_subtomograms(&particles_path, &records)?;
        }
    }
    manifest.save(&args.output_dir.join(STACK_FILE))?;

    println!(
        "✓ {} synthetic {} particle(s) written to: {}",
        args.count,
        match args.mode {
            SimulationMode::Spa => "single-particle",
            SimulationMode::Spt => "sub-tomogram",
        },
        args.output_dir.display()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_args(mode: SimulationMode, dir: &std::path::Path, count: usize) -> SimulateArgs {
    SimulateArgs {
        mode,
        output_dir: dir.to_path_buf(),
        count,
        box_size: 32,
        pixel_size: 2.0,
        blobs: 10,
        noise: 0.0,
        prior_error: 2.0,
        no_prior: false,
        tilts: 5,
        tilt_step: 15.0,
        seed: 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilt_rotates_about_the_y_axis() {
        let angles = tilt(30.0).eman_angles();
        let expected = RigidTransform::from_eman_params(&[0.0, 0.0, 0.0, 30.0, -90.0, 90.0]);

        assert!((tilt(30.0).rotation_angle() - 30.0).abs() < 1e-6);
        assert!(tilt(30.0).approx_eq(&expected, 1e-3, 1e-9));
        assert!((angles.alt - 30.0).abs() < 1e-6);
        let axis = tilt(30.0).rotation().axis().unwrap();
        assert!((axis.y.abs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn perturbation_moves_the_prior_by_the_requested_angle() {
        let mut rng = StdRng::seed_from_u64(5);
        let truth = random_truth(&mut rng, true);

        let prior = perturbed(&mut rng, &truth, 4.0);

        assert!((prior.spin_distance(&truth) - 4.0).abs() < 1e-3);
        assert_eq!(prior.translation(), truth.translation());
    }

    #[test]
    fn writes_an_spa_set() {
        let dir = tempfile::tempdir().unwrap();

        run(test_args(SimulationMode::Spa, dir.path(), 4)).unwrap();

        let particles = data::read_spa_particles(&dir.path().join(PARTICLES_FILE)).unwrap();
        let stack_path = dir.path().join(STACK_FILE);
        let stack = StackManifest::load(&stack_path).unwrap().open(&stack_path).unwrap();
        assert_eq!(particles.len(), 4);
        assert_eq!(stack.len(), 4);
        for particle in &particles {
            let truth = stack.truth("particles", particle.idx).unwrap();
            let prior = particle.prior.unwrap();
            assert!((prior.spin_distance(truth) - 2.0).abs() < 1e-2);
        }
    }

    #[test]
    fn writes_an_spt_set_with_a_missing_wedge() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = test_args(SimulationMode::Spt, dir.path(), 2);
        args.no_prior = true;

        run(args).unwrap();

        let records = data::read_subtomograms(&dir.path().join(PARTICLES_FILE)).unwrap();
        let manifest = StackManifest::load(&dir.path().join(STACK_FILE)).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.subtilts.len() == 5 && r.align3d.is_none()));
        assert_eq!(manifest.images.len(), 2 + 2 * 5);
        assert_eq!(manifest.missing_wedge, Some(30.0));
    }

    #[test]
    fn zero_particles_is_an_argument_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = run(test_args(SimulationMode::Spa, dir.path(), 0));

        assert!(matches!(result, Err(CliError::Argument(_))));
    }
}
