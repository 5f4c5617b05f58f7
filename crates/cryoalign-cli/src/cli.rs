use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "cryoalign CLI - Multi-resolution orientation and translation search for cryo-EM single-particle and sub-tomogram refinement.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of worker threads for particle batches.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Align single-particle projections against a 3D reference.
    Spa(SpaArgs),
    /// Align sub-tomograms and their sub-tilt series against a 3D reference.
    Spt(SptArgs),
    /// Render a synthetic particle set from a random Gaussian blob model.
    Simulate(SimulateArgs),
    /// List the orientations sampled over the asymmetric unit of a symmetry.
    Orientations(OrientationsArgs),
}

/// Reference and particle data shared by both alignment modes.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Path to the reference model (TOML). Used for both half sets unless
    /// `--reference-odd` is given.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub reference: PathBuf,

    /// Path to the odd half-set reference model for gold-standard refinement.
    #[arg(long, value_name = "PATH")]
    pub reference_odd: Option<PathBuf>,

    /// Path to the particle stack manifest (TOML).
    #[arg(long, required = true, value_name = "PATH")]
    pub stack: PathBuf,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run every batch on the calling thread instead of the worker pool.
    #[arg(long)]
    pub inline: bool,
}

/// Overrides shared by both alignment modes.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Override the point-group symmetry (c<n>, d<n>, tet, oct, icos).
    #[arg(long = "sym", value_name = "SYM")]
    pub symmetry: Option<String>,

    /// Override the angular step in degrees of the coarse orientation grid.
    #[arg(long, value_name = "DEG")]
    pub coarse_step: Option<f64>,

    /// Exclude mirrored orientations from the coarse grid.
    #[arg(long)]
    pub no_mirror: bool,

    /// Override the number of candidates kept after the first rung.
    #[arg(long, value_name = "INT")]
    pub initial_pool: Option<usize>,

    /// Override the highest resolution in Å the ladder climbs to.
    #[arg(long, value_name = "ANGSTROM")]
    pub max_res: Option<f64>,

    /// Override the lowest resolution in Å included in the score.
    #[arg(long, value_name = "ANGSTROM")]
    pub min_res: Option<f64>,

    /// Override the maximum Nelder-Mead iterations per candidate.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S search.initial-pool=16
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `spa` subcommand.
#[derive(Args, Debug)]
pub struct SpaArgs {
    // --- Core Arguments ---
    /// Path to the input particle list (CSV).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the aligned particle list (CSV).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub search: SearchArgs,

    // --- SPA Overrides ---
    /// Refine locally around each prior, starting this many rungs from the end.
    /// 0 searches globally.
    #[arg(short = 'l', long, value_name = "INT")]
    pub local_refine: Option<usize>,

    /// Override the maximum deviation in degrees from the prior.
    #[arg(long, value_name = "DEG")]
    pub max_angle: Option<f64>,

    /// Override the perturbation seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,
}

/// Arguments for the `spt` subcommand.
#[derive(Args, Debug)]
pub struct SptArgs {
    // --- Core Arguments ---
    /// Path to the input sub-tilt list (CSV, one row per sub-tilt).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the aligned sub-tomogram list (CSV).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path for the aligned sub-tilt list (CSV).
    #[arg(long, required = true, value_name = "PATH")]
    pub output_subtilts: PathBuf,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub search: SearchArgs,

    // --- SPT Overrides ---
    /// Search globally, ignoring the stored alignments.
    #[arg(long)]
    pub from_scratch: bool,

    /// Score the stored alignments without searching.
    #[arg(long, conflicts_with = "from_scratch")]
    pub skip_align: bool,

    /// Override the maximum translation in pixels of the full box.
    #[arg(long, value_name = "PIXELS")]
    pub max_shift: Option<usize>,

    /// Override the maximum deviation in degrees from the starting alignment.
    #[arg(long, value_name = "DEG")]
    pub max_angle: Option<f64>,

    /// Seed the local search with every symmetry mate of this symmetry.
    #[arg(long, value_name = "SYM")]
    pub break_sym: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    Spa,
    Spt,
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Which kind of particle set to render.
    #[arg(value_enum)]
    pub mode: SimulationMode,

    /// Directory receiving `model.toml`, `stack.toml` and `particles.csv`.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Number of particles (or sub-tomograms).
    #[arg(short = 'n', long, default_value_t = 16, value_name = "INT")]
    pub count: usize,

    /// Edge length of the model box in pixels.
    #[arg(long, default_value_t = 64, value_name = "PIXELS")]
    pub box_size: usize,

    /// Pixel size of the model in Å.
    #[arg(long, default_value_t = 2.0, value_name = "ANGSTROM")]
    pub pixel_size: f64,

    /// Number of Gaussian blobs in the model.
    #[arg(long, default_value_t = 24, value_name = "INT")]
    pub blobs: usize,

    /// Standard deviation of the complex noise added to every coefficient.
    #[arg(long, default_value_t = 0.0, value_name = "FLOAT")]
    pub noise: f64,

    /// Angular error in degrees applied to the written priors.
    #[arg(long, default_value_t = 3.0, value_name = "DEG")]
    pub prior_error: f64,

    /// Write the particle list without priors.
    #[arg(long)]
    pub no_prior: bool,

    /// Number of tilts per sub-tomogram (spt only).
    #[arg(long, default_value_t = 7, value_name = "INT")]
    pub tilts: usize,

    /// Angular step in degrees between tilts (spt only).
    #[arg(long, default_value_t = 15.0, value_name = "DEG")]
    pub tilt_step: f64,

    /// Seed for the model, the truths and the noise.
    #[arg(long, default_value_t = 0, value_name = "INT")]
    pub seed: u64,
}

/// Arguments for the `orientations` subcommand.
#[derive(Args, Debug)]
pub struct OrientationsArgs {
    /// Point-group symmetry (c<n>, d<n>, tet, oct, icos).
    #[arg(long = "sym", default_value = "c1", value_name = "SYM")]
    pub symmetry: String,

    /// Angular step in degrees.
    #[arg(long, default_value_t = 7.4, value_name = "DEG")]
    pub step: f64,

    /// Include mirrored orientations.
    #[arg(long)]
    pub mirror: bool,

    /// Write the orientations to a CSV file instead of only counting them.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
