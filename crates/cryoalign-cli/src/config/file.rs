use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSearchConfig {
    pub symmetry: Option<String>,
    pub coarse_step: Option<f64>,
    pub include_mirror: Option<bool>,
    pub initial_pool: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSpaConfig {
    pub local_refine: Option<usize>,
    pub max_angle: Option<f64>,
    pub perturbation_spread: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSptConfig {
    pub from_scratch: Option<bool>,
    pub skip_align: Option<bool>,
    pub max_shift: Option<usize>,
    pub max_angle: Option<f64>,
    pub break_symmetry: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileResolutionConfig {
    pub max_resolution: Option<f64>,
    pub min_resolution: Option<f64>,
    pub min_res_pixels: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOptimizerConfig {
    pub max_iterations: Option<usize>,
    pub f_tolerance: Option<f64>,
    pub x_tolerance: Option<f64>,
}

/// The partial configuration read from a TOML file. Every field may be left out;
/// missing values fall back to the command line or the defaults.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub search: Option<FileSearchConfig>,
    pub spa: Option<FileSpaConfig>,
    pub spt: Option<FileSptConfig>,
    pub resolution: Option<FileResolutionConfig>,
    pub optimizer: Option<FileOptimizerConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading configuration file from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
