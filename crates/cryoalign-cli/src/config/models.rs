use cryoalign::engine::config as core_config;
use std::path::PathBuf;

/// Where the references and the particle stack are read from.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub reference: PathBuf,
    pub reference_odd: Option<PathBuf>,
    pub stack: PathBuf,
}

pub struct SpaAppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub data: DataPaths,
    pub inline: bool,
    pub core_config: core_config::SpaAlignConfig,
}

pub struct SptAppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub subtilt_output_path: PathBuf,
    pub data: DataPaths,
    pub inline: bool,
    pub core_config: core_config::SptAlignConfig,
}
