mod builder;
mod defaults;
mod file;
mod models;

pub use builder::{build_spa_config, build_spt_config};
pub use models::DataPaths;
