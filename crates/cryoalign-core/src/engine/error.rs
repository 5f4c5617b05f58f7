use thiserror::Error;

use super::config::ConfigError;
use super::dispatch::DispatchError;
use super::sampling::SamplingError;
use crate::core::geometry::symmetry::SymmetryError;
use crate::core::imaging::ImageSourceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Symmetry error: {source}")]
    Symmetry {
        #[from]
        source: SymmetryError,
    },

    #[error("Failed to read particle data: {source}")]
    ImageSource {
        #[from]
        source: ImageSourceError,
    },

    #[error("Particle {particle} has no prior orientation but local refinement needs one")]
    MissingPrior { particle: usize },

    #[error("Candidate pool for particle {particle} is empty after rung {rung}")]
    EmptyPool { particle: usize, rung: usize },

    #[error("Task dispatch failed: {source}")]
    Dispatch {
        #[from]
        source: DispatchError,
    },

    #[error("Start sampling failed: {source}")]
    Sampling {
        #[from]
        source: SamplingError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
