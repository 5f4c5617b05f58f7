//! # Imaging Contract
//!
//! The alignment engine never touches real-space pixels. It consumes references and
//! particles through the operations defined here, all of which act on Fourier-domain
//! buffers:
//!
//! - [`Reference`] projects (or rotates) a reference under a rigid transform at a
//!   requested working box size.
//! - [`ImageSource`] reads observed particles, already Fourier transformed.
//! - [`FourierImage`] and [`FourierVolume`] provide clipping, phase shifts, Fourier
//!   shell correlation and the periodic cross-correlation peak search.
//! - [`ctf`] derives the optional 1D amplitude weighting curve.
//!
//! [`GaussianModel`] and [`SyntheticStack`] are an analytic implementation of the
//! contract, used by the command-line benchmark and by the engine's tests.

pub mod ctf;
pub mod fourier;
pub mod model;
pub mod synthetic;
pub mod volume;

pub use fourier::{FourierImage, FscShell};
pub use model::GaussianModel;
pub use synthetic::SyntheticStack;
pub use volume::FourierVolume;

use crate::core::geometry::transform::RigidTransform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageSourceError {
    #[error("Source '{src}' has no image at index {idx}")]
    NotFound { src: String, idx: usize },

    #[error("Source '{src}' cannot provide {kind} data")]
    Unsupported { src: String, kind: &'static str },

    #[error("Failed to read '{src}' #{idx}: {reason}")]
    Read {
        src: String,
        idx: usize,
        reason: String,
    },
}

/// A read-only 3D reference shared by every particle of a batch.
pub trait Reference: Send + Sync {
    /// Edge length of the full-resolution reference, in pixels.
    fn box_size(&self) -> usize;

    /// Pixel size of the full-resolution reference, in Å.
    fn pixel_size(&self) -> f64;

    /// Projects the reference rotated and translated by `xf` along z.
    ///
    /// The translation of `xf` is in pixels of `box_size` and the result covers the
    /// frequencies representable at that box size.
    fn project(&self, xf: &RigidTransform, box_size: usize) -> FourierImage;

    /// The reference rotated and translated by `xf`, clipped to `box_size`.
    fn transformed_volume(&self, xf: &RigidTransform, box_size: usize) -> FourierVolume;
}

/// Provider of observed particle data keyed by `(src, idx)`.
pub trait ImageSource: Send + Sync {
    fn read_image(&self, src: &str, idx: usize) -> Result<FourierImage, ImageSourceError>;

    fn read_volume(&self, src: &str, idx: usize) -> Result<FourierVolume, ImageSourceError>;
}
