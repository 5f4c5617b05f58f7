//! Rigid-body geometry: transforms, Euler conventions and symmetry groups.

pub mod symmetry;
pub mod transform;
