//! # Particle Records
//!
//! Typed records exchanged between the caller and the alignment engine. The engine
//! reads [`particle`] records and produces [`result`] records; it never persists
//! either. Every field the engine touches is spelled out here, so a particle list
//! reader only has to fill these structs.
//!
//! - [`particle`] - SPA particles, sub-tomograms with their sub-tilt series, the
//!   even/odd half-set label and the shared reference pair
//! - [`result`] - Per-particle alignment output, including one record per sub-tilt

pub mod particle;
pub mod result;
