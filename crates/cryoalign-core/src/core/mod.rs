//! # Core Module
//!
//! This module provides the fundamental value types used by the alignment engine.
//! Nothing in here carries state across particles; every type is either an immutable
//! value or a buffer owned by exactly one caller.
//!
//! ## Architecture
//!
//! - **Geometry** ([`geometry`]) - Rigid transforms, Euler conventions, spin distance,
//!   point-group symmetries and the orientation sampler
//! - **Imaging** ([`imaging`]) - The contract consumed from the imaging collaborator:
//!   Fourier-domain images and volumes, Fourier shell correlation, cross-correlation
//!   peak search, CTF envelopes, and a Gaussian blob reference that implements it
//! - **Records** ([`models`]) - Typed particle records read by the engine and the
//!   alignment records it produces
//!
//! ## Conventions
//!
//! - Angles are in degrees at every public boundary.
//! - Translations are in pixels of whatever box size the caller is working at; a
//!   transform moving between box sizes must be rescaled explicitly.
//! - Fourier-domain buffers store the Hermitian half plane (or half volume) with the
//!   origin at frequency index zero.

pub mod geometry;
pub mod imaging;
pub mod models;
