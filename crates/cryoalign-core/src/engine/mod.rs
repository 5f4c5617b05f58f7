//! # Engine Module
//!
//! This module implements the coarse-to-fine orientation and translation search that
//! aligns single-particle projections and sub-tilt series against a 3D reference.
//!
//! ## Overview
//!
//! A particle starts either from a grid of sampled orientations or from its prior.
//! The candidates are scored by Fourier shell correlation at a small box, refined by a
//! Nelder-Mead simplex, pruned to a shrinking pool of well separated survivors, and
//! carried to the next, larger box until the requested resolution is reached.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Validated SPA/SPT search parameters and their builders
//! - **Resolution Ladder** ([`ladder`]) - Working box sizes and per-rung search parameters
//! - **Scoring** ([`scoring`]) - Projection, sub-tilt and volume FSC scorers
//! - **Optimization** ([`optimizer`]) - Nelder-Mead minimizer and search bounds
//! - **Pruning** ([`pruner`], [`candidate`]) - Candidate ranking and survivor selection
//! - **Start Policies** ([`sampling`]) - Perturbed priors and symmetry-mate seeds
//! - **Controller** ([`controller`]) - The per-particle ladder walk
//! - **Tasks** ([`tasks`]) - SPA and SPT aligners and their batch tasks
//! - **Dispatch** ([`dispatch`]) - Submit/poll/wait task queues and batching
//! - **Progress Monitoring** ([`progress`]) - Progress events for callers
//! - **Error Handling** ([`error`]) - Engine error type
//!
//! ## Key Capabilities
//!
//! - **Symmetry-aware sampling** of the asymmetric unit for cold starts
//! - **CTF-weighted scoring** with a uniform fallback when weights cannot be derived
//! - **Parallel refinement** of the candidates within a rung (`parallel` feature)
//! - **Deterministic perturbations** seeded per particle, so reruns reproduce

pub mod candidate;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod ladder;
pub mod optimizer;
pub mod progress;
pub mod pruner;
pub mod sampling;
pub mod scoring;
pub mod tasks;
