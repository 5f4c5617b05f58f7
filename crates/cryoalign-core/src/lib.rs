//! # cryoalign Core Library
//!
//! Multi-resolution orientation and translation search for cryo-EM single-particle
//! analysis (SPA) and sub-tomogram averaging (SPT) refinement.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture to keep the numerical core
//! separate from the imaging collaborator and from job dispatch.
//!
//! - **[`core`]: The Foundation.** Stateless value types: rigid transforms and symmetry
//!   groups (`geometry`), the imaging contract with its Fourier-domain buffers
//!   (`imaging`), and typed particle records (`models`).
//!
//! - **[`engine`]: The Logic Core.** The coarse-to-fine search itself: the resolution
//!   ladder, the FSC scorer, the Nelder-Mead optimizer, the candidate pruner, the
//!   ladder controller that drives them, and the per-particle alignment tasks together
//!   with the task-queue abstraction they are dispatched through.
//!
//! - **[`workflows`]: The Public API.** Entry points that take a particle list and a
//!   reference pair, split the list into batches, run them on a task queue, and return
//!   one alignment record per particle in input order.

pub mod core;
pub mod engine;
pub mod workflows;
