//! # DESO Core Library
//!
//! A district-energy-system design optimizer: given a neighbourhood of
//! buildings with known demand profiles and local energy potentials, it
//! searches for near-pareto-optimal combinations of thermal-network layouts
//! and supply-system designs.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (energy carriers, flows, potentials, buildings), the technology catalog
//!   with its pure conversion and cost models, and I/O utilities.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates the
//!   optimization process. It includes the connectivity genotype and its
//!   genetic operators, thermal-network graph construction and overlap
//!   handling, supply-system structuring and evaluation, non-dominated
//!   sorting, and cross-batch result consolidation.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level,
//!   user-facing layer. It ties the `engine` and `core` together to execute
//!   the complete two-level optimization of a domain. It provides a simple
//!   and powerful entry point for end-users of the library.

pub mod core;
pub mod engine;
pub mod workflows;
