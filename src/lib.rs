//! rust_covariance — background-error covariance operators for data
//! assimilation.
//!
//! Purpose
//! -------
//! Build, calibrate, and apply the background-error covariance operators
//! ("B matrices") of a data-assimilation toolkit over field sets on
//! spectral geophysical grids. The core is a composable block-chain engine:
//! central covariance blocks, invertible outer change-of-variable blocks,
//! their composition into chains, and hybrid weighting of multiple chains —
//! all behind one multiply / inverse-multiply / adjoint / randomize
//! contract, with ensemble-based statistical calibration populating each
//! block's internal operator.
//!
//! Key behaviors
//! -------------
//! - Declarative assembly: a configuration tree ([`config`]) names blocks
//!   symbolically; an explicit factory registry
//!   ([`blocks::BlockRegistry`]) resolves names to constructors, and
//!   [`covariance::ErrorCovariance::assemble`] builds the whole operator
//!   bottom-up, driving per-block calibration (ensemble) or read (file)
//!   paths and the configured consistency gates.
//! - Chain composition ([`chains`]): outer blocks apply outer-to-inner,
//!   adjoints in reverse; a component covariance is the self-adjoint
//!   sandwich outer → central → outer-adjoint.
//! - Hybrid combination ([`covariance`]): `Σᵢ (Sᵢ√wᵢ) Cᵢ (Sᵢ√wᵢ)ᵗ` with
//!   pre-square-rooted scalar and per-field weights, randomization through
//!   component square roots, and an iterative GMRESR inverse ([`solver`]).
//! - Statistical calibration ([`spectral`]): per-total-wavenumber vertical
//!   covariance estimation from ensembles, correlation derivation via
//!   standard-deviation normalization, and a self-describing persisted
//!   operator format written by the root rank after cross-rank reduction.
//!
//! Invariants & assumptions
//! ------------------------
//! - Field sets travel by value through chains; blocks agree on the
//!   variable-name/level contract at every chain boundary, and missing
//!   fields are reported in aggregate.
//! - Block operator state is immutable after calibration/read; applying a
//!   block before that transition is a programming-contract violation and
//!   panics.
//! - All cross-rank coupling goes through [`parallel::Communicator`]
//!   collectives, invoked identically on every rank; file writes are
//!   root-gated.
//! - Every error category is fatal and surfaced at assembly time where
//!   possible: an uncaught inconsistency in a covariance operator silently
//!   corrupts downstream statistics, so this crate fails fast over partial
//!   results.
//!
//! Downstream usage
//! ----------------
//! - Typical flow:
//!   1. Describe the covariance as JSON and parse it with
//!      [`config::CovarianceConfig::from_json_str`].
//!   2. Feed ensemble members into an [`ensemble::EnsembleLedger`]
//!      (`add_member`, tagged ensemble 1 or 2).
//!   3. Assemble via [`covariance::ErrorCovariance::assemble`] with a
//!      [`blocks::BlockRegistry`] (defaults or extended with project
//!      blocks), a [`spectral::SpectralGeometry`], and a communicator.
//!   4. Apply `multiply` / `randomize` / `inverse_multiply` once per
//!      analysis or training iteration.
//! - Numerical kernels do no I/O and no logging; assembly and persistence
//!   emit sparse `log` diagnostics for the embedding application to route.

pub mod blocks;
pub mod chains;
pub mod config;
pub mod covariance;
pub mod ensemble;
pub mod fields;
pub mod parallel;
pub mod solver;
pub mod spectral;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::blocks::{
    BlockContext, BlockError, BlockRegistry, BlockResult, BlockState, CentralBlock, OuterBlock,
};
pub use self::chains::{BlockChain, OuterChain};
pub use self::config::{CovarianceConfig, HYBRID_BLOCK_NAME};
pub use self::covariance::ErrorCovariance;
pub use self::ensemble::{EnsembleId, EnsembleLedger};
pub use self::fields::{FieldSet, Variables};
pub use self::parallel::{Communicator, SerialComm};
pub use self::spectral::SpectralGeometry;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_covariance::prelude::*;
//
// to import the main covariance surface in a single line.

pub mod prelude {
    pub use super::blocks::{
        BlockContext, BlockError, BlockRegistry, BlockResult, BlockState, CentralBlock,
        OuterBlock,
    };
    pub use super::chains::{BlockChain, OuterChain};
    pub use super::config::{CovarianceConfig, HYBRID_BLOCK_NAME};
    pub use super::covariance::ErrorCovariance;
    pub use super::ensemble::{EnsembleId, EnsembleLedger};
    pub use super::fields::{FieldSet, Variables};
    pub use super::parallel::{Communicator, SerialComm};
    pub use super::spectral::SpectralGeometry;
}
