//! blocks::traits — the block contract: lifecycle, application, adjoints.
//!
//! Purpose
//! -------
//! Define the two polymorphic block interfaces every covariance operator is
//! assembled from:
//! - [`CentralBlock`]: the terminal operator of a chain, carrying the core
//!   covariance structure (multiply + randomize).
//! - [`OuterBlock`]: an invertible change-of-variable/preconditioning
//!   operator, chainable ahead of a central block (multiply, adjoint,
//!   inverse, adjoint-of-inverse).
//!
//! Key behaviors
//! -------------
//! - Two-phase initialization made explicit: a block is constructed first and
//!   acquires its internal operator through exactly one of `read` (file) or
//!   `direct_calibration` (ensemble). [`BlockState`] records the transition;
//!   applying an operator before it is ready is a programming-contract
//!   violation and panics (not an `Err` — there is no recovery).
//! - Unsupported lifecycle operations fail with explicit "use X instead"
//!   guidance (see `blocks::errors`); the defaults here supply the generic
//!   guidance, concrete blocks override it with operator-specific advice.
//! - `Display` prints the block's symbolic name only — identification, no
//!   further contract.
//!
//! Invariants & assumptions
//! ------------------------
//! - A block's operator state is immutable after the transition to ready;
//!   `multiply`/`randomize` never mutate it, `read`/`direct_calibration` are
//!   never interleaved with applications. No locking under this discipline.
//! - Outer blocks must not change variable names or level counts across
//!   `multiply`; a chain's declared outer/inner variable contract holds
//!   end-to-end. Central blocks may terminate the representation.
//! - Adjoints are taken with respect to the discrete L2 inner product over
//!   all grid points × levels × ranks — the same product the consistency
//!   test harness reduces over.
use std::fmt;

use rand::RngCore;

use crate::blocks::errors::{BlockError, BlockResult};
use crate::config::{ReadConfig, WriteConfig};
use crate::ensemble::EnsembleLedger;
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;
use crate::spectral::geometry::SpectralGeometry;

/// Operator-state lifecycle of a block.
///
/// `Constructed → {Calibrated | Loaded}`; the ready phase is the union of
/// `Calibrated` and `Loaded` (operator installed and immutable thereafter;
/// the distinction records provenance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Constructed; no internal operator installed yet.
    Constructed,
    /// Operator estimated from an ensemble during this run.
    Calibrated,
    /// Operator loaded from a persisted file.
    Loaded,
}

impl BlockState {
    /// Whether `multiply`/`randomize` may be applied.
    pub fn is_ready(self) -> bool {
        !matches!(self, BlockState::Constructed)
    }
}

/// Panic on application before the block is ready.
///
/// # Panics
/// Always, when `state` is not ready. Calling an operator before its state
/// is installed is a programming-contract violation, fatal and not
/// recoverable.
pub fn require_ready(state: BlockState, block: &str, operation: &str) {
    assert!(
        state.is_ready(),
        "contract violation: '{operation}' called on block '{block}' before its operator was \
         calibrated or loaded"
    );
}

/// Everything a block constructor or `read` path may draw on.
pub struct BlockContext<'a> {
    /// Spectral geometry of the run (truncation, owned zonal wavenumbers).
    pub geometry: &'a SpectralGeometry,
    /// Variables available at the block's chain position.
    pub vars: &'a Variables,
    /// Collective communicator; reached identically by every rank.
    pub comm: &'a dyn Communicator,
    /// Member ledger feeding calibration-capable blocks.
    pub ensemble: &'a EnsembleLedger,
}

impl<'a> BlockContext<'a> {
    /// The same context with the variable contract replaced — used while a
    /// chain threads narrowing contracts through its outer blocks.
    pub fn with_vars<'b>(&'b self, vars: &'b Variables) -> BlockContext<'b>
    where
        'a: 'b,
    {
        BlockContext { geometry: self.geometry, vars, comm: self.comm, ensemble: self.ensemble }
    }
}

/// Terminal operator of a block chain.
pub trait CentralBlock: fmt::Display {
    /// Symbolic factory name.
    fn name(&self) -> &str;

    /// Lifecycle state; applications require `state().is_ready()`.
    fn state(&self) -> BlockState;

    /// In-place forward application of the operator.
    ///
    /// # Panics
    /// If the block is not ready (programming-contract violation).
    fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()>;

    /// Draw a sample with the operator's implied covariance.
    ///
    /// # Errors
    /// - [`BlockError::RandomizeNotSupported`] when the internal
    ///   representation has no square root; the guidance names the
    ///   substitute decomposition.
    ///
    /// # Panics
    /// If the block is not ready.
    fn randomize(&self, fset: &mut FieldSet, rng: &mut dyn RngCore) -> BlockResult<()>;

    /// Load the internal operator from a persisted file.
    fn read(&mut self, _cfg: &ReadConfig, _ctx: &BlockContext<'_>) -> BlockResult<()> {
        Err(BlockError::ReadNotSupported {
            block: self.name().to_string(),
            use_instead: "use an ensemble 'calibration' section instead".to_string(),
        })
    }

    /// Estimate the internal operator from ensemble members. Statistics are
    /// reduced across ranks inside the call; every rank must reach it.
    fn direct_calibration(
        &mut self, _members: &[FieldSet], _comm: &dyn Communicator,
    ) -> BlockResult<()> {
        Err(BlockError::CalibrationNotSupported {
            block: self.name().to_string(),
            use_instead: "use a 'read' section instead".to_string(),
        })
    }

    /// Persist the internal operator (root rank writes after gather-sum).
    fn write(&self, _cfg: &WriteConfig, _comm: &dyn Communicator) -> BlockResult<()> {
        Err(BlockError::WriteNotSupported { block: self.name().to_string() })
    }
}

impl fmt::Debug for dyn CentralBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CentralBlock").field("name", &self.name()).finish()
    }
}

/// Invertible change-of-variable operator, chainable ahead of a central
/// block.
pub trait OuterBlock: fmt::Display {
    /// Symbolic factory name.
    fn name(&self) -> &str;

    /// Lifecycle state; applications require `state().is_ready()`.
    fn state(&self) -> BlockState;

    /// Variables on the block's inner (central-facing) side. Identical to
    /// the outer contract unless the transform reshapes variables.
    fn inner_vars(&self) -> &Variables;

    /// In-place forward application; must preserve names and level counts.
    ///
    /// # Panics
    /// If the block is not ready.
    fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()>;

    /// Adjoint of `multiply` under the discrete L2 inner product.
    fn multiply_ad(&self, fset: &mut FieldSet) -> BlockResult<()>;

    /// Exact left inverse of `multiply`.
    ///
    /// # Errors
    /// - [`BlockError::InverseNotImplemented`] when the transform has no
    ///   closed form inverse and inversion was requested.
    fn inverse_multiply(&self, fset: &mut FieldSet) -> BlockResult<()>;

    /// Adjoint of `inverse_multiply`.
    fn inverse_multiply_ad(&self, fset: &mut FieldSet) -> BlockResult<()>;

    /// Propagate an already-randomized field through the transform.
    fn randomize(&self, fset: &mut FieldSet, _rng: &mut dyn RngCore) -> BlockResult<()> {
        self.multiply(fset)
    }

    /// Load the internal operator from a persisted file.
    fn read(&mut self, _cfg: &ReadConfig, _ctx: &BlockContext<'_>) -> BlockResult<()> {
        Err(BlockError::ReadNotSupported {
            block: self.name().to_string(),
            use_instead: "use an ensemble 'calibration' section instead".to_string(),
        })
    }

    /// Estimate the internal operator from ensemble members. Statistics are
    /// reduced across ranks inside the call; every rank must reach it.
    fn direct_calibration(
        &mut self, _members: &[FieldSet], _comm: &dyn Communicator,
    ) -> BlockResult<()> {
        Err(BlockError::CalibrationNotSupported {
            block: self.name().to_string(),
            use_instead: "use a 'read' section instead".to_string(),
        })
    }

    /// Persist the internal operator (root rank writes after gather-sum).
    fn write(&self, _cfg: &WriteConfig, _comm: &dyn Communicator) -> BlockResult<()> {
        Err(BlockError::WriteNotSupported { block: self.name().to_string() })
    }
}
