//! Errors for covariance blocks, chains, and their assembly.
//!
//! Taxonomy (all fatal; nothing is silently recovered):
//! - *Configuration errors* — unknown/duplicate registry names, missing
//!   required ensemble or file — surface at assembly time, never deferred.
//! - *Unsupported-operation errors* — carry explicit "use X instead"
//!   guidance for the operator.
//! - *Consistency-test failures* — adjoint/inverse tests are correctness
//!   gates; a run must not proceed with an unverified operator.
//! - Wrapped errors from the field, ensemble, spectral, config, and solver
//!   layers convert via `From` so chain assembly reads as plain `?` code.
use crate::config::ConfigError;
use crate::ensemble::EnsembleError;
use crate::fields::FieldError;
use crate::solver::SolverError;
use crate::spectral::errors::SpectralError;

/// Result alias for block operations that may produce [`BlockError`].
pub type BlockResult<T> = Result<T, BlockError>;

/// Which registry a block name was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Central,
    Outer,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::Central => write!(f, "central"),
            BlockKind::Outer => write!(f, "outer"),
        }
    }
}

/// Unified error type for the block/chain layer.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockError {
    // ---- Factory registry ----
    /// The name is already registered; registration is idempotent-checked.
    DuplicateBlockName { name: String, kind: BlockKind },

    /// No constructor is registered under this name.
    UnknownBlockName { name: String, kind: BlockKind },

    /// "Hybrid" is reserved for the combination path and never reaches the
    /// registry.
    ReservedBlockName { name: String },

    // ---- Unsupported operations ----
    /// The block's representation cannot be sampled directly.
    RandomizeNotSupported { block: String, use_instead: String },

    /// The block cannot estimate its operator from an ensemble.
    CalibrationNotSupported { block: String, use_instead: String },

    /// The block cannot load its operator from a file.
    ReadNotSupported { block: String, use_instead: String },

    /// The block has no persistent operator state.
    WriteNotSupported { block: String },

    /// The transform has no closed-form inverse but inversion was requested.
    InverseNotImplemented { block: String },

    // ---- Calibration ----
    /// Calibration needs at least `required` ensemble members.
    EnsembleTooSmall { block: String, required: usize, actual: usize },

    /// A calibrated scaling must be strictly positive to stay invertible.
    NonPositiveStdDev { block: String, variable: String, row: usize, level: usize, value: f64 },

    // ---- Consistency gates ----
    /// `|⟨Ax,y⟩ − ⟨Ay,x⟩| / |½(⟨Ax,y⟩+⟨Ay,x⟩)|` exceeded the tolerance.
    AdjointTestFailed { block: String, dp1: f64, dp2: f64, tolerance: f64 },

    /// `inverse_multiply(multiply(x))` strayed from `x` beyond the tolerance.
    InverseTestFailed { block: String, error: f64, tolerance: f64 },

    // ---- Wrapped lower layers ----
    Config(ConfigError),
    Field(FieldError),
    Ensemble(EnsembleError),
    Spectral(SpectralError),
    Solver(SolverError),
}

impl std::error::Error for BlockError {}

impl std::fmt::Display for BlockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockError::DuplicateBlockName { name, kind } => {
                write!(f, "'{name}' is already registered as a {kind} block.")
            }
            BlockError::UnknownBlockName { name, kind } => {
                write!(f, "'{name}' is not a registered {kind} block.")
            }
            BlockError::ReservedBlockName { name } => {
                write!(
                    f,
                    "'{name}' is reserved for hybrid combination and cannot be registered or \
                     assembled as an ordinary block."
                )
            }
            BlockError::RandomizeNotSupported { block, use_instead } => {
                write!(f, "Randomization with block '{block}' is not supported; {use_instead}.")
            }
            BlockError::CalibrationNotSupported { block, use_instead } => {
                write!(
                    f,
                    "Direct calibration with block '{block}' is not supported; {use_instead}."
                )
            }
            BlockError::ReadNotSupported { block, use_instead } => {
                write!(f, "Block '{block}' cannot read operator state; {use_instead}.")
            }
            BlockError::WriteNotSupported { block } => {
                write!(f, "Block '{block}' has no persistent operator state to write.")
            }
            BlockError::InverseNotImplemented { block } => {
                write!(
                    f,
                    "Block '{block}' has no closed-form inverse but inversion was requested."
                )
            }
            BlockError::EnsembleTooSmall { block, required, actual } => {
                write!(
                    f,
                    "Block '{block}' requires at least {required} ensemble members for \
                     calibration; got {actual}."
                )
            }
            BlockError::NonPositiveStdDev { block, variable, row, level, value } => {
                write!(
                    f,
                    "Block '{block}': calibrated standard deviation for '{variable}' at row \
                     {row}, level {level} must be > 0; got {value}."
                )
            }
            BlockError::AdjointTestFailed { block, dp1, dp2, tolerance } => {
                write!(
                    f,
                    "Adjoint test failure for block '{block}': y^t(Ax) = {dp1}, x^t(Ay) = \
                     {dp2}, tolerance = {tolerance}."
                )
            }
            BlockError::InverseTestFailed { block, error, tolerance } => {
                write!(
                    f,
                    "Inverse test failure for block '{block}': relative error {error} exceeds \
                     tolerance {tolerance}."
                )
            }
            BlockError::Config(e) => write!(f, "{e}"),
            BlockError::Field(e) => write!(f, "{e}"),
            BlockError::Ensemble(e) => write!(f, "{e}"),
            BlockError::Spectral(e) => write!(f, "{e}"),
            BlockError::Solver(e) => write!(f, "{e}"),
        }
    }
}

impl From<ConfigError> for BlockError {
    fn from(e: ConfigError) -> Self {
        BlockError::Config(e)
    }
}

impl From<FieldError> for BlockError {
    fn from(e: FieldError) -> Self {
        BlockError::Field(e)
    }
}

impl From<EnsembleError> for BlockError {
    fn from(e: EnsembleError) -> Self {
        BlockError::Ensemble(e)
    }
}

impl From<SpectralError> for BlockError {
    fn from(e: SpectralError) -> Self {
        BlockError::Spectral(e)
    }
}

impl From<SolverError> for BlockError {
    fn from(e: SolverError) -> Self {
        BlockError::Solver(e)
    }
}
