//! Errors for the ensemble member ledger.
use crate::ensemble::EnsembleId;

/// Result alias for ledger operations that may produce [`EnsembleError`].
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Violations of the member-ledger discipline.
#[derive(Debug, Clone, PartialEq)]
pub enum EnsembleError {
    /// Ensemble ids on the wire are 1 (target) or 2 (dual resolution).
    UnknownEnsembleId { value: u32 },

    /// Members must arrive in index order.
    MemberOutOfOrder { id: EnsembleId, expected: usize, actual: usize },

    /// The configured ensemble size has already been reached.
    LedgerFull { id: EnsembleId, size: usize },

    /// Calibration may only start once the ledger matches the configured size.
    Incomplete { id: EnsembleId, expected: usize, actual: usize },

    /// Perturbations need at least two members.
    TooFewMembers { id: EnsembleId, actual: usize },

    /// Members of one ensemble do not share a variable contract.
    InconsistentMembers { id: EnsembleId },
}

impl std::error::Error for EnsembleError {}

impl std::fmt::Display for EnsembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleError::UnknownEnsembleId { value } => {
                write!(f, "Ensemble id must be 1 (target) or 2 (dual resolution); got: {value}")
            }
            EnsembleError::MemberOutOfOrder { id, expected, actual } => {
                write!(f, "{id}: expected member index {expected}, got {actual}.")
            }
            EnsembleError::LedgerFull { id, size } => {
                write!(f, "{id}: ledger already holds the configured {size} members.")
            }
            EnsembleError::Incomplete { id, expected, actual } => {
                write!(
                    f,
                    "{id}: calibration requires {expected} members; ledger holds {actual}."
                )
            }
            EnsembleError::TooFewMembers { id, actual } => {
                write!(f, "{id}: perturbations require at least 2 members; got {actual}.")
            }
            EnsembleError::InconsistentMembers { id } => {
                write!(f, "{id}: members do not share a single variable contract.")
            }
        }
    }
}
