//! Errors for spectral geometry, statistics estimation, and persistence.
use std::path::PathBuf;

/// Result alias for spectral-layer operations.
pub type SpectralResult<T> = Result<T, SpectralError>;

/// Error surface of the spectral geometry/estimator/persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectralError {
    /// Zonal wavenumbers must satisfy `m <= truncation`.
    InvalidZonalWavenumber { m: usize, truncation: usize },

    /// A rank's owned zonal wavenumbers must be strictly increasing.
    UnsortedZonalWavenumbers,

    /// Field rows do not match the geometry's coefficient count.
    RowsMismatch { variable: String, expected: usize, actual: usize },

    /// Statistics estimation requires at least one member.
    EmptyEnsemble,

    /// Correlation normalization needs strictly positive level variances.
    NonPositiveVariance { variable: String, bin: usize, level: usize, value: f64 },

    /// A persisted file is missing a required variable.
    MissingVariableInFile { name: String, path: PathBuf },

    /// A persisted file disagrees with the run's geometry or contract.
    FileContractMismatch { path: PathBuf, detail: String },

    /// In-memory statistics disagree with the block's geometry or contract.
    StatisticsMismatch { variable: String, detail: String },

    /// File I/O or (de)serialization failure.
    Persistence { path: PathBuf, detail: String },
}

impl std::error::Error for SpectralError {}

impl std::fmt::Display for SpectralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpectralError::InvalidZonalWavenumber { m, truncation } => {
                write!(f, "Zonal wavenumber {m} exceeds truncation {truncation}.")
            }
            SpectralError::UnsortedZonalWavenumbers => {
                write!(f, "Owned zonal wavenumbers must be strictly increasing.")
            }
            SpectralError::RowsMismatch { variable, expected, actual } => {
                write!(
                    f,
                    "Field '{variable}' has {actual} rows; geometry owns {expected} spectral \
                     coefficients."
                )
            }
            SpectralError::EmptyEnsemble => {
                write!(f, "Statistics estimation requires at least one ensemble member.")
            }
            SpectralError::NonPositiveVariance { variable, bin, level, value } => {
                write!(
                    f,
                    "Variable '{variable}': variance at total wavenumber {bin}, level {level} \
                     must be > 0 to form a correlation; got {value}."
                )
            }
            SpectralError::MissingVariableInFile { name, path } => {
                write!(f, "Variable '{name}' not found in '{}'.", path.display())
            }
            SpectralError::FileContractMismatch { path, detail } => {
                write!(f, "File '{}' does not match the run: {detail}", path.display())
            }
            SpectralError::StatisticsMismatch { variable, detail } => {
                write!(f, "Statistics for '{variable}' do not match the run: {detail}")
            }
            SpectralError::Persistence { path, detail } => {
                write!(f, "Persistence failure for '{}': {detail}", path.display())
            }
        }
    }
}
