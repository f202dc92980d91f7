//! spectral — spectral-space covariance statistics and central blocks.
//!
//! Purpose
//! -------
//! Everything specific to covariance modeling in spectral (wavenumber)
//! space: the coefficient layout of a truncated spectral geometry
//! ([`SpectralGeometry`]), ensemble estimation of per-total-wavenumber
//! vertical statistics ([`VerticalStatistics`]), the two central blocks
//! built on them ([`SpectralCovariance`], [`SpectralCorrelation`]), and the
//! self-describing persisted-operator format ([`io`]).
//!
//! Conventions
//! -----------
//! - Field rows enumerate `(m, n, re/im)` coefficients in geometry order;
//!   vertical statistics are banded by total wavenumber `n` and indexed by
//!   level pairs.
//! - Raw sums stay unnormalized; `(2n+1) · samples` is divided out at
//!   application time by the covariance block and absorbed by the
//!   standard-deviation normalization of the correlation block.
//! - Statistics are reduced across ranks at estimation time; persistence is
//!   root-rank-gated.

pub mod correlation;
pub mod covariance;
pub mod errors;
pub mod estimator;
pub mod geometry;
pub mod io;

pub use self::correlation::SpectralCorrelation;
pub use self::covariance::SpectralCovariance;
pub use self::errors::{SpectralError, SpectralResult};
pub use self::estimator::VerticalStatistics;
pub use self::geometry::{SpectralCoefficient, SpectralGeometry};
