//! fields — named field containers and variable contracts.
//!
//! Purpose
//! -------
//! Define the data every covariance block transforms: [`FieldSet`] (ordered
//! name → rows×levels array mapping with by-value copy semantics) and
//! [`Variables`] (the name/level-count contract blocks agree on at each chain
//! boundary), plus the shared error surface ([`FieldError`]).
//!
//! Conventions
//! -----------
//! - Rows index the local rank's grid points or spectral coefficients;
//!   columns index model levels.
//! - Missing-field resolution is aggregate: every unmatched name is reported
//!   in one error, not one at a time.
//! - This module performs no I/O and no logging; it operates purely on
//!   `ndarray` containers.

pub mod errors;
pub mod fieldset;
pub mod variables;

pub use self::errors::{FieldError, FieldResult};
pub use self::fieldset::FieldSet;
pub use self::variables::{Variable, Variables};
