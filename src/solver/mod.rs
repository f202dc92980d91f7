//! solver — standalone iterative linear-solver layer.
//!
//! Purpose
//! -------
//! House the restarted generalized-residual routine ([`gmresr`]) behind
//! operator/vector/inner-product seams so it can be exercised against
//! synthetic matrices independently of the covariance stack. The hybrid
//! combiner plugs itself in as the [`LinearOperator`] with an identity
//! preconditioner; tests plug in dense matrices.
//!
//! The [`SolverVector`] and [`InnerProduct`] implementations for
//! [`FieldSet`] live here: field-set dot products must be reduced across
//! ranks ([`FieldSetDot`]) so every rank takes identical convergence
//! decisions.

pub mod errors;
pub mod gmresr;

pub use self::errors::{SolverError, SolverResult};
pub use self::gmresr::{
    gmresr, GmresrOptions, GmresrOutcome, IdentityPreconditioner, InnerProduct, LinearOperator,
    SolverVector,
};

use ndarray::Array1;

use crate::fields::FieldSet;
use crate::parallel::Communicator;

impl SolverVector for Array1<f64> {
    fn set_zero(&mut self) {
        self.fill(0.0);
    }

    fn scale(&mut self, a: f64) {
        self.mapv_inplace(|x| a * x);
    }

    fn axpy(&mut self, a: f64, x: &Self) {
        self.scaled_add(a, x);
    }
}

impl SolverVector for FieldSet {
    fn set_zero(&mut self) {
        self.zero();
    }

    fn scale(&mut self, a: f64) {
        FieldSet::scale(self, a);
    }

    /// # Panics
    /// All vectors in one solve derive from the same right-hand side and so
    /// share one variable contract; a mismatch is a logic bug.
    fn axpy(&mut self, a: f64, x: &Self) {
        FieldSet::axpy(self, a, x).expect("solver vectors share one variable contract");
    }
}

/// Rank-reduced L2 inner product over field sets.
pub struct FieldSetDot<'a> {
    pub comm: &'a dyn Communicator,
}

impl InnerProduct<FieldSet> for FieldSetDot<'_> {
    /// # Panics
    /// Same single-contract invariant as the [`SolverVector`] impl.
    fn dot(&self, x: &FieldSet, y: &FieldSet) -> f64 {
        x.dot_product(y, self.comm).expect("solver vectors share one variable contract")
    }
}
