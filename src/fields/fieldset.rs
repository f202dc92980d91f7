//! fields::fieldset — named multi-level field container and its arithmetic.
//!
//! Purpose
//! -------
//! Provide the field container every covariance block operates on: an ordered
//! mapping from variable name to a `(rows × levels)` array, where rows index
//! grid points or spectral coefficients on the local rank and columns index
//! model levels. This is the in-memory stand-in for the external scientific
//! field library; blocks consume it, they never reimplement it.
//!
//! Key behaviors
//! -------------
//! - By-value copy semantics (`Clone`); a field set handed through a block
//!   chain is never aliased across concurrent applications.
//! - Aggregate missing-field resolution: [`FieldSet::require`] reports every
//!   unmatched variable name in a single [`FieldError::MissingFields`].
//! - Whole-set arithmetic used by chains and the hybrid combiner: zeroing,
//!   scalar scaling, per-field (Hadamard) scaling, accumulation, and the
//!   rank-reduced L2 dot product.
//! - Gaussian fills for randomization and the consistency-test harness.
//!
//! Invariants & assumptions
//! ------------------------
//! - Field names are unique within a set; insertion order is preserved and
//!   fixes traversal order everywhere downstream.
//! - Arithmetic between two field sets requires identical name sets; a
//!   mismatch is a [`FieldError::ContractMismatch`], not a silent skip.
//! - The dot product is the discrete L2 inner product over all grid points ×
//!   levels × ranks; the cross-rank reduction goes through
//!   [`Communicator::sum_scalar`] and must be reached by every rank.
use ndarray::Array2;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::fields::errors::{FieldError, FieldResult};
use crate::fields::variables::Variables;
use crate::parallel::Communicator;

/// Ordered mapping from variable name to a `(rows × levels)` array.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSet {
    fields: Vec<(String, Array2<f64>)>,
}

impl FieldSet {
    /// Empty field set.
    pub fn new() -> Self {
        FieldSet { fields: Vec::new() }
    }

    /// Zero-filled field set over `vars`, with `rows` local rows per field.
    pub fn zeros(vars: &Variables, rows: usize) -> Self {
        let fields = vars
            .iter()
            .map(|v| (v.name.clone(), Array2::zeros((rows, v.levels))))
            .collect();
        FieldSet { fields }
    }

    /// Field set over `vars` filled with independent standard-normal draws.
    ///
    /// Used by central-block randomization and by the consistency-test
    /// harness; both need fresh, independent samples per call.
    pub fn random(vars: &Variables, rows: usize, rng: &mut dyn RngCore) -> Self {
        let mut fset = FieldSet::zeros(vars, rows);
        fset.fill_random(rng);
        fset
    }

    /// Overwrite every entry with an independent standard-normal draw.
    pub fn fill_random(&mut self, rng: &mut dyn RngCore) {
        for (_, data) in &mut self.fields {
            for x in data.iter_mut() {
                *x = StandardNormal.sample(rng);
            }
        }
    }

    /// Add a named field.
    ///
    /// # Errors
    /// - [`FieldError::DuplicateField`] if the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, data: Array2<f64>) -> FieldResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(FieldError::DuplicateField { name });
        }
        self.fields.push((name, data));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Array2<f64>> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Array2<f64>> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// Borrow a required field.
    ///
    /// # Errors
    /// - [`FieldError::MissingFields`] naming the single missing field. Use
    ///   [`FieldSet::require`] when resolving a whole contract so that all
    ///   gaps are reported at once.
    pub fn field(&self, name: &str) -> FieldResult<&Array2<f64>> {
        self.get(name).ok_or_else(|| FieldError::MissingFields { names: vec![name.to_string()] })
    }

    /// Mutably borrow a required field (same error policy as [`FieldSet::field`]).
    pub fn field_mut(&mut self, name: &str) -> FieldResult<&mut Array2<f64>> {
        if self.contains(name) {
            Ok(self.get_mut(name).unwrap())
        } else {
            Err(FieldError::MissingFields { names: vec![name.to_string()] })
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array2<f64>)> {
        self.fields.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Array2<f64>)> {
        self.fields.iter_mut().map(|(n, d)| (n.as_str(), d))
    }

    /// Check that every variable in `vars` is present with the declared level
    /// count, collecting *all* missing names before failing.
    ///
    /// # Errors
    /// - [`FieldError::MissingFields`] with every unmatched name.
    /// - [`FieldError::ShapeMismatch`] for the first present-but-misshaped
    ///   field (shape bugs are structural, not data gaps, and fail singly).
    pub fn require(&self, vars: &Variables) -> FieldResult<()> {
        let missing: Vec<String> =
            vars.names().filter(|n| !self.contains(n)).map(String::from).collect();
        if !missing.is_empty() {
            return Err(FieldError::MissingFields { names: missing });
        }
        for v in vars.iter() {
            let data = self.get(&v.name).unwrap();
            if data.ncols() != v.levels {
                return Err(FieldError::ShapeMismatch {
                    name: v.name.clone(),
                    expected: (data.nrows(), v.levels),
                    actual: (data.nrows(), data.ncols()),
                });
            }
        }
        Ok(())
    }

    /// Set every entry of every field to zero.
    pub fn zero(&mut self) {
        for (_, data) in &mut self.fields {
            data.fill(0.0);
        }
    }

    /// Multiply every entry of every field by `a`.
    pub fn scale(&mut self, a: f64) {
        for (_, data) in &mut self.fields {
            data.mapv_inplace(|x| a * x);
        }
    }

    /// Entry-wise multiply by the matching fields of `weights`.
    ///
    /// Every field of `self` must have a same-shaped counterpart in
    /// `weights`; this is the per-field weight application of the hybrid
    /// combiner.
    ///
    /// # Errors
    /// - [`FieldError::MissingFields`] with every field of `self` absent from
    ///   `weights`.
    /// - [`FieldError::ShapeMismatch`] on the first shape disagreement.
    pub fn scale_by(&mut self, weights: &FieldSet) -> FieldResult<()> {
        let missing: Vec<String> =
            self.names().filter(|n| !weights.contains(n)).map(String::from).collect();
        if !missing.is_empty() {
            return Err(FieldError::MissingFields { names: missing });
        }
        for (name, data) in &mut self.fields {
            let w = weights.get(name).unwrap();
            if w.dim() != data.dim() {
                return Err(FieldError::ShapeMismatch {
                    name: name.clone(),
                    expected: data.dim(),
                    actual: w.dim(),
                });
            }
            *data *= w;
        }
        Ok(())
    }

    /// `self += a · x`, field by field.
    ///
    /// # Errors
    /// - [`FieldError::ContractMismatch`] if the two sets do not carry the
    ///   same variable names.
    /// - [`FieldError::ShapeMismatch`] on the first shape disagreement.
    pub fn axpy(&mut self, a: f64, x: &FieldSet) -> FieldResult<()> {
        self.check_contract(x)?;
        for (name, data) in &mut self.fields {
            let other = x.get(name).unwrap();
            if other.dim() != data.dim() {
                return Err(FieldError::ShapeMismatch {
                    name: name.clone(),
                    expected: data.dim(),
                    actual: other.dim(),
                });
            }
            data.scaled_add(a, other);
        }
        Ok(())
    }

    /// `self += x` (accumulation across hybrid components).
    pub fn add(&mut self, x: &FieldSet) -> FieldResult<()> {
        self.axpy(1.0, x)
    }

    /// Discrete L2 dot product over all fields, levels, and ranks.
    ///
    /// The local partial sum is reduced across ranks via
    /// [`Communicator::sum_scalar`]; every rank must make this call.
    ///
    /// # Errors
    /// - [`FieldError::ContractMismatch`] if the two sets differ in names.
    pub fn dot_product(&self, other: &FieldSet, comm: &dyn Communicator) -> FieldResult<f64> {
        self.check_contract(other)?;
        let mut local = 0.0;
        for (name, data) in &self.fields {
            let rhs = other.get(name).unwrap();
            local += data.iter().zip(rhs.iter()).map(|(a, b)| a * b).sum::<f64>();
        }
        Ok(comm.sum_scalar(local))
    }

    fn check_contract(&self, other: &FieldSet) -> FieldResult<()> {
        let lhs: Vec<&str> = self.names().collect();
        let rhs: Vec<&str> = other.names().collect();
        let same = lhs.len() == rhs.len() && lhs.iter().all(|n| other.contains(n));
        if same {
            Ok(())
        } else {
            Err(FieldError::ContractMismatch {
                left: lhs.into_iter().map(String::from).collect(),
                right: rhs.into_iter().map(String::from).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::parallel::SerialComm;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // - Construction, insertion-order traversal, duplicate rejection.
    // - Aggregate missing-field reporting from `require`.
    // - Whole-set arithmetic: zero, scale, scale_by, axpy, dot_product.
    // - Statistical sanity of `fill_random` is NOT tested here beyond
    //   non-degeneracy; distributional checks live with the consumers.
    // -------------------------------------------------------------------------

    const TOL: f64 = 1e-12;

    fn two_var_set() -> FieldSet {
        let mut fset = FieldSet::new();
        fset.insert("t", array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        fset.insert("q", array![[0.5, -0.5], [1.5, -1.5]]).unwrap();
        fset
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let mut fset = two_var_set();
        let err = fset.insert("t", array![[0.0, 0.0]]).unwrap_err();
        assert_eq!(err, FieldError::DuplicateField { name: "t".to_string() });
    }

    #[test]
    fn require_reports_every_missing_field_at_once() {
        // A state missing two of four required fields must name both.
        let fset = two_var_set();
        let vars =
            Variables::new([("t", 2), ("q", 2), ("u", 2), ("v", 2)]).unwrap();
        let err = fset.require(&vars).unwrap_err();
        assert_eq!(
            err,
            FieldError::MissingFields { names: vec!["u".to_string(), "v".to_string()] }
        );
    }

    #[test]
    fn require_checks_level_counts() {
        let fset = two_var_set();
        let vars = Variables::new([("t", 3), ("q", 2)]).unwrap();
        let err = fset.require(&vars).unwrap_err();
        assert!(matches!(err, FieldError::ShapeMismatch { .. }));
    }

    #[test]
    fn axpy_accumulates_field_by_field() {
        let mut acc = two_var_set();
        let x = two_var_set();
        acc.axpy(2.0, &x).unwrap();
        assert_relative_eq!(acc.get("t").unwrap()[[1, 1]], 12.0, epsilon = TOL);
        assert_relative_eq!(acc.get("q").unwrap()[[0, 0]], 1.5, epsilon = TOL);
    }

    #[test]
    fn axpy_rejects_contract_mismatch() {
        let mut acc = two_var_set();
        let mut other = FieldSet::new();
        other.insert("t", array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let err = acc.axpy(1.0, &other).unwrap_err();
        assert!(matches!(err, FieldError::ContractMismatch { .. }));
    }

    #[test]
    fn scale_by_applies_hadamard_weights() {
        let mut fset = two_var_set();
        let mut w = FieldSet::new();
        w.insert("t", array![[2.0, 2.0], [2.0, 2.0]]).unwrap();
        w.insert("q", array![[0.0, 0.0], [0.0, 0.0]]).unwrap();
        fset.scale_by(&w).unwrap();
        assert_relative_eq!(fset.get("t").unwrap()[[0, 1]], 4.0, epsilon = TOL);
        assert_relative_eq!(fset.get("q").unwrap()[[1, 0]], 0.0, epsilon = TOL);
    }

    #[test]
    fn dot_product_matches_manual_sum() {
        let fset = two_var_set();
        let comm = SerialComm;
        let dp = fset.dot_product(&fset, &comm).unwrap();
        let manual = 1.0 + 4.0 + 9.0 + 16.0 + 0.25 + 0.25 + 2.25 + 2.25;
        assert_relative_eq!(dp, manual, epsilon = TOL);
    }

    #[test]
    fn random_fill_is_reproducible_per_seed_and_nondegenerate() {
        let vars = Variables::new([("t", 3)]).unwrap();
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = FieldSet::random(&vars, 5, &mut rng_a);
        let b = FieldSet::random(&vars, 5, &mut rng_b);
        assert_eq!(a, b);
        let data = a.get("t").unwrap();
        assert!(data.iter().any(|&x| x != 0.0));
    }
}
