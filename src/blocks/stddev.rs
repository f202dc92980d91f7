//! The standard-deviation outer block ("StdDev").
//!
//! Purpose
//! -------
//! Diagonal change-of-variable scaling each active field by a per-point,
//! per-level standard deviation calibrated from an ensemble of
//! perturbations. Being diagonal it is its own adjoint, and its exact
//! inverse is division — which is why calibration rejects any non-positive
//! standard deviation outright.
//!
//! Invariants
//! ----------
//! - Variable names and level counts pass through unchanged; only active
//!   variables are scaled, others are untouched.
//! - After calibration, σ is strictly positive everywhere, so
//!   `inverse_multiply(multiply(x)) == x` holds to round-off.
use std::fmt;

use ndarray::Array2;

use crate::blocks::errors::{BlockError, BlockResult};
use crate::blocks::traits::{require_ready, BlockContext, BlockState, OuterBlock};
use crate::config::BlockConfig;
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;

/// Per-point, per-level standard-deviation scaling.
pub struct StdDev {
    /// Full variable contract at the block's chain position.
    vars: Variables,
    /// Variables this block scales (defaults to the full contract).
    active_vars: Variables,
    /// Calibrated standard deviations, one same-shaped field per active
    /// variable. `None` until calibration.
    sigma: Option<FieldSet>,
    state: BlockState,
}

impl StdDev {
    /// Uncalibrated block over the given contracts.
    pub fn new(vars: Variables, active_vars: Variables) -> Self {
        StdDev { vars, active_vars, sigma: None, state: BlockState::Constructed }
    }

    /// Registry constructor: active variables come from the block config,
    /// defaulting to every variable at the chain position.
    pub fn make(cfg: &BlockConfig, ctx: &BlockContext<'_>) -> BlockResult<Box<dyn OuterBlock>> {
        let active_vars = match &cfg.active_vars {
            Some(names) => ctx.vars.restrict(names)?,
            None => ctx.vars.clone(),
        };
        Ok(Box::new(StdDev::new(ctx.vars.clone(), active_vars)))
    }

    /// Calibrated standard deviations (for inspection and tests).
    pub fn sigma(&self) -> Option<&FieldSet> {
        self.sigma.as_ref()
    }

    fn apply_scaling(&self, fset: &mut FieldSet, invert: bool) -> BlockResult<()> {
        // σ is present whenever the state is ready.
        let sigma = self.sigma.as_ref().unwrap();
        fset.require(&self.active_vars)?;
        for v in self.active_vars.iter() {
            let s = sigma.field(&v.name)?;
            let data = fset.field_mut(&v.name)?;
            if invert {
                *data /= s;
            } else {
                *data *= s;
            }
        }
        Ok(())
    }
}

impl OuterBlock for StdDev {
    fn name(&self) -> &str {
        "StdDev"
    }

    fn state(&self) -> BlockState {
        self.state
    }

    fn inner_vars(&self) -> &Variables {
        &self.vars
    }

    fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "multiply");
        self.apply_scaling(fset, false)
    }

    /// Diagonal operator: the adjoint equals the forward application.
    fn multiply_ad(&self, fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "multiply_ad");
        self.apply_scaling(fset, false)
    }

    fn inverse_multiply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "inverse_multiply");
        self.apply_scaling(fset, true)
    }

    fn inverse_multiply_ad(&self, fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "inverse_multiply_ad");
        self.apply_scaling(fset, true)
    }

    /// σ is a purely local (per-point) statistic; no cross-rank reduction is
    /// needed and `_comm` is unused.
    fn direct_calibration(
        &mut self, members: &[FieldSet], _comm: &dyn Communicator,
    ) -> BlockResult<()> {
        if members.len() < 2 {
            return Err(BlockError::EnsembleTooSmall {
                block: self.name().to_string(),
                required: 2,
                actual: members.len(),
            });
        }
        for member in members {
            member.require(&self.active_vars)?;
        }

        let norm = 1.0 / (members.len() - 1) as f64;
        let mut sigma = FieldSet::new();
        for v in self.active_vars.iter() {
            let dim = members[0].field(&v.name)?.dim();
            let mut variance = Array2::<f64>::zeros(dim);
            for member in members {
                let data = member.field(&v.name)?;
                variance.zip_mut_with(data, |acc, &x| *acc += x * x);
            }
            variance.mapv_inplace(|x| (x * norm).sqrt());

            if let Some(((row, level), &value)) =
                variance.indexed_iter().find(|(_, &s)| !(s > 0.0))
            {
                return Err(BlockError::NonPositiveStdDev {
                    block: self.name().to_string(),
                    variable: v.name.clone(),
                    row,
                    level,
                    value,
                });
            }
            sigma.insert(v.name.clone(), variance)?;
        }

        self.sigma = Some(sigma);
        self.state = BlockState::Calibrated;
        Ok(())
    }
}

impl fmt::Display for StdDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StdDev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    use crate::parallel::SerialComm;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Calibration from perturbations, forward/adjoint equality (diagonal
    // operator), exact inverse round-trip, and the fail-fast paths (ensemble
    // too small, zero variance). Chain-level wiring is covered in `chains`.
    // -------------------------------------------------------------------------

    const TOL: f64 = 1e-12;

    fn perturbations() -> Vec<FieldSet> {
        // Two antisymmetric perturbations: variance = x² at each entry.
        let mut a = FieldSet::new();
        a.insert("t", array![[1.0, 2.0], [3.0, 0.5]]).unwrap();
        let mut b = FieldSet::new();
        b.insert("t", array![[-1.0, -2.0], [-3.0, -0.5]]).unwrap();
        vec![a, b]
    }

    fn calibrated() -> StdDev {
        let vars = Variables::new([("t", 2)]).unwrap();
        let mut block = StdDev::new(vars.clone(), vars);
        block.direct_calibration(&perturbations(), &SerialComm).unwrap();
        block
    }

    #[test]
    fn calibration_computes_unbiased_sigma() {
        let block = calibrated();
        // K = 2, so σ² = (x² + x²)/(K−1) = 2x² and σ = √2·|x|.
        let sigma = block.sigma().unwrap().get("t").unwrap();
        assert_relative_eq!(sigma[[0, 0]], 2.0_f64.sqrt(), epsilon = TOL);
        assert_relative_eq!(sigma[[1, 0]], 3.0 * 2.0_f64.sqrt(), epsilon = TOL);
        assert_eq!(block.state(), BlockState::Calibrated);
    }

    #[test]
    fn adjoint_equals_forward_for_diagonal_scaling() {
        let block = calibrated();
        let mut x = FieldSet::new();
        x.insert("t", array![[1.0, 1.0], [1.0, 1.0]]).unwrap();
        let mut y = x.clone();

        block.multiply(&mut x).unwrap();
        block.multiply_ad(&mut y).unwrap();

        assert_eq!(x, y);
    }

    #[test]
    fn inverse_round_trip_recovers_input() {
        let block = calibrated();
        let mut fset = FieldSet::new();
        fset.insert("t", array![[0.3, -1.2], [2.5, 0.9]]).unwrap();
        let original = fset.clone();

        block.multiply(&mut fset).unwrap();
        block.inverse_multiply(&mut fset).unwrap();

        for (name, data) in fset.iter() {
            let expected = original.get(name).unwrap();
            for (got, want) in data.iter().zip(expected.iter()) {
                assert_relative_eq!(got, want, epsilon = TOL);
            }
        }
    }

    #[test]
    fn calibration_rejects_single_member_and_zero_variance() {
        let vars = Variables::new([("t", 2)]).unwrap();
        let mut block = StdDev::new(vars.clone(), vars.clone());
        let err = block.direct_calibration(&perturbations()[..1], &SerialComm).unwrap_err();
        assert!(matches!(err, BlockError::EnsembleTooSmall { required: 2, actual: 1, .. }));

        let mut zero_a = FieldSet::new();
        zero_a.insert("t", array![[0.0, 1.0]]).unwrap();
        let mut zero_b = FieldSet::new();
        zero_b.insert("t", array![[0.0, -1.0]]).unwrap();
        let mut block = StdDev::new(vars.clone(), vars);
        let err = block.direct_calibration(&[zero_a, zero_b], &SerialComm).unwrap_err();
        assert!(matches!(
            err,
            BlockError::NonPositiveStdDev { row: 0, level: 0, .. }
        ));
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn multiply_before_calibration_is_a_contract_violation() {
        let vars = Variables::new([("t", 2)]).unwrap();
        let block = StdDev::new(vars.clone(), vars);
        let mut fset = FieldSet::new();
        fset.insert("t", array![[1.0, 1.0]]).unwrap();
        let _ = block.multiply(&mut fset);
    }
}
