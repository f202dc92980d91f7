//! blocks::testing — assembly-time consistency gates.
//!
//! Purpose
//! -------
//! Verify an operator before a run is allowed to use it. Two gates:
//!
//! - [`self_adjoint_test`]: draws two independent random field sets, applies
//!   the *forward* multiply to both (deliberately — not the adjoint), and
//!   compares the rank-reduced cross dot products
//!   `⟨A x₁, x₂⟩` vs `⟨A x₂, x₁⟩` against a relative tolerance. This is the
//!   reduced self-adjointness property, the literal check covariance
//!   operators must pass; it is weaker than a full adjoint pairing and kept
//!   that way on purpose.
//! - [`inverse_test`]: checks `inverse_multiply(multiply(x)) ≈ x` in relative
//!   L2 norm for a random x over the block's variable contract.
//!
//! Both gates are correctness gates: failure is a fatal error at assembly
//! time, not a warning.
use log::{info, warn};
use rand::RngCore;

use crate::blocks::errors::{BlockError, BlockResult};
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;

/// Self-adjointness gate over repeated forward multiplies.
///
/// `apply` is the operator's forward multiply; `name` identifies the block in
/// diagnostics and failures.
///
/// # Errors
/// - [`BlockError::AdjointTestFailed`] when
///   `|dp₁ − dp₂| / |½(dp₁ + dp₂)|` exceeds `tolerance`.
pub fn self_adjoint_test(
    name: &str, mut apply: impl FnMut(&mut FieldSet) -> BlockResult<()>, vars: &Variables,
    rows: usize, tolerance: f64, comm: &dyn Communicator, rng: &mut dyn RngCore,
) -> BlockResult<()> {
    let mut fset1 = FieldSet::random(vars, rows, rng);
    let mut fset2 = FieldSet::random(vars, rows, rng);
    let fset1_save = fset1.clone();
    let fset2_save = fset2.clone();

    // Forward multiplication only: the reduced self-adjointness property.
    apply(&mut fset1)?;
    apply(&mut fset2)?;

    let dp1 = fset1.dot_product(&fset2_save, comm)?;
    let dp2 = fset2.dot_product(&fset1_save, comm)?;
    info!("adjoint test for '{name}': y^t(Ax) = {dp1:.16e}, x^t(Ay) = {dp2:.16e}");

    let relative = (dp1 - dp2).abs() / (0.5 * (dp1 + dp2)).abs();
    if relative < tolerance {
        Ok(())
    } else {
        warn!("adjoint test for '{name}' failed: relative difference {relative:e}");
        Err(BlockError::AdjointTestFailed { block: name.to_string(), dp1, dp2, tolerance })
    }
}

/// Inverse round-trip gate: `inverse(multiply(x)) ≈ x`.
///
/// # Errors
/// - [`BlockError::InverseTestFailed`] when the relative L2 error exceeds
///   `tolerance`.
/// - [`BlockError::InverseNotImplemented`] propagated from `inverse` when the
///   transform has no closed form inverse.
pub fn inverse_test(
    name: &str, mut multiply: impl FnMut(&mut FieldSet) -> BlockResult<()>,
    mut inverse: impl FnMut(&mut FieldSet) -> BlockResult<()>, vars: &Variables, rows: usize,
    tolerance: f64, comm: &dyn Communicator, rng: &mut dyn RngCore,
) -> BlockResult<()> {
    let reference = FieldSet::random(vars, rows, rng);
    let mut fset = reference.clone();

    multiply(&mut fset)?;
    inverse(&mut fset)?;

    let mut diff = fset;
    diff.axpy(-1.0, &reference)?;
    let num = diff.dot_product(&diff, comm)?;
    let den = reference.dot_product(&reference, comm)?;
    let relative = (num / den).sqrt();
    info!("inverse test for '{name}': relative error = {relative:e}");

    if relative < tolerance {
        Ok(())
    } else {
        warn!("inverse test for '{name}' failed: relative error {relative:e}");
        Err(BlockError::InverseTestFailed { block: name.to_string(), error: relative, tolerance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::parallel::SerialComm;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // The gates themselves, exercised with hand-built symmetric and
    // asymmetric operators over field sets. Gate wiring into chain assembly
    // is covered in `chains`.
    // -------------------------------------------------------------------------

    fn vars() -> Variables {
        Variables::new([("t", 3)]).unwrap()
    }

    #[test]
    fn symmetric_scaling_passes_the_gate() {
        let comm = SerialComm;
        let mut rng = StdRng::seed_from_u64(11);
        let result = self_adjoint_test(
            "scaling",
            |fset| {
                fset.scale(2.5);
                Ok(())
            },
            &vars(),
            8,
            1.0e-12,
            &comm,
            &mut rng,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn asymmetric_operator_fails_the_gate() {
        let comm = SerialComm;
        let mut rng = StdRng::seed_from_u64(12);
        // Shift level columns: x[:, l] <- x[:, l-1]; plainly not symmetric.
        let result = self_adjoint_test(
            "shift",
            |fset| {
                for (_, data) in fset.iter_mut() {
                    for row in 0..data.nrows() {
                        for level in (1..data.ncols()).rev() {
                            data[[row, level]] = data[[row, level - 1]];
                        }
                        data[[row, 0]] = 0.0;
                    }
                }
                Ok(())
            },
            &vars(),
            8,
            1.0e-12,
            &comm,
            &mut rng,
        );
        assert!(matches!(result, Err(BlockError::AdjointTestFailed { .. })));
    }

    #[test]
    fn exact_inverse_passes_and_sloppy_inverse_fails() {
        let comm = SerialComm;
        let mut rng = StdRng::seed_from_u64(13);
        let ok = inverse_test(
            "scaling",
            |fset| {
                fset.scale(4.0);
                Ok(())
            },
            |fset| {
                fset.scale(0.25);
                Ok(())
            },
            &vars(),
            8,
            1.0e-12,
            &comm,
            &mut rng,
        );
        assert!(ok.is_ok());

        let bad = inverse_test(
            "scaling",
            |fset| {
                fset.scale(4.0);
                Ok(())
            },
            |fset| {
                fset.scale(0.3);
                Ok(())
            },
            &vars(),
            8,
            1.0e-6,
            &comm,
            &mut rng,
        );
        assert!(matches!(bad, Err(BlockError::InverseTestFailed { .. })));
    }
}
