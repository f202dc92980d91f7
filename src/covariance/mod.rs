//! covariance — the assembled (possibly hybrid) error-covariance operator.
//!
//! Purpose
//! -------
//! Realize `B = Σᵢ (Sᵢ √wᵢ) Cᵢ (Sᵢ √wᵢ)ᵗ`: one or more block chains combined
//! with scalar and/or per-field weights, optionally behind a shared outer
//! chain applied to all components. This is the operator a variational or
//! ensemble assimilation applies once per iteration.
//!
//! Key behaviors
//! -------------
//! - `multiply`: shared outer adjoint once → per component, √w scaling,
//!   chain multiply, √w scaling, accumulate → shared outer forward once.
//!   This exact order makes the combined operator self-adjoint whenever each
//!   component and the shared chain are; reordering breaks the adjoint-test
//!   invariant.
//! - `randomize`: independent central samples per component, propagated
//!   through the component's own outer blocks, weighted by √w and summed;
//!   the shared chain is applied once to the accumulated sum. Weights are
//!   stored pre-square-rooted precisely so the sum is a valid covariance
//!   square root and samples carry the combined covariance.
//! - `inverse_multiply`: the combined operator generally has no closed-form
//!   inverse even when each component does; it is solved iteratively with
//!   the standalone GMRESR routine (cap 10, relative residual 1e-3,
//!   identity preconditioner), treating this operator as the system matrix.
//! - A non-hybrid covariance is the degenerate one-component hybrid with
//!   scalar weight 1.0 and no field weight — same code path, identical
//!   numerics between "hybrid of one" and "plain".
use log::debug;
use rand::RngCore;

use crate::blocks::errors::BlockResult;
use crate::blocks::registry::BlockRegistry;
use crate::blocks::traits::BlockContext;
use crate::chains::{BlockChain, ConsistencyPolicy, OuterChain};
use crate::config::{ConfigError, CovarianceConfig};
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;
use crate::solver::{
    gmresr, FieldSetDot, GmresrOptions, IdentityPreconditioner, LinearOperator, SolverError,
    SolverResult,
};
use crate::spectral::io;

/// One weighted component of the combination.
struct HybridComponent {
    chain: BlockChain,
    /// √w, stored pre-square-rooted; 1.0 for the non-hybrid case.
    scalar_weight_sqrt: f64,
    /// Per-field √w, absent for the non-hybrid case.
    field_weight_sqrt: Option<FieldSet>,
}

impl HybridComponent {
    fn apply_weight(&self, fset: &mut FieldSet) -> BlockResult<()> {
        if self.scalar_weight_sqrt != 1.0 {
            fset.scale(self.scalar_weight_sqrt);
        }
        if let Some(weights) = &self.field_weight_sqrt {
            fset.scale_by(weights)?;
        }
        Ok(())
    }
}

/// Assembled background-error covariance operator.
pub struct ErrorCovariance {
    /// Outer chain shared by all hybrid components; absent for non-hybrid
    /// covariances.
    shared_outers: Option<OuterChain>,
    /// Hybrid components (exactly one for the non-hybrid case).
    components: Vec<HybridComponent>,
    outer_vars: Variables,
}

impl std::fmt::Debug for ErrorCovariance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorCovariance")
            .field("has_shared_outers", &self.shared_outers.is_some())
            .field("num_components", &self.components.len())
            .field("outer_vars", &self.outer_vars)
            .finish()
    }
}

impl ErrorCovariance {
    /// Assemble the covariance from configuration.
    ///
    /// The reserved central-block name `"Hybrid"` selects the component
    /// path: the covariance's outer blocks become the shared chain and each
    /// component carries its own weight and nested covariance. Any other
    /// name assembles a single chain with weight 1.0.
    ///
    /// # Errors
    /// Registry, calibration, configuration, and consistency-gate failures,
    /// each aborting assembly entirely.
    pub fn assemble(
        registry: &BlockRegistry, cfg: &CovarianceConfig, ctx: &BlockContext<'_>,
    ) -> BlockResult<Self> {
        if !cfg.is_hybrid() {
            let chain = BlockChain::assemble(registry, cfg, ctx)?;
            return Ok(ErrorCovariance {
                shared_outers: None,
                components: vec![HybridComponent {
                    chain,
                    scalar_weight_sqrt: 1.0,
                    field_weight_sqrt: None,
                }],
                outer_vars: ctx.vars.clone(),
            });
        }

        let policy = ConsistencyPolicy::from_config(cfg);
        let (shared_outers, inner_vars) = if cfg.outer_blocks.is_empty() {
            (None, ctx.vars.clone())
        } else {
            let (chain, inner) =
                OuterChain::assemble(registry, &cfg.outer_blocks, ctx, &policy)?;
            (Some(chain), inner)
        };

        let component_cfgs = &cfg.central_block.components;
        if component_cfgs.is_empty() {
            return Err(ConfigError::EmptyComponents.into());
        }

        let rows = ctx.geometry.coefficient_rows();
        let mut components = Vec::with_capacity(component_cfgs.len());
        for cmp in component_cfgs {
            let scalar_weight_sqrt = cmp.weight.scalar()?.sqrt();
            let field_weight_sqrt = match &cmp.weight.file {
                Some(path) => {
                    let mut weights = io::read_fieldset(path, &inner_vars, rows)?;
                    for (_, data) in weights.iter_mut() {
                        if let Some(&bad) = data.iter().find(|&&w| !w.is_finite() || w < 0.0) {
                            return Err(ConfigError::InvalidWeight { value: bad }.into());
                        }
                        data.mapv_inplace(f64::sqrt);
                    }
                    Some(weights)
                }
                None => None,
            };

            let cmp_ctx = ctx.with_vars(&inner_vars);
            // Component chains inherit the covariance-level gate policy.
            let chain =
                BlockChain::assemble_with_policy(registry, &cmp.covariance, &cmp_ctx, &policy)?;
            debug!(
                "assembled hybrid component '{}' (sqrt weight {scalar_weight_sqrt})",
                chain.central().name()
            );
            components.push(HybridComponent { chain, scalar_weight_sqrt, field_weight_sqrt });
        }

        Ok(ErrorCovariance { shared_outers, components, outer_vars: ctx.vars.clone() })
    }

    /// Variables at the covariance's outer boundary.
    pub fn outer_vars(&self) -> &Variables {
        &self.outer_vars
    }

    /// Number of combined components (1 for the non-hybrid case).
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Apply `B` in place.
    pub fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        if let Some(shared) = &self.shared_outers {
            shared.apply_ad(fset)?;
        }
        let input = fset.clone();
        fset.zero();
        for component in &self.components {
            let mut tmp = input.clone();
            component.apply_weight(&mut tmp)?;
            component.chain.multiply(&mut tmp)?;
            component.apply_weight(&mut tmp)?;
            fset.add(&tmp)?;
        }
        if let Some(shared) = &self.shared_outers {
            shared.apply(fset)?;
        }
        Ok(())
    }

    /// Draw a sample with covariance `B` in place (the input contents are
    /// discarded).
    pub fn randomize(&self, fset: &mut FieldSet, rng: &mut dyn RngCore) -> BlockResult<()> {
        fset.zero();
        let zero = fset.clone();
        for component in &self.components {
            let mut sample = zero.clone();
            component.chain.randomize(&mut sample, rng)?;
            component.apply_weight(&mut sample)?;
            fset.add(&sample)?;
        }
        if let Some(shared) = &self.shared_outers {
            shared.apply(fset)?;
        }
        Ok(())
    }

    /// Apply `B⁻¹` in place, iteratively.
    ///
    /// Every rank must reach this call: the solver's convergence decisions
    /// ride on rank-reduced dot products.
    pub fn inverse_multiply(
        &self, fset: &mut FieldSet, comm: &dyn Communicator,
    ) -> BlockResult<()> {
        let rhs = fset.clone();
        fset.zero();
        let outcome = gmresr(
            fset,
            &rhs,
            &CovarianceOperator(self),
            &IdentityPreconditioner,
            &FieldSetDot { comm },
            &GmresrOptions::default(),
        )?;
        debug!(
            "covariance inverse: {} iteration(s), relative residual {:e}, converged = {}",
            outcome.iterations, outcome.relative_residual, outcome.converged
        );
        Ok(())
    }
}

/// The combined covariance presented to the linear solver.
struct CovarianceOperator<'a>(&'a ErrorCovariance);

impl LinearOperator<FieldSet> for CovarianceOperator<'_> {
    fn apply(&self, x: &FieldSet, out: &mut FieldSet) -> SolverResult<()> {
        out.clone_from(x);
        self.0
            .multiply(out)
            .map_err(|e| SolverError::OperatorFailure { detail: e.to_string() })
    }
}
