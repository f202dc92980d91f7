//! chains — ordered composition of outer blocks feeding a central block.
//!
//! Purpose
//! -------
//! Assemble declarative block lists into operators: [`OuterChain`] (the
//! ordered outer blocks alone, reused as the shared outer chain of hybrid
//! covariances) and [`BlockChain`] (outer chain + exactly one central
//! block). Assembly is factory-style from configuration: every block-type
//! name resolves through the registry, each block acquires its operator via
//! exactly one of the read/calibration paths, and the configured
//! consistency gates run block by block. Any failure aborts assembly — a
//! partially assembled chain is never exposed to callers.
//!
//! Key behaviors
//! -------------
//! - `apply_outer_blocks` applies the outer blocks' forward transforms in
//!   outer-to-inner declared order (toward the central block's inner
//!   variables); `apply_outer_blocks_ad` applies the adjoints in reverse —
//!   standard adjoint-chain-rule composition.
//! - [`BlockChain::multiply`] composes `apply_outer_blocks` → central
//!   multiply → `apply_outer_blocks_ad`, the self-adjoint sandwich the
//!   owning covariance applies per component; [`BlockChain::randomize`]
//!   draws the central sample and propagates it through the adjoint pass,
//!   so samples carry the chain's covariance.
//! - The variable contract threads through assembly: each outer block may
//!   reshape toward its `inner_vars`, and the central block is constructed
//!   against the final inner contract.
//!
//! Invariants & assumptions
//! ------------------------
//! - The consistency gates use a fixed seed so every rank draws identical
//!   local test fields and reaches identical pass/fail decisions.
//! - Gate failures and configuration violations are fatal at assembly time,
//!   never deferred to first use.
use log::debug;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::blocks::errors::BlockResult;
use crate::blocks::registry::BlockRegistry;
use crate::blocks::testing::{inverse_test, self_adjoint_test};
use crate::blocks::traits::{BlockContext, CentralBlock, OuterBlock};
use crate::blocks::BlockError;
use crate::config::{BlockConfig, CovarianceConfig, HYBRID_BLOCK_NAME};
use crate::ensemble::EnsembleId;
use crate::fields::{FieldSet, Variables};

/// Fixed seed for assembly-time consistency gates; identical on every rank.
const CONSISTENCY_TEST_SEED: u64 = 0x5AB3;

/// Which consistency gates run during assembly, and their tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyPolicy {
    pub adjoint_test: bool,
    pub adjoint_tolerance: f64,
    pub inverse_test: bool,
    pub inverse_tolerance: f64,
}

impl ConsistencyPolicy {
    /// Gates as configured on a covariance description.
    pub fn from_config(cfg: &CovarianceConfig) -> Self {
        ConsistencyPolicy {
            adjoint_test: cfg.adjoint_test,
            adjoint_tolerance: cfg.adjoint_tolerance,
            inverse_test: cfg.inverse_test,
            inverse_tolerance: cfg.inverse_tolerance,
        }
    }

    /// No gates (used by tests that assemble by hand).
    pub fn disabled() -> Self {
        ConsistencyPolicy {
            adjoint_test: false,
            adjoint_tolerance: 0.0,
            inverse_test: false,
            inverse_tolerance: 0.0,
        }
    }
}

/// Ordered outer blocks, outermost first.
pub struct OuterChain {
    blocks: Vec<Box<dyn OuterBlock>>,
}

impl OuterChain {
    /// Assemble outer blocks from configuration, driving calibration and
    /// consistency gates; returns the chain and the inner variable contract
    /// it feeds.
    pub fn assemble(
        registry: &BlockRegistry, cfgs: &[BlockConfig], ctx: &BlockContext<'_>,
        policy: &ConsistencyPolicy,
    ) -> BlockResult<(Self, Variables)> {
        let mut rng = StdRng::seed_from_u64(CONSISTENCY_TEST_SEED);
        let rows = ctx.geometry.coefficient_rows();
        let mut blocks: Vec<Box<dyn OuterBlock>> = Vec::with_capacity(cfgs.len());
        let mut current_vars = ctx.vars.clone();

        for cfg in cfgs {
            let step_ctx = ctx.with_vars(&current_vars);
            let mut block = registry.create_outer(cfg, &step_ctx)?;
            populate_outer(block.as_mut(), cfg, &step_ctx)?;
            debug!("assembled outer block '{}'", block.name());

            if policy.adjoint_test {
                self_adjoint_test(
                    block.name(),
                    |fset| block.multiply(fset),
                    &current_vars,
                    rows,
                    policy.adjoint_tolerance,
                    ctx.comm,
                    &mut rng,
                )?;
            }
            if policy.inverse_test {
                inverse_test(
                    block.name(),
                    |fset| block.multiply(fset),
                    |fset| block.inverse_multiply(fset),
                    &current_vars,
                    rows,
                    policy.inverse_tolerance,
                    ctx.comm,
                    &mut rng,
                )?;
            }

            current_vars = block.inner_vars().clone();
            blocks.push(block);
        }
        Ok((OuterChain { blocks }, current_vars))
    }

    /// Forward transforms in outer-to-inner declared order.
    pub fn apply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        for block in &self.blocks {
            block.multiply(fset)?;
        }
        Ok(())
    }

    /// Adjoints in reverse (inner-to-outer) order.
    pub fn apply_ad(&self, fset: &mut FieldSet) -> BlockResult<()> {
        for block in self.blocks.iter().rev() {
            block.multiply_ad(fset)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Ordered outer blocks plus exactly one central block.
pub struct BlockChain {
    outer_vars: Variables,
    inner_vars: Variables,
    outers: OuterChain,
    central: Box<dyn CentralBlock>,
}

impl std::fmt::Debug for BlockChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockChain")
            .field("outer_vars", &self.outer_vars)
            .field("inner_vars", &self.inner_vars)
            .field("central", &self.central.name())
            .finish()
    }
}

impl BlockChain {
    /// Assemble a full (non-hybrid) chain from a covariance description.
    ///
    /// # Errors
    /// - [`BlockError::ReservedBlockName`] if the central block is the
    ///   hybrid marker — hybrids are assembled by the owning covariance.
    /// - Registry, calibration, configuration, and gate failures, each
    ///   aborting assembly entirely.
    pub fn assemble(
        registry: &BlockRegistry, cfg: &CovarianceConfig, ctx: &BlockContext<'_>,
    ) -> BlockResult<Self> {
        Self::assemble_with_policy(registry, cfg, ctx, &ConsistencyPolicy::from_config(cfg))
    }

    /// Assemble with an explicit gate policy. The owning hybrid covariance
    /// uses this to apply its top-level test flags to every component.
    pub fn assemble_with_policy(
        registry: &BlockRegistry, cfg: &CovarianceConfig, ctx: &BlockContext<'_>,
        policy: &ConsistencyPolicy,
    ) -> BlockResult<Self> {
        if cfg.is_hybrid() {
            return Err(BlockError::ReservedBlockName { name: HYBRID_BLOCK_NAME.to_string() });
        }
        let (outers, inner_vars) =
            OuterChain::assemble(registry, &cfg.outer_blocks, ctx, policy)?;

        let inner_ctx = ctx.with_vars(&inner_vars);
        let mut central = registry.create_central(&cfg.central_block, &inner_ctx)?;
        populate_central(central.as_mut(), &cfg.central_block, &inner_ctx)?;
        debug!("assembled central block '{}'", central.name());

        if policy.adjoint_test {
            let mut rng = StdRng::seed_from_u64(CONSISTENCY_TEST_SEED);
            self_adjoint_test(
                central.name(),
                |fset| central.multiply(fset),
                &inner_vars,
                ctx.geometry.coefficient_rows(),
                policy.adjoint_tolerance,
                ctx.comm,
                &mut rng,
            )?;
        }

        Ok(BlockChain { outer_vars: ctx.vars.clone(), inner_vars, outers, central })
    }

    /// Variables at the chain's outer boundary.
    pub fn outer_vars(&self) -> &Variables {
        &self.outer_vars
    }

    /// Variables the central block operates on.
    pub fn inner_vars(&self) -> &Variables {
        &self.inner_vars
    }

    /// The chain's central block.
    pub fn central(&self) -> &dyn CentralBlock {
        self.central.as_ref()
    }

    /// Forward outer transforms, outer-to-inner.
    pub fn apply_outer_blocks(&self, fset: &mut FieldSet) -> BlockResult<()> {
        self.outers.apply(fset)
    }

    /// Outer adjoints, inner-to-outer.
    pub fn apply_outer_blocks_ad(&self, fset: &mut FieldSet) -> BlockResult<()> {
        self.outers.apply_ad(fset)
    }

    /// The component covariance: outer forward → central → outer adjoint.
    pub fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        self.outers.apply(fset)?;
        self.central.multiply(fset)?;
        self.outers.apply_ad(fset)
    }

    /// Draw a sample with this chain's covariance: the central sample
    /// propagated through the outer adjoints.
    pub fn randomize(&self, fset: &mut FieldSet, rng: &mut dyn RngCore) -> BlockResult<()> {
        self.central.randomize(fset, rng)?;
        self.outers.apply_ad(fset)
    }
}

/// Drive a central block's operator source per its configuration.
fn populate_central(
    block: &mut dyn CentralBlock, cfg: &BlockConfig, ctx: &BlockContext<'_>,
) -> BlockResult<()> {
    match (&cfg.read, &cfg.calibration) {
        (Some(_), Some(_)) => Err(crate::config::ConfigError::AmbiguousOperatorSource {
            block: cfg.name.clone(),
        }
        .into()),
        (Some(read), None) => block.read(read, ctx),
        (None, Some(calibration)) => {
            let id = EnsembleId::from_index(calibration.ensemble)?;
            let members = ctx.ensemble.perturbations(id)?;
            block.direct_calibration(&members, ctx.comm)?;
            if let Some(write) = &calibration.write {
                block.write(write, ctx.comm)?;
            }
            Ok(())
        }
        (None, None) => {
            if block.state().is_ready() {
                Ok(())
            } else {
                Err(crate::config::ConfigError::MissingOperatorSource {
                    block: cfg.name.clone(),
                }
                .into())
            }
        }
    }
}

/// Drive an outer block's operator source per its configuration.
fn populate_outer(
    block: &mut dyn OuterBlock, cfg: &BlockConfig, ctx: &BlockContext<'_>,
) -> BlockResult<()> {
    match (&cfg.read, &cfg.calibration) {
        (Some(_), Some(_)) => Err(crate::config::ConfigError::AmbiguousOperatorSource {
            block: cfg.name.clone(),
        }
        .into()),
        (Some(read), None) => block.read(read, ctx),
        (None, Some(calibration)) => {
            let id = EnsembleId::from_index(calibration.ensemble)?;
            let members = ctx.ensemble.perturbations(id)?;
            block.direct_calibration(&members, ctx.comm)?;
            if let Some(write) = &calibration.write {
                block.write(write, ctx.comm)?;
            }
            Ok(())
        }
        (None, None) => {
            if block.state().is_ready() {
                Ok(())
            } else {
                Err(crate::config::ConfigError::MissingOperatorSource {
                    block: cfg.name.clone(),
                }
                .into())
            }
        }
    }
}
