//! blocks::registry — explicit name → constructor maps for block assembly.
//!
//! Purpose
//! -------
//! Map symbolic block-type names to constructors so chains can be assembled
//! from declarative configuration. The registry is an explicit object built
//! once at process start and passed by reference into assembly code — no
//! global mutable state. Registration is idempotent-checked (duplicates are
//! fatal) and order-independent; unknown-name lookup is a fatal configuration
//! error surfaced at assembly time, not deferred to first use.
use std::collections::BTreeMap;

use log::debug;

use crate::blocks::errors::{BlockError, BlockKind, BlockResult};
use crate::blocks::identity::Identity;
use crate::blocks::stddev::StdDev;
use crate::blocks::traits::{BlockContext, CentralBlock, OuterBlock};
use crate::config::{BlockConfig, HYBRID_BLOCK_NAME};
use crate::spectral::correlation::SpectralCorrelation;
use crate::spectral::covariance::SpectralCovariance;

/// Constructor signature for central blocks.
pub type CentralConstructor =
    fn(&BlockConfig, &BlockContext<'_>) -> BlockResult<Box<dyn CentralBlock>>;

/// Constructor signature for outer blocks.
pub type OuterConstructor =
    fn(&BlockConfig, &BlockContext<'_>) -> BlockResult<Box<dyn OuterBlock>>;

/// Name → constructor maps for central and outer blocks.
pub struct BlockRegistry {
    central: BTreeMap<String, CentralConstructor>,
    outer: BTreeMap<String, OuterConstructor>,
}

impl BlockRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        BlockRegistry { central: BTreeMap::new(), outer: BTreeMap::new() }
    }

    /// Registry holding the blocks shipped with this crate.
    ///
    /// Central: `"ID"`, `"spectral covariance"`, `"spectral correlation"`.
    /// Outer: `"StdDev"`.
    pub fn with_defaults() -> Self {
        let mut registry = BlockRegistry::new();
        // Names are distinct by construction; registration cannot fail here.
        registry.register_central("ID", Identity::make).unwrap();
        registry.register_central("spectral covariance", SpectralCovariance::make).unwrap();
        registry.register_central("spectral correlation", SpectralCorrelation::make).unwrap();
        registry.register_outer("StdDev", StdDev::make).unwrap();
        registry
    }

    /// Register a central-block constructor under `name`.
    ///
    /// # Errors
    /// - [`BlockError::ReservedBlockName`] for the hybrid name.
    /// - [`BlockError::DuplicateBlockName`] if `name` is taken.
    pub fn register_central(
        &mut self, name: impl Into<String>, ctor: CentralConstructor,
    ) -> BlockResult<()> {
        let name = name.into();
        check_name(&name, self.central.contains_key(&name), BlockKind::Central)?;
        debug!("registered central block '{name}'");
        self.central.insert(name, ctor);
        Ok(())
    }

    /// Register an outer-block constructor under `name`.
    ///
    /// # Errors
    /// Same policy as [`BlockRegistry::register_central`].
    pub fn register_outer(
        &mut self, name: impl Into<String>, ctor: OuterConstructor,
    ) -> BlockResult<()> {
        let name = name.into();
        check_name(&name, self.outer.contains_key(&name), BlockKind::Outer)?;
        debug!("registered outer block '{name}'");
        self.outer.insert(name, ctor);
        Ok(())
    }

    /// Construct the central block named in `cfg`.
    ///
    /// # Errors
    /// - [`BlockError::UnknownBlockName`] if no constructor is registered.
    /// - Whatever the constructor itself reports.
    pub fn create_central(
        &self, cfg: &BlockConfig, ctx: &BlockContext<'_>,
    ) -> BlockResult<Box<dyn CentralBlock>> {
        let ctor = self.central.get(&cfg.name).ok_or_else(|| BlockError::UnknownBlockName {
            name: cfg.name.clone(),
            kind: BlockKind::Central,
        })?;
        ctor(cfg, ctx)
    }

    /// Construct the outer block named in `cfg` (same policy as
    /// [`BlockRegistry::create_central`]).
    pub fn create_outer(
        &self, cfg: &BlockConfig, ctx: &BlockContext<'_>,
    ) -> BlockResult<Box<dyn OuterBlock>> {
        let ctor = self.outer.get(&cfg.name).ok_or_else(|| BlockError::UnknownBlockName {
            name: cfg.name.clone(),
            kind: BlockKind::Outer,
        })?;
        ctor(cfg, ctx)
    }

    /// Registered central-block names (sorted).
    pub fn central_names(&self) -> Vec<&str> {
        self.central.keys().map(String::as_str).collect()
    }

    /// Registered outer-block names (sorted).
    pub fn outer_names(&self) -> Vec<&str> {
        self.outer.keys().map(String::as_str).collect()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        BlockRegistry::with_defaults()
    }
}

fn check_name(name: &str, taken: bool, kind: BlockKind) -> BlockResult<()> {
    if name == HYBRID_BLOCK_NAME {
        return Err(BlockError::ReservedBlockName { name: name.to_string() });
    }
    if taken {
        return Err(BlockError::DuplicateBlockName { name: name.to_string(), kind });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::errors::BlockKind;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Registry bookkeeping in isolation from any chain: duplicate and
    // reserved-name rejection, unknown-name lookup, and the default
    // registrations. Block construction semantics are covered next to each
    // block.
    // -------------------------------------------------------------------------

    #[test]
    fn defaults_register_the_shipped_blocks() {
        let registry = BlockRegistry::with_defaults();
        assert_eq!(
            registry.central_names(),
            ["ID", "spectral correlation", "spectral covariance"]
        );
        assert_eq!(registry.outer_names(), ["StdDev"]);
    }

    #[test]
    fn duplicate_registration_is_fatal() {
        let mut registry = BlockRegistry::with_defaults();
        let err = registry.register_central("ID", Identity::make).unwrap_err();
        assert_eq!(
            err,
            BlockError::DuplicateBlockName { name: "ID".to_string(), kind: BlockKind::Central }
        );
    }

    #[test]
    fn hybrid_name_is_reserved_in_both_maps() {
        let mut registry = BlockRegistry::new();
        assert_eq!(
            registry.register_central("Hybrid", Identity::make),
            Err(BlockError::ReservedBlockName { name: "Hybrid".to_string() })
        );
        assert_eq!(
            registry.register_outer("Hybrid", StdDev::make),
            Err(BlockError::ReservedBlockName { name: "Hybrid".to_string() })
        );
    }

    #[test]
    fn unknown_name_lookup_is_fatal_at_assembly_time() {
        use crate::config::BlockConfig;
        use crate::ensemble::EnsembleLedger;
        use crate::fields::Variables;
        use crate::parallel::SerialComm;
        use crate::spectral::geometry::SpectralGeometry;

        let registry = BlockRegistry::with_defaults();
        let geometry = SpectralGeometry::new(3);
        let vars = Variables::new([("t", 2)]).unwrap();
        let comm = SerialComm;
        let ensemble = EnsembleLedger::new(0, 0);
        let ctx =
            BlockContext { geometry: &geometry, vars: &vars, comm: &comm, ensemble: &ensemble };

        let err = registry.create_central(&BlockConfig::named("no such block"), &ctx).unwrap_err();
        assert_eq!(
            err,
            BlockError::UnknownBlockName {
                name: "no such block".to_string(),
                kind: BlockKind::Central
            }
        );
    }
}
