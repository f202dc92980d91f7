//! The identity central block ("ID").
//!
//! Forward application is a no-op; randomization draws a unit-covariance
//! N(0, I) sample. Pairing `ID` with a square-root outer block is the
//! standard substitute when a central block's representation cannot be
//! sampled directly.
use std::fmt;

use rand::RngCore;

use crate::blocks::errors::BlockResult;
use crate::blocks::traits::{require_ready, BlockContext, BlockState, CentralBlock};
use crate::config::BlockConfig;
use crate::fields::FieldSet;

/// Identity covariance: `multiply` leaves fields untouched, `randomize`
/// fills them with independent standard-normal draws.
#[derive(Debug, Clone)]
pub struct Identity {
    state: BlockState,
}

impl Identity {
    pub fn new() -> Self {
        // The trivial operator state exists from birth.
        Identity { state: BlockState::Calibrated }
    }

    /// Registry constructor.
    pub fn make(
        _cfg: &BlockConfig, _ctx: &BlockContext<'_>,
    ) -> BlockResult<Box<dyn CentralBlock>> {
        Ok(Box::new(Identity::new()))
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::new()
    }
}

impl CentralBlock for Identity {
    fn name(&self) -> &str {
        "ID"
    }

    fn state(&self) -> BlockState {
        self.state
    }

    fn multiply(&self, _fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "multiply");
        Ok(())
    }

    fn randomize(&self, fset: &mut FieldSet, rng: &mut dyn RngCore) -> BlockResult<()> {
        require_ready(self.state, self.name(), "randomize");
        fset.fill_random(rng);
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn multiply_is_a_no_op() {
        let block = Identity::new();
        let mut fset = FieldSet::new();
        fset.insert("t", array![[1.0, -2.0], [0.5, 4.0]]).unwrap();
        let before = fset.clone();

        block.multiply(&mut fset).unwrap();

        assert_eq!(fset, before);
    }

    #[test]
    fn randomize_draws_a_fresh_sample() {
        let block = Identity::new();
        let mut fset = FieldSet::new();
        fset.insert("t", array![[0.0, 0.0], [0.0, 0.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        block.randomize(&mut fset, &mut rng).unwrap();

        assert!(fset.get("t").unwrap().iter().any(|&x| x != 0.0));
    }
}
