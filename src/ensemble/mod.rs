//! ensemble — the member ledger feeding statistical calibration.
//!
//! Purpose
//! -------
//! Track the field-set samples a calibration pass consumes, attributed to
//! either ensemble 1 (target resolution) or ensemble 2 (dual, typically
//! coarser, resolution). Members arrive one at a time through an
//! `add_member`-style call tagged with an integer index and an ensemble id;
//! a calibration pass may only start once the ledger holds exactly the
//! configured number of members.
//!
//! Conventions
//! -----------
//! - Member indices are 0-based and must arrive in order; the ledger is an
//!   append-only sequence per ensemble.
//! - [`EnsembleLedger::perturbations`] returns mean-removed copies — the form
//!   covariance estimators consume — leaving the stored members untouched.

pub mod errors;

pub use self::errors::{EnsembleError, EnsembleResult};

use crate::fields::FieldSet;

/// Which ensemble a member belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleId {
    /// Ensemble 1: target resolution.
    Target,
    /// Ensemble 2: dual (typically lower) resolution.
    Dual,
}

impl EnsembleId {
    /// Map the wire-format integer (1 or 2) onto an id.
    ///
    /// # Errors
    /// - [`EnsembleError::UnknownEnsembleId`] for any other value.
    pub fn from_index(value: u32) -> EnsembleResult<Self> {
        match value {
            1 => Ok(EnsembleId::Target),
            2 => Ok(EnsembleId::Dual),
            _ => Err(EnsembleError::UnknownEnsembleId { value }),
        }
    }
}

impl std::fmt::Display for EnsembleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleId::Target => write!(f, "ensemble 1"),
            EnsembleId::Dual => write!(f, "ensemble 2"),
        }
    }
}

/// Ordered ledger of ensemble members with configured target sizes.
#[derive(Debug, Clone, Default)]
pub struct EnsembleLedger {
    target_size: usize,
    dual_size: usize,
    target: Vec<FieldSet>,
    dual: Vec<FieldSet>,
}

impl EnsembleLedger {
    /// Ledger expecting `target_size` members of ensemble 1 and `dual_size`
    /// members of ensemble 2 (either may be zero).
    pub fn new(target_size: usize, dual_size: usize) -> Self {
        EnsembleLedger {
            target_size,
            dual_size,
            target: Vec::with_capacity(target_size),
            dual: Vec::with_capacity(dual_size),
        }
    }

    pub fn expected(&self, id: EnsembleId) -> usize {
        match id {
            EnsembleId::Target => self.target_size,
            EnsembleId::Dual => self.dual_size,
        }
    }

    pub fn held(&self, id: EnsembleId) -> usize {
        match id {
            EnsembleId::Target => self.target.len(),
            EnsembleId::Dual => self.dual.len(),
        }
    }

    /// Append member `index` of the given ensemble.
    ///
    /// # Errors
    /// - [`EnsembleError::MemberOutOfOrder`] if `index` is not the next slot.
    /// - [`EnsembleError::LedgerFull`] if the configured size is already met.
    pub fn add_member(
        &mut self, member: FieldSet, index: usize, id: EnsembleId,
    ) -> EnsembleResult<()> {
        let expected = self.expected(id);
        let held = self.held(id);
        if held == expected {
            return Err(EnsembleError::LedgerFull { id, size: expected });
        }
        if index != held {
            return Err(EnsembleError::MemberOutOfOrder { id, expected: held, actual: index });
        }
        match id {
            EnsembleId::Target => self.target.push(member),
            EnsembleId::Dual => self.dual.push(member),
        }
        Ok(())
    }

    pub fn is_complete(&self, id: EnsembleId) -> bool {
        self.held(id) == self.expected(id)
    }

    /// Borrow the members of one ensemble; the ledger must be complete.
    ///
    /// # Errors
    /// - [`EnsembleError::Incomplete`] with the configured and held counts.
    pub fn members(&self, id: EnsembleId) -> EnsembleResult<&[FieldSet]> {
        if !self.is_complete(id) {
            return Err(EnsembleError::Incomplete {
                id,
                expected: self.expected(id),
                actual: self.held(id),
            });
        }
        Ok(match id {
            EnsembleId::Target => &self.target,
            EnsembleId::Dual => &self.dual,
        })
    }

    /// Mean-removed copies of one ensemble's members.
    ///
    /// # Errors
    /// - [`EnsembleError::Incomplete`] if the ledger is not complete.
    /// - [`EnsembleError::TooFewMembers`] if fewer than two members are
    ///   configured (no perturbation can be formed).
    pub fn perturbations(&self, id: EnsembleId) -> EnsembleResult<Vec<FieldSet>> {
        let members = self.members(id)?;
        if members.len() < 2 {
            return Err(EnsembleError::TooFewMembers { id, actual: members.len() });
        }
        let mut mean = members[0].clone();
        for member in &members[1..] {
            mean.add(member).map_err(|_| EnsembleError::InconsistentMembers { id })?;
        }
        mean.scale(1.0 / members.len() as f64);

        let mut perts = Vec::with_capacity(members.len());
        for member in members {
            let mut pert = member.clone();
            pert.axpy(-1.0, &mean).map_err(|_| EnsembleError::InconsistentMembers { id })?;
            perts.push(pert);
        }
        Ok(perts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Ledger ordering/size discipline and perturbation extraction. The
    // statistics computed FROM perturbations are covered in spectral::estimator.
    // -------------------------------------------------------------------------

    fn member(v: f64) -> FieldSet {
        let mut fset = FieldSet::new();
        fset.insert("t", array![[v, 2.0 * v]]).unwrap();
        fset
    }

    #[test]
    fn add_member_enforces_order_and_capacity() {
        let mut ledger = EnsembleLedger::new(2, 0);
        assert_eq!(
            ledger.add_member(member(1.0), 1, EnsembleId::Target),
            Err(EnsembleError::MemberOutOfOrder {
                id: EnsembleId::Target,
                expected: 0,
                actual: 1
            })
        );
        ledger.add_member(member(1.0), 0, EnsembleId::Target).unwrap();
        ledger.add_member(member(3.0), 1, EnsembleId::Target).unwrap();
        assert_eq!(
            ledger.add_member(member(5.0), 2, EnsembleId::Target),
            Err(EnsembleError::LedgerFull { id: EnsembleId::Target, size: 2 })
        );
    }

    #[test]
    fn members_requires_a_complete_ledger() {
        let mut ledger = EnsembleLedger::new(2, 1);
        ledger.add_member(member(1.0), 0, EnsembleId::Target).unwrap();
        let err = ledger.members(EnsembleId::Target).unwrap_err();
        assert_eq!(
            err,
            EnsembleError::Incomplete { id: EnsembleId::Target, expected: 2, actual: 1 }
        );
        // The dual ensemble is independent of the target one.
        ledger.add_member(member(9.0), 0, EnsembleId::Dual).unwrap();
        assert!(ledger.members(EnsembleId::Dual).is_ok());
    }

    #[test]
    fn perturbations_remove_the_ensemble_mean() {
        let mut ledger = EnsembleLedger::new(2, 0);
        ledger.add_member(member(1.0), 0, EnsembleId::Target).unwrap();
        ledger.add_member(member(3.0), 1, EnsembleId::Target).unwrap();

        let perts = ledger.perturbations(EnsembleId::Target).unwrap();

        assert_eq!(perts.len(), 2);
        assert_relative_eq!(perts[0].get("t").unwrap()[[0, 0]], -1.0, epsilon = 1e-12);
        assert_relative_eq!(perts[1].get("t").unwrap()[[0, 0]], 1.0, epsilon = 1e-12);
        // Perturbations sum to zero entry-wise.
        assert_relative_eq!(
            perts[0].get("t").unwrap()[[0, 1]] + perts[1].get("t").unwrap()[[0, 1]],
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn ensemble_id_wire_mapping() {
        assert_eq!(EnsembleId::from_index(1), Ok(EnsembleId::Target));
        assert_eq!(EnsembleId::from_index(2), Ok(EnsembleId::Dual));
        assert_eq!(
            EnsembleId::from_index(3),
            Err(EnsembleError::UnknownEnsembleId { value: 3 })
        );
    }
}
