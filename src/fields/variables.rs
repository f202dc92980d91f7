//! Variable contracts: ordered (name, levels) declarations.
//!
//! A [`Variables`] value is the contract a block or chain exposes at one of
//! its boundaries ("outer" vs "inner" variables). Every block in a chain must
//! agree on the contract at each boundary; resolving a field set against a
//! contract reports all missing names in aggregate.
use crate::fields::errors::{FieldError, FieldResult};

/// A single named variable with a fixed number of model levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub levels: usize,
}

/// Ordered set of variables with per-variable level counts.
///
/// Invariants:
/// - Names are unique.
/// - Every variable carries at least one level.
///
/// Order is preserved from construction; it fixes the order in which blocks
/// traverse and persist per-variable operator state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Variables {
    vars: Vec<Variable>,
}

impl Variables {
    /// Build a contract from `(name, levels)` pairs.
    ///
    /// # Errors
    /// - [`FieldError::DuplicateVariable`] if a name repeats.
    /// - [`FieldError::ZeroLevels`] if any level count is zero.
    pub fn new<S: Into<String>>(pairs: impl IntoIterator<Item = (S, usize)>) -> FieldResult<Self> {
        let mut vars: Vec<Variable> = Vec::new();
        for (name, levels) in pairs {
            let name = name.into();
            if levels == 0 {
                return Err(FieldError::ZeroLevels { name });
            }
            if vars.iter().any(|v| v.name == name) {
                return Err(FieldError::DuplicateVariable { name });
            }
            vars.push(Variable { name, levels });
        }
        Ok(Variables { vars })
    }

    /// Empty contract (used by blocks with no mandatory active variables).
    pub fn empty() -> Self {
        Variables { vars: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    /// Variable names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|v| v.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v.name == name)
    }

    /// Level count for `name`, if declared.
    pub fn levels(&self, name: &str) -> Option<usize> {
        self.vars.iter().find(|v| v.name == name).map(|v| v.levels)
    }

    /// Restrict the contract to the given names, preserving this contract's
    /// declaration order and level counts.
    ///
    /// Used to resolve a block's configured active variables against the
    /// variables available at its chain position.
    ///
    /// # Errors
    /// - [`FieldError::MissingFields`] listing *every* requested name that is
    ///   not declared here.
    pub fn restrict(&self, names: &[String]) -> FieldResult<Variables> {
        let missing: Vec<String> =
            names.iter().filter(|n| !self.contains(n)).cloned().collect();
        if !missing.is_empty() {
            return Err(FieldError::MissingFields { names: missing });
        }
        let vars = self
            .vars
            .iter()
            .filter(|v| names.iter().any(|n| *n == v.name))
            .cloned()
            .collect();
        Ok(Variables { vars })
    }
}
