//! Errors for field containers (variable contracts, shape checks, and
//! aggregate missing-field reporting).
//!
//! Conventions:
//! - **Missing fields are reported in aggregate**: operations that resolve a
//!   set of variable names against a [`FieldSet`](crate::fields::FieldSet)
//!   collect *all* unmatched names into a single
//!   [`FieldError::MissingFields`] so one run surfaces every gap at once.
//! - Shape violations name the offending field and both shapes.

/// Result alias for field-container operations that may produce [`FieldError`].
pub type FieldResult<T> = Result<T, FieldError>;

/// Unified error type for field sets and variable contracts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// One or more required fields are absent; all names reported at once.
    MissingFields { names: Vec<String> },

    /// A field with this name is already present in the field set.
    DuplicateField { name: String },

    /// A variable with this name is already declared.
    DuplicateVariable { name: String },

    /// A variable must carry at least one model level.
    ZeroLevels { name: String },

    /// Field data does not match the declared (rows, levels) shape.
    ShapeMismatch { name: String, expected: (usize, usize), actual: (usize, usize) },

    /// Two field sets that must share a variable contract do not.
    ContractMismatch { left: Vec<String>, right: Vec<String> },

    /// The operation requires a non-empty field set.
    EmptyFieldSet,
}

impl std::error::Error for FieldError {}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::MissingFields { names } => {
                write!(f, "Fields remain unfilled: [{}]", names.join(", "))
            }
            FieldError::DuplicateField { name } => {
                write!(f, "Field '{name}' is already present in the field set.")
            }
            FieldError::DuplicateVariable { name } => {
                write!(f, "Variable '{name}' is declared more than once.")
            }
            FieldError::ZeroLevels { name } => {
                write!(f, "Variable '{name}' must have at least one level.")
            }
            FieldError::ShapeMismatch { name, expected, actual } => {
                write!(
                    f,
                    "Field '{name}' has shape {actual:?}; expected {expected:?} (rows, levels)."
                )
            }
            FieldError::ContractMismatch { left, right } => {
                write!(
                    f,
                    "Field sets do not share a variable contract: [{}] vs [{}]",
                    left.join(", "),
                    right.join(", ")
                )
            }
            FieldError::EmptyFieldSet => {
                write!(f, "Operation requires a non-empty field set.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Display formatting of the aggregate missing-field report and of shape
    // mismatches; everything else is a plain structured variant.
    // -------------------------------------------------------------------------

    #[test]
    fn missing_fields_lists_every_name_in_one_message() {
        let err = FieldError::MissingFields {
            names: vec!["temperature".to_string(), "vorticity".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("temperature"));
        assert!(msg.contains("vorticity"));
    }

    #[test]
    fn shape_mismatch_names_field_and_both_shapes() {
        let err = FieldError::ShapeMismatch {
            name: "psi".to_string(),
            expected: (10, 3),
            actual: (10, 2),
        };
        let msg = err.to_string();
        assert!(msg.contains("psi"));
        assert!(msg.contains("(10, 3)"));
        assert!(msg.contains("(10, 2)"));
    }
}
