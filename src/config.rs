//! config — declarative covariance configuration.
//!
//! Purpose
//! -------
//! Describe a covariance operator as data: one central block (possibly the
//! reserved hybrid combination of named components) plus zero or more outer
//! blocks, consistency-test switches and tolerances, and per-block operator
//! sources (read from file vs calibrate from an ensemble). The structs here
//! deserialize from JSON via serde and are validated at assembly time; all
//! violations are fatal configuration errors, never deferred to first use.
//!
//! Conventions
//! -----------
//! - A block is selected by its symbolic registry name (e.g. `"ID"`,
//!   `"spectral correlation"`). The name [`HYBRID_BLOCK_NAME`] is reserved:
//!   it never reaches the registry and instead switches assembly into the
//!   hybrid path with a `components` list.
//! - `read` and `calibration` are mutually exclusive within one block
//!   invocation; which one a block requires is the block's own contract.
//! - Weights carry a scalar `value` and/or a per-field weight `file`; both
//!   are optional, both apply when both are present, and the scalar defaults
//!   to 1.0.
use std::path::PathBuf;

use serde::Deserialize;

/// Reserved central-block name selecting the hybrid combination path.
pub const HYBRID_BLOCK_NAME: &str = "Hybrid";

/// Result alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fatal configuration errors, surfaced at assembly time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A block declared both `read` and `calibration` sections.
    AmbiguousOperatorSource { block: String },

    /// A block that needs an operator source declared neither section.
    MissingOperatorSource { block: String },

    /// A hybrid central block must carry at least one component.
    EmptyComponents,

    /// Scalar weights must be finite and non-negative (their square root is
    /// stored).
    InvalidWeight { value: f64 },

    /// The configuration document could not be deserialized.
    Parse { detail: String },
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::AmbiguousOperatorSource { block } => {
                write!(
                    f,
                    "Block '{block}' declares both 'read' and 'calibration'; they are mutually \
                     exclusive within one invocation."
                )
            }
            ConfigError::MissingOperatorSource { block } => {
                write!(
                    f,
                    "Block '{block}' requires either a 'read' or a 'calibration' section."
                )
            }
            ConfigError::EmptyComponents => {
                write!(f, "Hybrid covariance requires at least one component.")
            }
            ConfigError::InvalidWeight { value } => {
                write!(f, "Component weight must be finite and >= 0; got: {value}")
            }
            ConfigError::Parse { detail } => {
                write!(f, "Configuration parse failure: {detail}")
            }
        }
    }
}

/// Top-level covariance description: central block, outer blocks, tests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CovarianceConfig {
    /// Central block; name `"Hybrid"` switches to the component path.
    pub central_block: BlockConfig,

    /// Outer blocks in outer-to-inner order. For a hybrid covariance these
    /// form the shared outer chain applied to all components.
    #[serde(default)]
    pub outer_blocks: Vec<BlockConfig>,

    /// Run the self-adjointness test on every assembled block.
    #[serde(default)]
    pub adjoint_test: bool,

    /// Relative tolerance for the self-adjointness test.
    #[serde(default = "default_test_tolerance")]
    pub adjoint_tolerance: f64,

    /// Run the inverse round-trip test on every invertible outer block.
    #[serde(default)]
    pub inverse_test: bool,

    /// Relative tolerance for the inverse test.
    #[serde(default = "default_test_tolerance")]
    pub inverse_tolerance: f64,
}

fn default_test_tolerance() -> f64 {
    1.0e-12
}

impl CovarianceConfig {
    /// Parse a covariance configuration from a JSON document.
    ///
    /// # Errors
    /// - [`ConfigError::Parse`] with the deserializer's message.
    pub fn from_json_str(doc: &str) -> ConfigResult<Self> {
        serde_json::from_str(doc).map_err(|e| ConfigError::Parse { detail: e.to_string() })
    }

    /// Whether the central block selects the hybrid combination path.
    pub fn is_hybrid(&self) -> bool {
        self.central_block.name == HYBRID_BLOCK_NAME
    }
}

/// Configuration of a single block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    /// Symbolic registry name.
    pub name: String,

    /// Restrict the block to these variables (default: all variables at its
    /// chain position).
    #[serde(default)]
    pub active_vars: Option<Vec<String>>,

    /// Load the internal operator from a persisted file.
    #[serde(default)]
    pub read: Option<ReadConfig>,

    /// Estimate the internal operator from an ensemble.
    #[serde(default)]
    pub calibration: Option<CalibrationConfig>,

    /// Hybrid components; only meaningful when `name == "Hybrid"`.
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl BlockConfig {
    /// Minimal block configuration carrying only a registry name.
    pub fn named(name: impl Into<String>) -> Self {
        BlockConfig {
            name: name.into(),
            active_vars: None,
            read: None,
            calibration: None,
            components: Vec::new(),
        }
    }

    /// Resolve the operator source for a block that requires one.
    ///
    /// # Errors
    /// - [`ConfigError::AmbiguousOperatorSource`] if both sections are present.
    /// - [`ConfigError::MissingOperatorSource`] if neither is.
    pub fn require_operator_source(&self) -> ConfigResult<OperatorSource<'_>> {
        match (&self.read, &self.calibration) {
            (Some(_), Some(_)) => {
                Err(ConfigError::AmbiguousOperatorSource { block: self.name.clone() })
            }
            (Some(read), None) => Ok(OperatorSource::Read(read)),
            (None, Some(cal)) => Ok(OperatorSource::Calibrate(cal)),
            (None, None) => Err(ConfigError::MissingOperatorSource { block: self.name.clone() }),
        }
    }
}

/// Which source populates a block's internal operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorSource<'a> {
    Read(&'a ReadConfig),
    Calibrate(&'a CalibrationConfig),
}

/// File-based operator source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadConfig {
    pub file_path: PathBuf,
}

/// Ensemble-based operator source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Which ensemble feeds the calibration: 1 (target) or 2 (dual).
    #[serde(default = "default_ensemble_id")]
    pub ensemble: u32,

    /// Persist the calibrated operator after the pass.
    #[serde(default)]
    pub write: Option<WriteConfig>,
}

fn default_ensemble_id() -> u32 {
    1
}

/// Persistence target for a calibrated operator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteConfig {
    pub file_path: PathBuf,
}

/// One component of a hybrid covariance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub covariance: CovarianceConfig,
    pub weight: WeightConfig,
}

/// Component weight: scalar and/or per-field file, both optional.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightConfig {
    #[serde(default)]
    pub value: Option<f64>,

    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl WeightConfig {
    /// Validated scalar weight; defaults to 1.0 when absent.
    ///
    /// # Errors
    /// - [`ConfigError::InvalidWeight`] if the value is negative or not
    ///   finite.
    pub fn scalar(&self) -> ConfigResult<f64> {
        let w = self.value.unwrap_or(1.0);
        if !w.is_finite() || w < 0.0 {
            return Err(ConfigError::InvalidWeight { value: w });
        }
        Ok(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // JSON wire format (defaults, nesting, unknown-field rejection) and the
    // operator-source / weight validation helpers. Assembly-time semantics of
    // these values are covered in `chains` and `covariance`.
    // -------------------------------------------------------------------------

    #[test]
    fn parses_minimal_plain_covariance() {
        let cfg = CovarianceConfig::from_json_str(
            r#"{ "central_block": { "name": "ID" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.central_block.name, "ID");
        assert!(!cfg.is_hybrid());
        assert!(cfg.outer_blocks.is_empty());
        assert!(!cfg.adjoint_test);
        assert_eq!(cfg.adjoint_tolerance, 1.0e-12);
    }

    #[test]
    fn parses_hybrid_with_components_and_weights() {
        let doc = r#"{
            "central_block": {
                "name": "Hybrid",
                "components": [
                    {
                        "covariance": { "central_block": { "name": "ID" } },
                        "weight": { "value": 0.3 }
                    },
                    {
                        "covariance": {
                            "central_block": {
                                "name": "spectral covariance",
                                "calibration": { "ensemble": 1 }
                            }
                        },
                        "weight": { "value": 0.7 }
                    }
                ]
            },
            "outer_blocks": [ { "name": "StdDev", "calibration": {} } ],
            "adjoint_test": true,
            "adjoint_tolerance": 1e-10
        }"#;
        let cfg = CovarianceConfig::from_json_str(doc).unwrap();
        assert!(cfg.is_hybrid());
        assert_eq!(cfg.central_block.components.len(), 2);
        assert_eq!(cfg.central_block.components[1].weight.scalar().unwrap(), 0.7);
        assert_eq!(cfg.outer_blocks[0].calibration.as_ref().unwrap().ensemble, 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = CovarianceConfig::from_json_str(
            r#"{ "central_block": { "name": "ID", "tollerance": 1.0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn operator_source_is_mutually_exclusive() {
        let mut block = BlockConfig::named("spectral covariance");
        assert_eq!(
            block.require_operator_source(),
            Err(ConfigError::MissingOperatorSource {
                block: "spectral covariance".to_string()
            })
        );

        block.read = Some(ReadConfig { file_path: "stats.json".into() });
        assert!(matches!(block.require_operator_source(), Ok(OperatorSource::Read(_))));

        block.calibration = Some(CalibrationConfig { ensemble: 1, write: None });
        assert_eq!(
            block.require_operator_source(),
            Err(ConfigError::AmbiguousOperatorSource {
                block: "spectral covariance".to_string()
            })
        );
    }

    #[test]
    fn weights_default_to_one_and_reject_negatives() {
        assert_eq!(WeightConfig::default().scalar().unwrap(), 1.0);
        let w = WeightConfig { value: Some(-0.1), file: None };
        assert_eq!(w.scalar(), Err(ConfigError::InvalidWeight { value: -0.1 }));
    }
}
