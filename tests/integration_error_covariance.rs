//! Integration tests for covariance assembly and application.
//!
//! Purpose
//! -------
//! - Validate the end-to-end pipeline: JSON configuration → registry-driven
//!   block assembly → ensemble calibration with consistency gates →
//!   multiply / randomize / iterative inverse.
//! - Exercise realistic shapes: two variables with different level counts,
//!   a hybrid of a calibrated spectral covariance and an identity
//!   component behind a shared standard-deviation outer chain, and both
//!   ensembles of the ledger (target for the spectral statistics, dual
//!   resolution for the outer scaling).
//!
//! Coverage
//! --------
//! - `config`: JSON wire format including nested hybrid components and
//!   dynamic file paths.
//! - `covariance::ErrorCovariance`: hybrid multiply/randomize/inverse with
//!   gates enabled.
//! - `spectral`: calibrate → write → read equivalence of the persisted
//!   operator.
//! - Aggregate missing-field reporting through assembly.
//!
//! Exclusions
//! ----------
//! - Fine-grained numerics of individual blocks and the solver — covered by
//!   unit tests next to each module.
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use rust_covariance::prelude::*;

const ROWS_SEED: u64 = 4242;

fn vars() -> Variables {
    Variables::new([("temperature", 2), ("vorticity", 3)]).unwrap()
}

/// Ledger with a 4-member random target ensemble (spectral statistics) and
/// a 2-member constant-magnitude dual ensemble (σ = 3√2 everywhere).
fn ledger(geometry: &SpectralGeometry) -> EnsembleLedger {
    let rows = geometry.coefficient_rows();
    let v = vars();
    let mut ledger = EnsembleLedger::new(4, 2);

    let mut rng = StdRng::seed_from_u64(ROWS_SEED);
    for index in 0..4 {
        let member = FieldSet::random(&v, rows, &mut rng);
        ledger.add_member(member, index, EnsembleId::Target).unwrap();
    }
    for (index, sign) in [1.0_f64, -1.0].iter().enumerate() {
        let mut member = FieldSet::new();
        for var in v.iter() {
            member
                .insert(var.name.clone(), Array2::from_elem((rows, var.levels), sign * 3.0))
                .unwrap();
        }
        ledger.add_member(member, index, EnsembleId::Dual).unwrap();
    }
    ledger
}

fn hybrid_doc() -> String {
    r#"{
        "central_block": {
            "name": "Hybrid",
            "components": [
                {
                    "covariance": {
                        "central_block": {
                            "name": "spectral covariance",
                            "calibration": { "ensemble": 1 }
                        }
                    },
                    "weight": { "value": 0.6 }
                },
                {
                    "covariance": { "central_block": { "name": "ID" } },
                    "weight": { "value": 0.4 }
                }
            ]
        },
        "outer_blocks": [ { "name": "StdDev", "calibration": { "ensemble": 2 } } ],
        "adjoint_test": true,
        "adjoint_tolerance": 1e-10,
        "inverse_test": true,
        "inverse_tolerance": 1e-10
    }"#
    .to_string()
}

#[test]
fn hybrid_covariance_assembles_and_applies_from_json() {
    let geometry = SpectralGeometry::new(3);
    let comm = SerialComm;
    let ensemble = ledger(&geometry);
    let v = vars();
    let ctx = BlockContext { geometry: &geometry, vars: &v, comm: &comm, ensemble: &ensemble };
    let registry = BlockRegistry::with_defaults();

    let cfg = CovarianceConfig::from_json_str(&hybrid_doc()).unwrap();
    assert!(cfg.is_hybrid());
    // Assembly runs the adjoint and inverse gates; reaching Ok means every
    // block passed them.
    let cov = ErrorCovariance::assemble(&registry, &cfg, &ctx).unwrap();
    assert_eq!(cov.num_components(), 2);

    // multiply: nonzero in, nonzero out, and self-adjoint as combined.
    let mut rng = StdRng::seed_from_u64(7);
    let x = FieldSet::random(&v, geometry.coefficient_rows(), &mut rng);
    let y = FieldSet::random(&v, geometry.coefficient_rows(), &mut rng);
    let mut bx = x.clone();
    let mut by = y.clone();
    cov.multiply(&mut bx).unwrap();
    cov.multiply(&mut by).unwrap();
    let dp1 = bx.dot_product(&y, &comm).unwrap();
    let dp2 = by.dot_product(&x, &comm).unwrap();
    let relative = (dp1 - dp2).abs() / (0.5 * (dp1 + dp2)).abs();
    assert!(relative < 1.0e-10, "combined operator lost self-adjointness: {relative}");

    // randomize: a fresh sample over the full contract.
    let mut sample = FieldSet::zeros(&v, geometry.coefficient_rows());
    cov.randomize(&mut sample, &mut rng).unwrap();
    assert!(sample.get("temperature").unwrap().iter().any(|&e| e != 0.0));
    assert!(sample.get("vorticity").unwrap().iter().any(|&e| e != 0.0));

    // iterative inverse: round-trips multiply. The solver stops on a 1e-3
    // relative residual; the error norm carries an extra condition-number
    // factor, so assert one order looser.
    let mut fset = x.clone();
    cov.multiply(&mut fset).unwrap();
    cov.inverse_multiply(&mut fset, &comm).unwrap();
    let mut diff = fset.clone();
    diff.axpy(-1.0, &x).unwrap();
    let err = diff.dot_product(&diff, &comm).unwrap().sqrt()
        / x.dot_product(&x, &comm).unwrap().sqrt();
    assert!(err < 1.0e-2, "inverse round-trip error too large: {err}");
}

#[test]
fn calibrate_write_read_reproduces_the_operator() {
    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("vertical_covariance.json");

    let geometry = SpectralGeometry::new(2);
    let comm = SerialComm;
    let ensemble = ledger(&geometry);
    let v = vars();
    let ctx = BlockContext { geometry: &geometry, vars: &v, comm: &comm, ensemble: &ensemble };
    let registry = BlockRegistry::with_defaults();

    // Pass 1: calibrate from the target ensemble and persist.
    let calibrate_doc = format!(
        r#"{{
            "central_block": {{
                "name": "spectral covariance",
                "calibration": {{
                    "ensemble": 1,
                    "write": {{ "file_path": "{path}" }}
                }}
            }}
        }}"#,
        path = stats_path.display()
    );
    let cfg = CovarianceConfig::from_json_str(&calibrate_doc).unwrap();
    let calibrated = ErrorCovariance::assemble(&registry, &cfg, &ctx).unwrap();

    // Pass 2: a fresh covariance loading the persisted operator.
    let read_doc = format!(
        r#"{{
            "central_block": {{
                "name": "spectral covariance",
                "read": {{ "file_path": "{path}" }}
            }}
        }}"#,
        path = stats_path.display()
    );
    let cfg = CovarianceConfig::from_json_str(&read_doc).unwrap();
    let loaded = ErrorCovariance::assemble(&registry, &cfg, &ctx).unwrap();

    let mut rng = StdRng::seed_from_u64(77);
    let input = FieldSet::random(&v, geometry.coefficient_rows(), &mut rng);
    let mut a = input.clone();
    let mut b = input;
    calibrated.multiply(&mut a).unwrap();
    loaded.multiply(&mut b).unwrap();

    assert_eq!(a, b, "persisted operator must reproduce the calibrated one");
}

#[test]
fn assembly_reports_every_missing_active_variable_at_once() {
    let geometry = SpectralGeometry::new(1);
    let comm = SerialComm;
    let ensemble = ledger(&geometry);
    let v = vars();
    let ctx = BlockContext { geometry: &geometry, vars: &v, comm: &comm, ensemble: &ensemble };
    let registry = BlockRegistry::with_defaults();

    // Two of the three requested active variables are not in the contract;
    // both must appear in one failure.
    let doc = r#"{
        "central_block": {
            "name": "spectral covariance",
            "active_vars": ["temperature", "humidity", "ozone"],
            "calibration": { "ensemble": 1 }
        }
    }"#;
    let cfg = CovarianceConfig::from_json_str(doc).unwrap();
    let err = ErrorCovariance::assemble(&registry, &cfg, &ctx).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("humidity"), "missing report lacks 'humidity': {msg}");
    assert!(msg.contains("ozone"), "missing report lacks 'ozone': {msg}");
}

#[test]
fn unknown_and_sourceless_blocks_fail_at_assembly_time() {
    let geometry = SpectralGeometry::new(1);
    let comm = SerialComm;
    let ensemble = ledger(&geometry);
    let v = vars();
    let ctx = BlockContext { geometry: &geometry, vars: &v, comm: &comm, ensemble: &ensemble };
    let registry = BlockRegistry::with_defaults();

    let doc = r#"{ "central_block": { "name": "fastlam" } }"#;
    let cfg = CovarianceConfig::from_json_str(doc).unwrap();
    let err = ErrorCovariance::assemble(&registry, &cfg, &ctx).unwrap_err();
    assert!(err.to_string().contains("not a registered central block"));

    // A spectral covariance with neither read nor calibration never becomes
    // ready; assembly refuses to expose it.
    let doc = r#"{ "central_block": { "name": "spectral covariance" } }"#;
    let cfg = CovarianceConfig::from_json_str(doc).unwrap();
    let err = ErrorCovariance::assemble(&registry, &cfg, &ctx).unwrap_err();
    assert!(err.to_string().contains("requires either a 'read' or a 'calibration'"));
}
