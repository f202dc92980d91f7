//! spectral::io — the self-describing persisted-operator format.
//!
//! Purpose
//! -------
//! Persist and reload per-variable vertical tensors as a self-describing
//! array file (JSON stands in for the NetCDF container, which is outside
//! this crate): named dimensions `{"total wavenumber", "model levels 1",
//! "model levels 2"}`, one variable per active field with the operator
//! suffix appended to its name, and the sample count carried as a file
//! attribute.
//!
//! Rank discipline: statistics are already globally reduced when they reach
//! this layer (see `spectral::estimator`), every rank calls the write entry
//! point identically, and only the root rank touches the filesystem.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;
use crate::spectral::errors::{SpectralError, SpectralResult};
use crate::spectral::estimator::VerticalStatistics;
use crate::spectral::geometry::SpectralGeometry;

pub const DIM_TOTAL_WAVENUMBER: &str = "total wavenumber";
pub const DIM_MODEL_LEVELS_1: &str = "model levels 1";
pub const DIM_MODEL_LEVELS_2: &str = "model levels 2";
pub const DIM_HORIZONTAL_POINTS: &str = "horizontal points";
pub const DIM_MODEL_LEVELS: &str = "model levels";

/// Variable-name suffix for persisted raw covariance sums.
pub const COVARIANCE_SUFFIX: &str = " spectral vertical covariance";
/// Variable-name suffix for persisted correlations.
pub const CORRELATION_SUFFIX: &str = " spectral vertical correlation";
/// File attribute carrying the calibration sample count.
pub const SAMPLES_ATTRIBUTE: &str = "covariance samples";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dimension {
    name: String,
    size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArrayVariable {
    name: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// On-disk document: declared dimensions, attributes, variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArrayFile {
    dims: Vec<Dimension>,
    attributes: BTreeMap<String, u64>,
    variables: Vec<ArrayVariable>,
}

fn persistence_err(path: &Path, detail: impl ToString) -> SpectralError {
    SpectralError::Persistence { path: path.to_path_buf(), detail: detail.to_string() }
}

/// Write per-variable vertical tensors with the given suffix.
///
/// Every rank must reach this call; only the root rank writes. The declared
/// dimensions take their sizes from the first variable, as the persisted
/// format prescribes; each variable additionally records its own shape.
///
/// # Errors
/// - [`SpectralError::Persistence`] on an empty tensor list or any
///   filesystem/serialization failure.
pub fn write_vertical_tensors<'a>(
    path: &Path, suffix: &str, tensors: impl Iterator<Item = (&'a str, &'a Array3<f64>)>,
    samples: usize, comm: &dyn Communicator,
) -> SpectralResult<()> {
    let tensors: Vec<(&str, &Array3<f64>)> = tensors.collect();
    if tensors.is_empty() {
        return Err(persistence_err(path, "no variables to write"));
    }
    if !comm.is_root() {
        return Ok(());
    }

    let (bins, levels1, levels2) = tensors[0].1.dim();
    let dims = vec![
        Dimension { name: DIM_TOTAL_WAVENUMBER.to_string(), size: bins },
        Dimension { name: DIM_MODEL_LEVELS_1.to_string(), size: levels1 },
        Dimension { name: DIM_MODEL_LEVELS_2.to_string(), size: levels2 },
    ];
    let dim_names = vec![
        DIM_TOTAL_WAVENUMBER.to_string(),
        DIM_MODEL_LEVELS_1.to_string(),
        DIM_MODEL_LEVELS_2.to_string(),
    ];

    let variables = tensors
        .iter()
        .map(|(name, tensor)| {
            let (b, l1, l2) = tensor.dim();
            ArrayVariable {
                name: format!("{name}{suffix}"),
                dims: dim_names.clone(),
                shape: vec![b, l1, l2],
                data: tensor.iter().copied().collect(),
            }
        })
        .collect();

    let mut attributes = BTreeMap::new();
    attributes.insert(SAMPLES_ATTRIBUTE.to_string(), samples as u64);

    for v in &variables {
    }
    let doc = ArrayFile { dims, attributes, variables };
    for v in &doc.variables {
        let x: u64 = v.data.iter().fold(0u64, |a, b| a ^ b.to_bits());
        eprintln!("WRITE var={} len={} xor={:016x}", v.name, v.data.len(), x);
    }
    let file = File::create(path).map_err(|e| persistence_err(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &doc)
        .map_err(|e| persistence_err(path, e))?;
    debug!("wrote {} vertical tensor(s) to '{}'", doc.variables.len(), path.display());
    Ok(())
}

/// Write a [`VerticalStatistics`] value (raw covariance sums).
pub fn write_vertical_statistics(
    path: &Path, suffix: &str, stats: &VerticalStatistics, comm: &dyn Communicator,
) -> SpectralResult<()> {
    write_vertical_tensors(path, suffix, stats.iter(), stats.samples(), comm)
}

/// Read per-variable vertical tensors with the given suffix back into
/// [`VerticalStatistics`], validating against the run's geometry and
/// variable contract.
///
/// # Errors
/// - [`SpectralError::Persistence`] on filesystem/deserialization failure.
/// - [`SpectralError::MissingVariableInFile`] for each variable resolved
///   first; all contract violations are fatal.
/// - [`SpectralError::FileContractMismatch`] when dimensions disagree with
///   the geometry or the sample attribute is absent.
pub fn read_vertical_statistics(
    path: &Path, suffix: &str, geometry: &SpectralGeometry, vars: &Variables,
) -> SpectralResult<VerticalStatistics> {
    let file = File::open(path).map_err(|e| persistence_err(path, e))?;
    let doc: ArrayFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| persistence_err(path, e))?;

    let samples = *doc.attributes.get(SAMPLES_ATTRIBUTE).ok_or_else(|| {
        SpectralError::FileContractMismatch {
            path: path.to_path_buf(),
            detail: format!("missing '{SAMPLES_ATTRIBUTE}' attribute"),
        }
    })? as usize;

    let mut tensors = Vec::with_capacity(vars.len());
    for v in vars.iter() {
        let stored_name = format!("{}{suffix}", v.name);
        let var = doc.variables.iter().find(|sv| sv.name == stored_name).ok_or_else(|| {
            SpectralError::MissingVariableInFile { name: stored_name.clone(), path: path.into() }
        })?;

        let expected = [geometry.num_bins(), v.levels, v.levels];
        if var.shape != expected {
            return Err(SpectralError::FileContractMismatch {
                path: path.to_path_buf(),
                detail: format!(
                    "variable '{stored_name}' has shape {:?}; run expects {:?}",
                    var.shape, expected
                ),
            });
        }
        let x = var.data.iter().fold(0u64, |a, b| a ^ b.to_bits());
        eprintln!("READ var={} len={} xor={:016x}", stored_name, var.data.len(), x);
        let tensor =
            Array3::from_shape_vec((expected[0], expected[1], expected[2]), var.data.clone())
                .map_err(|e| persistence_err(path, e))?;
        tensors.push((v.name.clone(), tensor));
    }

    Ok(VerticalStatistics::from_parts(tensors, samples))
}

/// Write a field set (e.g. a per-field hybrid weight) as an array file with
/// `{"horizontal points", "model levels"}` axes. Root rank only.
pub fn write_fieldset(path: &Path, fset: &FieldSet, comm: &dyn Communicator) -> SpectralResult<()> {
    if fset.is_empty() {
        return Err(persistence_err(path, "no fields to write"));
    }
    if !comm.is_root() {
        return Ok(());
    }
    let dim_names = vec![DIM_HORIZONTAL_POINTS.to_string(), DIM_MODEL_LEVELS.to_string()];
    let first = fset.iter().next().unwrap().1.dim();
    let dims = vec![
        Dimension { name: DIM_HORIZONTAL_POINTS.to_string(), size: first.0 },
        Dimension { name: DIM_MODEL_LEVELS.to_string(), size: first.1 },
    ];
    let variables = fset
        .iter()
        .map(|(name, data)| ArrayVariable {
            name: name.to_string(),
            dims: dim_names.clone(),
            shape: vec![data.nrows(), data.ncols()],
            data: data.iter().copied().collect(),
        })
        .collect();
    let doc = ArrayFile { dims, attributes: BTreeMap::new(), variables };
    let file = File::create(path).map_err(|e| persistence_err(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &doc).map_err(|e| persistence_err(path, e))
}

/// Read a field set over the given contract and row count.
///
/// # Errors
/// Same taxonomy as [`read_vertical_statistics`].
pub fn read_fieldset(path: &Path, vars: &Variables, rows: usize) -> SpectralResult<FieldSet> {
    let file = File::open(path).map_err(|e| persistence_err(path, e))?;
    let doc: ArrayFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| persistence_err(path, e))?;

    let mut fset = FieldSet::new();
    for v in vars.iter() {
        let var = doc.variables.iter().find(|sv| sv.name == v.name).ok_or_else(|| {
            SpectralError::MissingVariableInFile { name: v.name.clone(), path: path.into() }
        })?;
        let expected = [rows, v.levels];
        if var.shape != expected {
            return Err(SpectralError::FileContractMismatch {
                path: path.to_path_buf(),
                detail: format!(
                    "field '{}' has shape {:?}; run expects {:?}",
                    v.name, var.shape, expected
                ),
            });
        }
        let data = ndarray::Array2::from_shape_vec((rows, v.levels), var.data.clone())
            .map_err(|e| persistence_err(path, e))?;
        // Names come from the validated contract; duplicates are impossible.
        fset.insert(v.name.clone(), data).unwrap();
    }
    Ok(fset)
}
