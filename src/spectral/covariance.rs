//! The ensemble-calibrated spectral vertical covariance central block
//! ("spectral covariance").
//!
//! Purpose
//! -------
//! Terminal covariance operator in spectral space. For each active variable
//! and each spectral coefficient at total wavenumber `n`, `multiply`
//! convolves the per-level column with the raw vertical sum `T(n)`,
//! normalized by `(2n+1) · samples` — the `2n+1` distributing an isotropic
//! covariance uniformly across the spectral coefficients sharing a total
//! wavenumber:
//!
//! ```text
//! col ← T(n) · col / ((2n+1) · S)
//! ```
//!
//! Randomization is supported directly: per-bin square roots
//! `L(n) L(n)ᵀ = T(n)/((2n+1)·S)` are factored once at installation time
//! (Cholesky, falling back to a clipped symmetric eigendecomposition for
//! semi-definite bins), and a sample is `col = L(n) · ξ` with `ξ ~ N(0, I)`
//! per coefficient — so samples carry exactly the covariance `multiply`
//! applies.
//!
//! Lifecycle: calibrate from ensemble perturbations (`direct_calibration`)
//! or load persisted sums (`read`); persist with `write` (root rank only).
use std::fmt;

use nalgebra::DMatrix;
use ndarray::Array3;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::blocks::errors::BlockResult;
use crate::blocks::traits::{require_ready, BlockContext, BlockState, CentralBlock};
use crate::config::{BlockConfig, ReadConfig, WriteConfig};
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;
use crate::spectral::errors::SpectralError;
use crate::spectral::estimator::VerticalStatistics;
use crate::spectral::geometry::SpectralGeometry;
use crate::spectral::io;

/// Spectral vertical covariance operator with a stored square root.
pub struct SpectralCovariance {
    geometry: SpectralGeometry,
    active_vars: Variables,
    stats: Option<VerticalStatistics>,
    /// Per-variable `(bins × levels × levels)` lower factors `L(n)`.
    sqrt_factors: Option<Vec<(String, Array3<f64>)>>,
    state: BlockState,
}

impl SpectralCovariance {
    /// Uncalibrated block over the given geometry and active variables.
    pub fn new(geometry: SpectralGeometry, active_vars: Variables) -> Self {
        SpectralCovariance {
            geometry,
            active_vars,
            stats: None,
            sqrt_factors: None,
            state: BlockState::Constructed,
        }
    }

    /// Registry constructor.
    pub fn make(cfg: &BlockConfig, ctx: &BlockContext<'_>) -> BlockResult<Box<dyn CentralBlock>> {
        let active_vars = match &cfg.active_vars {
            Some(names) => ctx.vars.restrict(names)?,
            None => ctx.vars.clone(),
        };
        Ok(Box::new(SpectralCovariance::new(ctx.geometry.clone(), active_vars)))
    }

    /// Install pre-built statistics (calibration provenance). Used by tests
    /// and by callers that estimate statistics out of band.
    pub fn from_statistics(
        geometry: SpectralGeometry, active_vars: Variables, stats: VerticalStatistics,
    ) -> BlockResult<Self> {
        let mut block = SpectralCovariance::new(geometry, active_vars);
        block.install(stats, BlockState::Calibrated)?;
        Ok(block)
    }

    /// Installed statistics, if ready.
    pub fn statistics(&self) -> Option<&VerticalStatistics> {
        self.stats.as_ref()
    }

    fn install(&mut self, stats: VerticalStatistics, state: BlockState) -> BlockResult<()> {
        let bins = self.geometry.num_bins();
        for v in self.active_vars.iter() {
            let tensor = stats.tensor(&v.name).ok_or_else(|| {
                crate::fields::FieldError::MissingFields { names: vec![v.name.clone()] }
            })?;
            let dim = tensor.dim();
            if dim != (bins, v.levels, v.levels) {
                return Err(SpectralError::StatisticsMismatch {
                    variable: v.name.clone(),
                    detail: format!(
                        "shape {dim:?}; run expects {:?}",
                        (bins, v.levels, v.levels)
                    ),
                }
                .into());
            }
        }

        let samples = stats.samples() as f64;
        let mut factors = Vec::with_capacity(self.active_vars.len());
        for v in self.active_vars.iter() {
            let tensor = stats.tensor(&v.name).unwrap();
            let mut lower = Array3::<f64>::zeros((bins, v.levels, v.levels));
            for n in 0..bins {
                let norm = (2 * n + 1) as f64 * samples;
                let a =
                    DMatrix::from_fn(v.levels, v.levels, |r, c| tensor[[n, r, c]] / norm);
                let l = sqrt_factor(a);
                for r in 0..v.levels {
                    for c in 0..v.levels {
                        lower[[n, r, c]] = l[(r, c)];
                    }
                }
            }
            factors.push((v.name.clone(), lower));
        }

        self.stats = Some(stats);
        self.sqrt_factors = Some(factors);
        self.state = state;
        if let Some(s) = &self.stats {
            for (n, t) in s.iter() {
                let bits: Vec<u64> = t.iter().map(|x| x.to_bits()).collect();
                let sum: u64 = bits.iter().fold(0u64, |a, b| a ^ b);
                eprintln!("INSTALL state={:?} var={} xor_bits={:016x}", state, n, sum);
            }
        }
        Ok(())
    }

    fn check_rows(&self, fset: &FieldSet) -> BlockResult<()> {
        fset.require(&self.active_vars)?;
        let expected = self.geometry.coefficient_rows();
        for v in self.active_vars.iter() {
            let actual = fset.field(&v.name)?.nrows();
            if actual != expected {
                return Err(SpectralError::RowsMismatch {
                    variable: v.name.clone(),
                    expected,
                    actual,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Square root of a symmetric positive semi-definite matrix: Cholesky when
/// definite, clipped symmetric eigendecomposition otherwise.
fn sqrt_factor(a: DMatrix<f64>) -> DMatrix<f64> {
    match a.clone().cholesky() {
        Some(chol) => chol.l(),
        None => {
            let eig = a.symmetric_eigen();
            let scaled = eig.eigenvalues.map(|l| l.max(0.0).sqrt());
            &eig.eigenvectors * DMatrix::from_diagonal(&scaled)
        }
    }
}

impl CentralBlock for SpectralCovariance {
    fn name(&self) -> &str {
        "spectral covariance"
    }

    fn state(&self) -> BlockState {
        self.state
    }

    fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "multiply");
        self.check_rows(fset)?;
        let stats = self.stats.as_ref().unwrap();
        let samples = stats.samples() as f64;

        for v in self.active_vars.iter() {
            let tensor = stats.tensor(&v.name).unwrap();
            let data = fset.field_mut(&v.name)?;
            let levels = v.levels;
            let mut col = vec![0.0; levels];
            // One 1-D vertical convolution per spectral coefficient.
            for coeff in self.geometry.coefficients() {
                let n = coeff.total;
                let norm = (2 * n + 1) as f64 * samples;
                for (l, slot) in col.iter_mut().enumerate() {
                    *slot = data[[coeff.row, l]];
                }
                for r in 0..levels {
                    let mut acc = 0.0;
                    for (c, &value) in col.iter().enumerate() {
                        acc += tensor[[n, r, c]] * value;
                    }
                    data[[coeff.row, r]] = acc / norm;
                }
            }
        }
        Ok(())
    }

    fn randomize(&self, fset: &mut FieldSet, rng: &mut dyn RngCore) -> BlockResult<()> {
        require_ready(self.state, self.name(), "randomize");
        self.check_rows(fset)?;
        let factors = self.sqrt_factors.as_ref().unwrap();

        for (name, lower) in factors {
            let levels = self.active_vars.levels(name).unwrap();
            let data = fset.field_mut(name)?;
            let mut xi = vec![0.0; levels];
            for coeff in self.geometry.coefficients() {
                let n = coeff.total;
                for slot in xi.iter_mut() {
                    *slot = StandardNormal.sample(rng);
                }
                for r in 0..levels {
                    let mut acc = 0.0;
                    for (c, &value) in xi.iter().enumerate() {
                        acc += lower[[n, r, c]] * value;
                    }
                    data[[coeff.row, r]] = acc;
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, cfg: &ReadConfig, _ctx: &BlockContext<'_>) -> BlockResult<()> {
        let stats = io::read_vertical_statistics(
            &cfg.file_path,
            io::COVARIANCE_SUFFIX,
            &self.geometry,
            &self.active_vars,
        )?;
        self.install(stats, BlockState::Loaded)
    }

    fn direct_calibration(
        &mut self, members: &[FieldSet], comm: &dyn Communicator,
    ) -> BlockResult<()> {
        let stats =
            VerticalStatistics::accumulate(&self.geometry, &self.active_vars, members, comm)?;
        self.install(stats, BlockState::Calibrated)
    }

    fn write(&self, cfg: &WriteConfig, comm: &dyn Communicator) -> BlockResult<()> {
        require_ready(self.state, self.name(), "write");
        let stats = self.stats.as_ref().unwrap();
        io::write_vertical_statistics(&cfg.file_path, io::COVARIANCE_SUFFIX, stats, comm)?;
        Ok(())
    }
}

impl fmt::Display for SpectralCovariance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spectral covariance")
    }
}
