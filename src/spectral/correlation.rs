//! The spectral vertical correlation central block ("spectral correlation").
//!
//! Purpose
//! -------
//! Terminal correlation operator in spectral space: for each active
//! variable, each zonal wavenumber m, each total wavenumber n ≥ m, and both
//! real/imaginary components, the per-level column is convolved with the
//! unit-diagonal level×level correlation matrix for bin n. The correlation
//! is derived from raw covariance sums by per-level standard-deviation
//! normalization, which absorbs the `(2n+1) · samples` factor the covariance
//! block divides out explicitly — so an identity correlation makes
//! `multiply` an exact no-op.
//!
//! Lifecycle restrictions mirror the operator's representation:
//! - `direct_calibration` is not supported — calibrate a spectral covariance
//!   block instead.
//! - `randomize` is not supported (no square root is stored) — use the `ID`
//!   central block with a square-root outer block instead.
//! - `read` loads a persisted *covariance* file and derives correlations;
//!   `write` persists the derived correlations (root rank only).
use std::fmt;

use ndarray::Array3;
use rand::RngCore;

use crate::blocks::errors::{BlockError, BlockResult};
use crate::blocks::traits::{require_ready, BlockContext, BlockState, CentralBlock};
use crate::config::{BlockConfig, ReadConfig, WriteConfig};
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;
use crate::spectral::errors::SpectralError;
use crate::spectral::estimator::VerticalStatistics;
use crate::spectral::geometry::SpectralGeometry;
use crate::spectral::io;

/// Spectral vertical correlation operator.
pub struct SpectralCorrelation {
    geometry: SpectralGeometry,
    active_vars: Variables,
    /// Unit-diagonal correlations per variable, `(bins × levels × levels)`.
    correlations: Option<Vec<(String, Array3<f64>)>>,
    /// Sample count of the source covariance, persisted with the operator.
    samples: usize,
    state: BlockState,
}

impl SpectralCorrelation {
    /// Uncalibrated block over the given geometry and active variables.
    pub fn new(geometry: SpectralGeometry, active_vars: Variables) -> Self {
        SpectralCorrelation {
            geometry,
            active_vars,
            correlations: None,
            samples: 0,
            state: BlockState::Constructed,
        }
    }

    /// Registry constructor.
    pub fn make(cfg: &BlockConfig, ctx: &BlockContext<'_>) -> BlockResult<Box<dyn CentralBlock>> {
        let active_vars = match &cfg.active_vars {
            Some(names) => ctx.vars.restrict(names)?,
            None => ctx.vars.clone(),
        };
        Ok(Box::new(SpectralCorrelation::new(ctx.geometry.clone(), active_vars)))
    }

    /// Derive correlations from covariance statistics and install them.
    ///
    /// # Errors
    /// - [`SpectralError::NonPositiveVariance`] if any level variance cannot
    ///   normalize a correlation.
    pub fn from_covariance_statistics(
        geometry: SpectralGeometry, active_vars: Variables, stats: &VerticalStatistics,
    ) -> BlockResult<Self> {
        let mut block = SpectralCorrelation::new(geometry, active_vars);
        block.install(stats, BlockState::Calibrated)?;
        Ok(block)
    }

    /// Installed correlations, if ready.
    pub fn correlations(&self) -> Option<&[(String, Array3<f64>)]> {
        self.correlations.as_deref()
    }

    fn install(&mut self, stats: &VerticalStatistics, state: BlockState) -> BlockResult<()> {
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

        let correlations = stats.correlations()?;
        // Keep only the active variables, in contract order.
        let kept = self
            .active_vars
            .iter()
            .map(|v| {
                correlations
                    .iter()
                    .find(|(name, _)| *name == v.name)
                    .map(|(name, corr)| (name.clone(), corr.clone()))
                    .unwrap()
            })
            .collect();

        self.correlations = Some(kept);
        self.samples = stats.samples();
        self.state = state;
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

impl CentralBlock for SpectralCorrelation {
    fn name(&self) -> &str {
        "spectral correlation"
    }

    fn state(&self) -> BlockState {
        self.state
    }

    fn multiply(&self, fset: &mut FieldSet) -> BlockResult<()> {
        require_ready(self.state, self.name(), "multiply");
        self.check_rows(fset)?;
        let correlations = self.correlations.as_ref().unwrap();

        for (name, corr) in correlations {
            let levels = self.active_vars.levels(name).unwrap();
            let data = fset.field_mut(name)?;
            let mut col = vec![0.0; levels];
            // One 1-D vertical convolution per spectral coefficient; the
            // (2n+1)·samples normalization is already absorbed into the
            // unit-diagonal correlation.
            for coeff in self.geometry.coefficients() {
                let n = coeff.total;
                for (l, slot) in col.iter_mut().enumerate() {
                    *slot = data[[coeff.row, l]];
                }
                for r in 0..levels {
                    let mut acc = 0.0;
                    for (c, &value) in col.iter().enumerate() {
                        acc += corr[[n, r, c]] * value;
                    }
                    data[[coeff.row, r]] = acc;
                }
            }
        }
        Ok(())
    }

    fn randomize(&self, _fset: &mut FieldSet, _rng: &mut dyn RngCore) -> BlockResult<()> {
        require_ready(self.state, self.name(), "randomize");
        Err(BlockError::RandomizeNotSupported {
            block: self.name().to_string(),
            use_instead: "use the 'ID' central block with a square-root outer block instead"
                .to_string(),
        })
    }

    fn read(&mut self, cfg: &ReadConfig, _ctx: &BlockContext<'_>) -> BlockResult<()> {
        let stats = io::read_vertical_statistics(
            &cfg.file_path,
            io::COVARIANCE_SUFFIX,
            &self.geometry,
            &self.active_vars,
        )?;
        self.install(&stats, BlockState::Loaded)
    }

    fn direct_calibration(
        &mut self, _members: &[FieldSet], _comm: &dyn Communicator,
    ) -> BlockResult<()> {
        Err(BlockError::CalibrationNotSupported {
            block: self.name().to_string(),
            use_instead: "use the 'spectral covariance' central block instead".to_string(),
        })
    }

    fn write(&self, cfg: &WriteConfig, comm: &dyn Communicator) -> BlockResult<()> {
        require_ready(self.state, self.name(), "write");
        let correlations = self.correlations.as_ref().unwrap();
        io::write_vertical_tensors(
            &cfg.file_path,
            io::CORRELATION_SUFFIX,
            correlations.iter().map(|(n, t)| (n.as_str(), t)),
            self.samples,
            comm,
        )?;
        Ok(())
    }
}

impl fmt::Display for SpectralCorrelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spectral correlation")
    }
}
