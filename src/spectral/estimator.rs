//! spectral::estimator — ensemble-estimated vertical covariance statistics.
//!
//! Purpose
//! -------
//! Build the per-total-wavenumber vertical statistics that populate the
//! spectral central blocks. For each active variable the estimator
//! accumulates the raw level×level sums
//!
//! ```text
//! T(n)[i, j] = Σ_members Σ_{(m, n) coefficients} col[i] · col[j],
//! ```
//!
//! where `col` is the per-level column of spectral coefficients at one
//! `(m, n, re/im)` slot and the inner sum runs over every owned coefficient
//! sharing total wavenumber `n`. The sums stay *unnormalized*: the covariance
//! block divides by `(2n+1) · samples` at application time (distributing an
//! isotropic covariance uniformly across the spectral coefficients sharing a
//! total wavenumber), and the correlation conversion divides by per-level
//! standard deviations drawn from the same sums, which cancels both factors
//! exactly.
//!
//! Key behaviors
//! -------------
//! - [`VerticalStatistics::accumulate`] walks the coefficient layout of the
//!   geometry once per member and reduces the sums across ranks, so the
//!   statistics held on every rank are global. Every rank must reach the
//!   call.
//! - [`VerticalStatistics::standard_deviations`] reads `σ(n, l) = √T(n)[l, l]`.
//! - [`VerticalStatistics::correlations`] forms the unit-diagonal
//!   `corr(n)[i, j] = T(n)[i, j] / (σᵢ σⱼ)` per bin, failing fast on any
//!   non-positive level variance.
//!
//! Invariants & assumptions
//! ------------------------
//! - Members share one variable contract and carry exactly the geometry's
//!   coefficient rows; violations surface before any accumulation.
//! - Members are perturbations (mean already removed by the ensemble
//!   ledger); no centering happens here.
//! - `samples` records the member count used for application-time
//!   normalization and is persisted alongside the tensors.
use ndarray::{Array2, Array3};

use crate::blocks::errors::BlockResult;
use crate::fields::{FieldSet, Variables};
use crate::parallel::Communicator;
use crate::spectral::errors::SpectralError;
use crate::spectral::geometry::SpectralGeometry;

/// Raw per-variable vertical statistics: one `(bins × levels × levels)`
/// tensor of unnormalized sums per variable, plus the sample count.
#[derive(Debug, Clone, PartialEq)]
pub struct VerticalStatistics {
    tensors: Vec<(String, Array3<f64>)>,
    samples: usize,
}

impl VerticalStatistics {
    /// Accumulate raw vertical sums from ensemble members and reduce them
    /// across ranks.
    ///
    /// # Errors
    /// - [`SpectralError::EmptyEnsemble`] for an empty member list.
    /// - Aggregate missing-field / level-count violations from the contract
    ///   check.
    /// - [`SpectralError::RowsMismatch`] if a member's rows disagree with the
    ///   geometry.
    pub fn accumulate(
        geometry: &SpectralGeometry, vars: &Variables, members: &[FieldSet],
        comm: &dyn Communicator,
    ) -> BlockResult<Self> {
        if members.is_empty() {
            return Err(SpectralError::EmptyEnsemble.into());
        }
        let rows = geometry.coefficient_rows();
        for member in members {
            member.require(vars)?;
            for v in vars.iter() {
                let actual = member.field(&v.name)?.nrows();
                if actual != rows {
                    return Err(SpectralError::RowsMismatch {
                        variable: v.name.clone(),
                        expected: rows,
                        actual,
                    }
                    .into());
                }
            }
        }

        let bins = geometry.num_bins();
        let mut tensors = Vec::with_capacity(vars.len());
        for v in vars.iter() {
            let mut tensor = Array3::<f64>::zeros((bins, v.levels, v.levels));
            for member in members {
                let data = member.field(&v.name)?;
                for coeff in geometry.coefficients() {
                    let col = data.row(coeff.row);
                    for i in 0..v.levels {
                        for j in 0..v.levels {
                            tensor[[coeff.total, i, j]] += col[i] * col[j];
                        }
                    }
                }
            }
            // Each rank contributed only its owned zonal wavenumbers; the
            // reduced sums are global and identical on every rank.
            comm.sum_in_place(tensor.as_slice_mut().unwrap());
            tensors.push((v.name.clone(), tensor));
        }

        Ok(VerticalStatistics { tensors, samples: members.len() })
    }

    /// Rebuild statistics from persisted parts (see `spectral::io`).
    pub fn from_parts(tensors: Vec<(String, Array3<f64>)>, samples: usize) -> Self {
        VerticalStatistics { tensors, samples }
    }

    /// Number of samples behind the sums.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Variable names in contract order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.tensors.iter().map(|(n, _)| n.as_str())
    }

    /// Raw sum tensor for one variable.
    pub fn tensor(&self, name: &str) -> Option<&Array3<f64>> {
        self.tensors.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Borrow every `(name, tensor)` pair in contract order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array3<f64>)> {
        self.tensors.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Per-level standard deviations `σ(n, l) = √T(n)[l, l]` for one
    /// variable, as a `(bins × levels)` array.
    ///
    /// # Errors
    /// - [`SpectralError::MissingVariableInFile`] never — unknown names are a
    ///   caller bug and reported as an aggregate missing-field error.
    pub fn standard_deviations(&self, name: &str) -> BlockResult<Array2<f64>> {
        let tensor = self.require_tensor(name)?;
        let (bins, levels, _) = tensor.dim();
        let mut sd = Array2::<f64>::zeros((bins, levels));
        for n in 0..bins {
            for l in 0..levels {
                sd[[n, l]] = tensor[[n, l, l]].sqrt();
            }
        }
        Ok(sd)
    }

    /// Unit-diagonal correlations `corr(n) = D(n)⁻¹ T(n) D(n)⁻¹` with
    /// `D(n) = diag(σ(n, ·))`, per variable.
    ///
    /// The per-level normalization cancels the sample count and the
    /// `(2n+1)` spread factor carried by the raw sums, so the result is the
    /// dimensionless correlation the spectral correlation block convolves
    /// with directly.
    ///
    /// # Errors
    /// - [`SpectralError::NonPositiveVariance`] naming the first bin/level
    ///   whose variance cannot normalize a correlation.
    pub fn correlations(&self) -> BlockResult<Vec<(String, Array3<f64>)>> {
        let mut out = Vec::with_capacity(self.tensors.len());
        for (name, tensor) in &self.tensors {
            let (bins, levels, _) = tensor.dim();
            let sd = self.standard_deviations(name)?;
            for n in 0..bins {
                for l in 0..levels {
                    let s = sd[[n, l]];
                    if !(s > 0.0) || !s.is_finite() {
                        return Err(SpectralError::NonPositiveVariance {
                            variable: name.clone(),
                            bin: n,
                            level: l,
                            value: tensor[[n, l, l]],
                        }
                        .into());
                    }
                }
            }
            let mut corr = Array3::<f64>::zeros((bins, levels, levels));
            for n in 0..bins {
                for i in 0..levels {
                    for j in 0..levels {
                        corr[[n, i, j]] = tensor[[n, i, j]] / (sd[[n, i]] * sd[[n, j]]);
                    }
                }
            }
            out.push((name.clone(), corr));
        }
        Ok(out)
    }

    fn require_tensor(&self, name: &str) -> BlockResult<&Array3<f64>> {
        self.tensor(name).ok_or_else(|| {
            crate::fields::FieldError::MissingFields { names: vec![name.to_string()] }.into()
        })
    }
}
