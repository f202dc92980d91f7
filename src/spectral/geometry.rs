//! spectral::geometry — coefficient layout of a truncated spectral space.
//!
//! Purpose
//! -------
//! Stand in for the external spectral function space: a triangular
//! truncation `N` and the set of zonal wavenumbers `m` owned by this rank.
//! Field rows enumerate, in order, `(m, n, component)` for each owned zonal
//! wavenumber `m`, each total wavenumber `n = m..=N`, and the real/imaginary
//! component pair — the layout the spectral central blocks convolve over.
//!
//! Conventions
//! -----------
//! - Total-wavenumber *bins* index `0..=N`, so there are `N + 1` of them.
//! - In a distributed run each rank owns a disjoint subset of zonal
//!   wavenumbers; the serial constructor owns all of them.
use crate::spectral::errors::{SpectralError, SpectralResult};

/// One spectral coefficient slot in the row layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectralCoefficient {
    /// Row index in every spectral field of this geometry.
    pub row: usize,
    /// Zonal wavenumber m.
    pub zonal: usize,
    /// Total wavenumber n (>= m).
    pub total: usize,
    /// Whether this row is the imaginary component of the (m, n) pair.
    pub imag: bool,
}

/// Triangular spectral truncation with this rank's owned zonal wavenumbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectralGeometry {
    truncation: usize,
    zonal_wavenumbers: Vec<usize>,
}

impl SpectralGeometry {
    /// Serial geometry owning every zonal wavenumber `0..=truncation`.
    pub fn new(truncation: usize) -> Self {
        SpectralGeometry { truncation, zonal_wavenumbers: (0..=truncation).collect() }
    }

    /// Distributed geometry owning the given zonal wavenumbers.
    ///
    /// # Errors
    /// - [`SpectralError::InvalidZonalWavenumber`] if any `m > truncation`.
    /// - [`SpectralError::UnsortedZonalWavenumbers`] unless strictly
    ///   increasing.
    pub fn with_zonal_wavenumbers(
        truncation: usize, zonal_wavenumbers: Vec<usize>,
    ) -> SpectralResult<Self> {
        if let Some(&m) = zonal_wavenumbers.iter().find(|&&m| m > truncation) {
            return Err(SpectralError::InvalidZonalWavenumber { m, truncation });
        }
        if zonal_wavenumbers.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SpectralError::UnsortedZonalWavenumbers);
        }
        Ok(SpectralGeometry { truncation, zonal_wavenumbers })
    }

    pub fn truncation(&self) -> usize {
        self.truncation
    }

    /// Number of total-wavenumber bins (`truncation + 1`).
    pub fn num_bins(&self) -> usize {
        self.truncation + 1
    }

    pub fn zonal_wavenumbers(&self) -> &[usize] {
        &self.zonal_wavenumbers
    }

    /// Rows of every spectral field on this rank: a real/imaginary pair for
    /// each owned `(m, n)` with `n = m..=N`.
    pub fn coefficient_rows(&self) -> usize {
        self.zonal_wavenumbers.iter().map(|&m| 2 * (self.truncation - m + 1)).sum()
    }

    /// Enumerate the coefficient layout in row order.
    pub fn coefficients(&self) -> impl Iterator<Item = SpectralCoefficient> + '_ {
        let truncation = self.truncation;
        self.zonal_wavenumbers
            .iter()
            .flat_map(move |&m| {
                (m..=truncation)
                    .flat_map(move |n| [(m, n, false), (m, n, true)])
            })
            .enumerate()
            .map(|(row, (zonal, total, imag))| SpectralCoefficient { row, zonal, total, imag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Row layout and ownership validation. The statistics built over this
    // layout are covered in `spectral::estimator`.
    // -------------------------------------------------------------------------

    #[test]
    fn serial_geometry_owns_the_full_triangle() {
        let geom = SpectralGeometry::new(3);
        assert_eq!(geom.num_bins(), 4);
        // Σ_m 2(N − m + 1) for m = 0..=3: 8 + 6 + 4 + 2.
        assert_eq!(geom.coefficient_rows(), 20);
        assert_eq!(geom.coefficients().count(), 20);
    }

    #[test]
    fn coefficient_layout_orders_m_then_n_then_component() {
        let geom = SpectralGeometry::with_zonal_wavenumbers(2, vec![1, 2]).unwrap();
        let coeffs: Vec<_> = geom.coefficients().collect();
        assert_eq!(coeffs.len(), 6);
        assert_eq!(
            coeffs[0],
            SpectralCoefficient { row: 0, zonal: 1, total: 1, imag: false }
        );
        assert_eq!(
            coeffs[1],
            SpectralCoefficient { row: 1, zonal: 1, total: 1, imag: true }
        );
        assert_eq!(
            coeffs[2],
            SpectralCoefficient { row: 2, zonal: 1, total: 2, imag: false }
        );
        assert_eq!(
            coeffs[5],
            SpectralCoefficient { row: 5, zonal: 2, total: 2, imag: true }
        );
    }

    #[test]
    fn ownership_validation_rejects_bad_m_sets() {
        assert_eq!(
            SpectralGeometry::with_zonal_wavenumbers(2, vec![0, 3]),
            Err(SpectralError::InvalidZonalWavenumber { m: 3, truncation: 2 })
        );
        assert_eq!(
            SpectralGeometry::with_zonal_wavenumbers(2, vec![1, 1]),
            Err(SpectralError::UnsortedZonalWavenumbers)
        );
    }
}
