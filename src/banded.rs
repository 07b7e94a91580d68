//! Symmetric banded matrices and their LDL^T factorization.
//!
//! The local observed-information matrix of a block is banded because each
//! observation couples latent positions at most `2w` apart. Only the lower
//! bands are stored: `bands[(d, j)] = A[j+d, j]` for `0 <= d <= half_bandwidth`.
//!
//! Factorization fails explicitly on a non-positive pivot. Callers treat that
//! as a signal (reject the block's proposal), never as a panic.

use ndarray::{Array1, Array2};

/// The matrix is not positive definite; `pivot` is the failing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotPositiveDefinite {
    pub pivot: usize,
}

impl std::fmt::Display for NotPositiveDefinite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "non-positive pivot at column {}", self.pivot)
    }
}

impl std::error::Error for NotPositiveDefinite {}

/// A symmetric banded matrix in lower-band storage.
#[derive(Debug, Clone, PartialEq)]
pub struct BandedMatrix {
    n: usize,
    half_bandwidth: usize,
    bands: Array2<f64>,
}

impl BandedMatrix {
    pub fn zeros(n: usize, half_bandwidth: usize) -> Self {
        Self {
            n,
            half_bandwidth,
            bands: Array2::zeros((half_bandwidth + 1, n)),
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn half_bandwidth(&self) -> usize {
        self.half_bandwidth
    }

    /// Entry `A[i, j]`; zero outside the band.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (hi, lo) = if i >= j { (i, j) } else { (j, i) };
        let d = hi - lo;
        if d > self.half_bandwidth {
            0.0
        } else {
            self.bands[(d, lo)]
        }
    }

    /// Adds `v` to `A[i, j]` (and by symmetry `A[j, i]`).
    ///
    /// Panics if `|i - j|` exceeds the half-bandwidth; callers construct
    /// entries strictly inside the band.
    pub fn add(&mut self, i: usize, j: usize, v: f64) {
        let (hi, lo) = if i >= j { (i, j) } else { (j, i) };
        self.bands[(hi - lo, lo)] += v;
    }

    /// Symmetric matrix-vector product, mostly for testing.
    pub fn mul_vec(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut out = Array1::zeros(self.n);
        for j in 0..self.n {
            out[j] += self.bands[(0, j)] * x[j];
            for d in 1..=self.half_bandwidth.min(self.n - 1 - j) {
                let v = self.bands[(d, j)];
                out[j + d] += v * x[j];
                out[j] += v * x[j + d];
            }
        }
        out
    }

    /// Computes the `L D L^T` factorization with unit lower-triangular `L`.
    ///
    /// Returns [`NotPositiveDefinite`] as soon as a pivot is non-positive or
    /// non-finite.
    pub fn ldlt(&self) -> Result<BandedLdlt, NotPositiveDefinite> {
        let n = self.n;
        let hb = self.half_bandwidth;
        let mut l = Array2::<f64>::zeros((hb + 1, n));
        let mut d = Array1::<f64>::zeros(n);

        for j in 0..n {
            let kmin = j.saturating_sub(hb);
            let mut dj = self.bands[(0, j)];
            for k in kmin..j {
                dj -= l[(j - k, k)] * l[(j - k, k)] * d[k];
            }
            if !(dj > 0.0) || !dj.is_finite() {
                return Err(NotPositiveDefinite { pivot: j });
            }
            d[j] = dj;

            for i in (j + 1)..n.min(j + hb + 1) {
                let mut v = self.bands[(i - j, j)];
                // Columns k with both i and j inside their band.
                for k in kmin.max(i.saturating_sub(hb))..j {
                    v -= l[(i - k, k)] * l[(j - k, k)] * d[k];
                }
                l[(i - j, j)] = v / dj;
            }
        }

        Ok(BandedLdlt {
            n,
            half_bandwidth: hb,
            l,
            d,
        })
    }
}

/// A banded `L D L^T` factorization.
#[derive(Debug, Clone, PartialEq)]
pub struct BandedLdlt {
    n: usize,
    half_bandwidth: usize,
    /// Unit lower-triangular factor in band storage; the unit diagonal is
    /// implicit (`l[(0, j)]` is unused).
    l: Array2<f64>,
    d: Array1<f64>,
}

impl BandedLdlt {
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Diagonal of `D`; strictly positive by construction.
    pub fn diag(&self) -> &Array1<f64> {
        &self.d
    }

    /// Solves `L y = b` (forward substitution, unit diagonal).
    pub fn solve_unit_lower(&self, b: &Array1<f64>) -> Array1<f64> {
        let mut y = b.clone();
        for i in 0..self.n {
            for j in i.saturating_sub(self.half_bandwidth)..i {
                let yj = y[j];
                y[i] -= self.l[(i - j, j)] * yj;
            }
        }
        y
    }

    /// Solves `L^T x = b` (backward substitution, unit diagonal).
    pub fn solve_unit_lower_transpose(&self, b: &Array1<f64>) -> Array1<f64> {
        let mut x = b.clone();
        for j in (0..self.n).rev() {
            for i in (j + 1)..self.n.min(j + self.half_bandwidth + 1) {
                let xi = x[i];
                x[j] -= self.l[(i - j, j)] * xi;
            }
        }
        x
    }

    /// Computes `L^T x`.
    pub fn unit_lower_transpose_mul(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut out = x.clone();
        for j in 0..self.n {
            for i in (j + 1)..self.n.min(j + self.half_bandwidth + 1) {
                out[j] += self.l[(i - j, j)] * x[i];
            }
        }
        out
    }

    /// Full solve of `L D L^T x = b`.
    pub fn solve(&self, b: &Array1<f64>) -> Array1<f64> {
        let mut y = self.solve_unit_lower(b);
        y /= &self.d;
        self.solve_unit_lower_transpose(&y)
    }
}
