//! Block-local likelihood computations and penalized mode finding.
//!
//! A [`BlockModel`] sees one padded block of the sequence: counts, region
//! labels, the convolution template and the current hyperparameters. The
//! latent mean is `lambda_i = sum_k template[k] * exp(theta[i+k-w])`, counts
//! are Poisson, and each `theta_j` carries a Gaussian prior from its region's
//! `(mu, sigmasq)`.
//!
//! The mode search optimizes only the *subset* coordinates (the block's
//! interior, unaffected by edge truncation); the rest of the block stays
//! fixed at its current values and only conditions the likelihood.

use ndarray::{Array1, ArrayView1};
use std::ops::Range;

use crate::banded::BandedMatrix;
use crate::config::SolverSettings;
use crate::error::{Error, Result};

/// Per-position likelihood weights shared by gradient and information.
struct Residuals {
    /// `y_i / lambda_i - 1`.
    r: Array1<f64>,
    /// `y_i / lambda_i^2`.
    q: Array1<f64>,
}

/// One padded block of the model.
pub struct BlockModel<'a> {
    y: ArrayView1<'a, f64>,
    region_types: &'a [usize],
    template: ArrayView1<'a, f64>,
    mu: &'a Array1<f64>,
    sigmasq: &'a Array1<f64>,
}

impl<'a> BlockModel<'a> {
    pub fn new(
        y: ArrayView1<'a, f64>,
        region_types: &'a [usize],
        template: ArrayView1<'a, f64>,
        mu: &'a Array1<f64>,
        sigmasq: &'a Array1<f64>,
    ) -> Self {
        debug_assert_eq!(y.len(), region_types.len());
        debug_assert_eq!(template.len() % 2, 1);
        Self {
            y,
            region_types,
            template,
            mu,
            sigmasq,
        }
    }

    fn half_width(&self) -> usize {
        self.template.len() / 2
    }

    /// Convolved mean `lambda` over the block, truncated at block edges.
    pub fn lambda(&self, theta: &Array1<f64>) -> Array1<f64> {
        let n = theta.len();
        let w = self.half_width();
        let mut lambda = Array1::<f64>::zeros(n);
        for j in 0..n {
            let e = theta[j].exp();
            for (k, &t) in self.template.iter().enumerate() {
                // template index k pairs lambda[i] with theta[i + k - w]
                let i = j + w;
                if i >= k && i - k < n {
                    lambda[i - k] += t * e;
                }
            }
        }
        lambda
    }

    fn residuals(&self, theta: &Array1<f64>) -> Residuals {
        let lambda = self.lambda(theta);
        let mut r = Array1::<f64>::zeros(lambda.len());
        let mut q = Array1::<f64>::zeros(lambda.len());
        for i in 0..lambda.len() {
            if lambda[i] > 0.0 {
                r[i] = self.y[i] / lambda[i] - 1.0;
                q[i] = self.y[i] / (lambda[i] * lambda[i]);
            } else {
                // Zero mean forces a zero count; the data gate guarantees
                // y >= 0, so the only consistent residual is -1.
                r[i] = -1.0;
                q[i] = 0.0;
            }
        }
        Residuals { r, q }
    }

    /// Log posterior of the block up to an additive constant.
    pub fn log_target(&self, theta: &Array1<f64>) -> f64 {
        let lambda = self.lambda(theta);
        let mut lp = 0.0;
        for i in 0..theta.len() {
            if self.y[i] > 0.0 {
                if lambda[i] > 0.0 {
                    lp += self.y[i] * lambda[i].ln();
                } else {
                    return f64::NEG_INFINITY;
                }
            }
            lp -= lambda[i];
        }
        for j in 0..theta.len() {
            let r = self.region_types[j];
            let d = theta[j] - self.mu[r];
            lp -= d * d / (2.0 * self.sigmasq[r]);
        }
        lp
    }

    /// Gradient of the log target restricted to `subset` coordinates.
    pub fn grad_subset(&self, theta: &Array1<f64>, subset: &Range<usize>) -> Array1<f64> {
        let res = self.residuals(theta);
        let w = self.half_width();
        let n = theta.len();
        let mut g = Array1::<f64>::zeros(subset.len());
        for (a, j) in subset.clone().enumerate() {
            let mut acc = 0.0;
            for (k, &t) in self.template.iter().enumerate() {
                let i = j + w;
                if i >= k && i - k < n {
                    acc += res.r[i - k] * t;
                }
            }
            let r = self.region_types[j];
            g[a] = theta[j].exp() * acc - (theta[j] - self.mu[r]) / self.sigmasq[r];
        }
        g
    }

    /// Observed information (negative Hessian) restricted to `subset`,
    /// banded with half-bandwidth `2w`.
    pub fn information(&self, theta: &Array1<f64>, subset: &Range<usize>) -> BandedMatrix {
        let res = self.residuals(theta);
        let w = self.half_width();
        let n = theta.len();
        let m = subset.len();
        let hb = (2 * w).min(m.saturating_sub(1));
        let mut info = BandedMatrix::zeros(m, hb);

        let tw = |i: usize, j: usize| -> f64 {
            // template weight tying lambda[i] to theta[j]; zero off-kernel
            let k = (i + w).wrapping_sub(j);
            if i + w >= j && k < self.template.len() {
                self.template[k]
            } else {
                0.0
            }
        };

        for (a, j) in subset.clone().enumerate() {
            let ej = theta[j].exp();
            // Diagonal: curvature of the likelihood plus the prior precision.
            let mut first_order = 0.0;
            for i in j.saturating_sub(w)..n.min(j + w + 1) {
                first_order += res.r[i] * tw(i, j);
            }
            let r = self.region_types[j];
            info.add(a, a, -ej * first_order + 1.0 / self.sigmasq[r]);

            for b in a..m.min(a + hb + 1) {
                let k = subset.start + b;
                let ek = theta[k].exp();
                let mut second_order = 0.0;
                for i in k.saturating_sub(w)..n.min(j + w + 1) {
                    second_order += res.q[i] * tw(i, j) * tw(i, k);
                }
                if second_order != 0.0 {
                    info.add(b, a, ej * ek * second_order);
                }
            }
        }
        info
    }

    /// Finds the penalized-likelihood mode over `subset`, holding the rest of
    /// the block fixed.
    ///
    /// Damped Newton with a banded LDL^T solve for the step; falls back to a
    /// gradient step whenever the information fails to factorize mid-search.
    /// Fails with [`Error::NoConvergence`] when the iteration cap is hit or
    /// the line search stalls with a non-negligible gradient.
    pub fn find_mode(
        &self,
        theta0: &Array1<f64>,
        subset: &Range<usize>,
        settings: &SolverSettings,
    ) -> Result<Array1<f64>> {
        let mut theta = theta0.clone();
        let mut lp = self.log_target(&theta);

        for _ in 0..settings.max_iter {
            let g = self.grad_subset(&theta, subset);
            let gmax = g.iter().fold(0.0f64, |m, &v| m.max(v.abs()));
            if gmax < settings.grad_tol {
                return Ok(theta);
            }

            let mut dir = match self.information(&theta, subset).ldlt() {
                Ok(f) => f.solve(&g),
                Err(_) => g.clone(),
            };
            if g.dot(&dir) <= 0.0 {
                // Newton direction is not an ascent direction here.
                dir = g.clone();
            }

            let mut step = 1.0;
            let mut improved = false;
            for _ in 0..40 {
                let mut candidate = theta.clone();
                for (a, j) in subset.clone().enumerate() {
                    candidate[j] += step * dir[a];
                }
                let lp_new = self.log_target(&candidate);
                if lp_new > lp {
                    theta = candidate;
                    lp = lp_new;
                    improved = true;
                    break;
                }
                step *= 0.5;
            }
            if !improved {
                return Err(Error::NoConvergence(settings.max_iter));
            }
        }

        // One last chance: the cap may land us already at the mode.
        let g = self.grad_subset(&theta, subset);
        let gmax = g.iter().fold(0.0f64, |m, &v| m.max(v.abs()));
        if gmax < settings.grad_tol {
            Ok(theta)
        } else {
            Err(Error::NoConvergence(settings.max_iter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn toy_block() -> (Array1<f64>, Vec<usize>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let y = arr1(&[0.0, 3.0, 5.0, 2.0, 1.0, 0.0, 4.0]);
        let regions = vec![0, 0, 0, 0, 1, 1, 1];
        let template = arr1(&[0.2, 0.6, 0.2]);
        let mu = arr1(&[0.5, 0.0]);
        let sigmasq = arr1(&[1.0, 2.0]);
        (y, regions, template, mu, sigmasq)
    }

    #[test]
    fn lambda_matches_hand_computation() {
        let y = arr1(&[1.0, 1.0, 1.0]);
        let regions = vec![0, 0, 0];
        let template = arr1(&[0.25, 0.5, 0.25]);
        let mu = arr1(&[0.0]);
        let sigmasq = arr1(&[1.0]);
        let model = BlockModel::new(y.view(), &regions, template.view(), &mu, &sigmasq);

        let theta = arr1(&[0.0, (2.0f64).ln(), 0.0]);
        let lam = model.lambda(&theta);
        // lambda[0] = 0.5*1 + 0.25*2, lambda[1] = 0.25 + 1.0 + 0.25,
        // lambda[2] = 0.5 + 0.25*1 (edge truncated)
        assert_abs_diff_eq!(lam[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lam[1], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lam[2], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (y, regions, template, mu, sigmasq) = toy_block();
        let model = BlockModel::new(y.view(), &regions, template.view(), &mu, &sigmasq);
        let theta = arr1(&[0.1, 0.7, 1.1, 0.4, -0.2, 0.0, 0.9]);
        let subset = 1..6;
        let g = model.grad_subset(&theta, &subset);

        let h = 1e-6;
        for (a, j) in subset.clone().enumerate() {
            let mut up = theta.clone();
            up[j] += h;
            let mut down = theta.clone();
            down[j] -= h;
            let fd = (model.log_target(&up) - model.log_target(&down)) / (2.0 * h);
            assert_abs_diff_eq!(g[a], fd, epsilon = 1e-4);
        }
    }

    #[test]
    fn information_matches_finite_difference_hessian() {
        let (y, regions, template, mu, sigmasq) = toy_block();
        let model = BlockModel::new(y.view(), &regions, template.view(), &mu, &sigmasq);
        let theta = arr1(&[0.1, 0.7, 1.1, 0.4, -0.2, 0.0, 0.9]);
        let subset = 1..6;
        let info = model.information(&theta, &subset);

        let h = 1e-5;
        for (a, j) in subset.clone().enumerate() {
            let mut up = theta.clone();
            up[j] += h;
            let mut down = theta.clone();
            down[j] -= h;
            let g_up = model.grad_subset(&up, &subset);
            let g_down = model.grad_subset(&down, &subset);
            for b in 0..subset.len() {
                // Negative Hessian column via central differences.
                let fd = -(g_up[b] - g_down[b]) / (2.0 * h);
                assert_abs_diff_eq!(info.get(b, a), fd, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn mode_search_reaches_stationary_point() {
        let (y, regions, template, mu, sigmasq) = toy_block();
        let model = BlockModel::new(y.view(), &regions, template.view(), &mu, &sigmasq);
        let theta0 = Array1::zeros(7);
        let subset = 1..6;
        let settings = SolverSettings::default();
        let mode = model.find_mode(&theta0, &subset, &settings).unwrap();

        let g = model.grad_subset(&mode, &subset);
        for &gi in g.iter() {
            assert!(gi.abs() < 1e-6, "gradient component {} too large", gi);
        }
        assert!(model.log_target(&mode) >= model.log_target(&theta0));
        // Coordinates outside the subset stay fixed.
        assert_eq!(mode[0], theta0[0]);
        assert_eq!(mode[6], theta0[6]);
    }

    #[test]
    fn iteration_cap_yields_no_convergence() {
        let (y, regions, template, mu, sigmasq) = toy_block();
        let model = BlockModel::new(y.view(), &regions, template.view(), &mu, &sigmasq);
        // A zero cap with a non-stationary start must fail, not return early.
        let theta0 = Array1::zeros(7);
        let settings = SolverSettings {
            grad_tol: 1e-6,
            max_iter: 0,
        };
        let err = model.find_mode(&theta0, &(1..6), &settings).unwrap_err();
        assert!(matches!(err, Error::NoConvergence(0)));
    }
}
