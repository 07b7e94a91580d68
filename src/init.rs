//! Initial parameter state for a run.
//!
//! Row 0 of every draw history comes from here: either the default
//! `theta = ln(y + 1)` start or a caller-provided warm start (for example
//! coefficients from an earlier EM fit). The region-level parameters are then
//! seeded with draws from their closed-form conditional posteriors given that
//! starting theta. Warm starts are validated up front; a non-finite theta is
//! a fatal input error, never a mid-run surprise.

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal};

use crate::config::Prior;
use crate::data::SequenceData;
use crate::error::{Error, Result};

/// Starting values for `theta`, `mu` and `sigmasq`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialState {
    pub theta: Array1<f64>,
    pub mu: Array1<f64>,
    pub sigmasq: Array1<f64>,
}

impl InitialState {
    /// Default initialization from the raw counts: `theta = ln(y + 1)`.
    pub fn from_counts<R: Rng>(data: &SequenceData, prior: &Prior, rng: &mut R) -> Result<Self> {
        let theta = data.y.mapv(|c| (c + 1.0).ln());
        Self::draw_region_state(theta, data, prior, rng)
    }

    /// Warm start from an existing theta estimate.
    ///
    /// Per region draws `sigmasq ~ InvGamma(n/2 + a0, var * n/2 + b0)` and
    /// `mu | sigmasq ~ N(mean, sigmasq / n)` where `mean` and `var` are the
    /// within-region moments of `theta`. Fails on any non-finite theta entry.
    pub fn from_theta<R: Rng>(
        theta: Array1<f64>,
        data: &SequenceData,
        prior: &Prior,
        rng: &mut R,
    ) -> Result<Self> {
        if let Some(i) = theta.iter().position(|v| !v.is_finite()) {
            return Err(Error::NonFiniteTheta(i));
        }
        Self::draw_region_state(theta, data, prior, rng)
    }

    fn draw_region_state<R: Rng>(
        theta: Array1<f64>,
        data: &SequenceData,
        prior: &Prior,
        rng: &mut R,
    ) -> Result<Self> {
        let n_regions = data.n_regions();
        let mut mu = Array1::zeros(n_regions);
        let mut sigmasq = Array1::ones(n_regions);

        for region in &data.regions {
            let slice = theta.slice(ndarray::s![region.start..region.end]);
            let n = region.len() as f64;
            let mean = slice.mean().unwrap_or(0.0);
            let var = slice.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);

            let shape = n / 2.0 + prior.a0;
            let rate = var * n / 2.0 + prior.b0;
            // Inverse-gamma draw via the reciprocal of a gamma variate. The
            // reciprocal can overflow on an extreme draw; that is a fatal
            // degeneracy, not something to sample through.
            let gamma = Gamma::new(shape, 1.0 / rate).expect("positive gamma parameters");
            let draw = 1.0 / gamma.sample(rng);
            if !draw.is_finite() {
                return Err(Error::DegenerateDraw(region.id));
            }
            sigmasq[region.id] = draw;

            let sd = (sigmasq[region.id] / n).sqrt();
            let normal = Normal::new(mean, sd).expect("finite normal parameters");
            mu[region.id] = normal.sample(rng);
        }

        Ok(Self { theta, mu, sigmasq })
    }

    /// Checks a caller-assembled state against the data: shapes must match,
    /// theta and mu must be finite, sigmasq must be finite and positive.
    pub(crate) fn validate(&self, data: &SequenceData) -> Result<()> {
        if self.theta.len() != data.len()
            || self.mu.len() != data.n_regions()
            || self.sigmasq.len() != data.n_regions()
        {
            return Err(Error::BadConfig(
                "initial state shapes do not match the data".into(),
            ));
        }
        if let Some(i) = self.theta.iter().position(|v| !v.is_finite()) {
            return Err(Error::NonFiniteTheta(i));
        }
        if self.mu.iter().any(|m| !m.is_finite()) {
            return Err(Error::BadConfig("initial mu must be finite".into()));
        }
        if self.sigmasq.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(Error::BadConfig(
                "initial sigmasq must be finite and positive".into(),
            ));
        }
        Ok(())
    }
}
