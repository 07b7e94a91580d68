//! Immutable run configuration.
//!
//! All tuning knobs live in [`SamplerConfig`], constructed once and passed by
//! reference into the coordinator and workers. Nothing reads configuration
//! through globals.

use crate::error::{Error, Result};

/// Conjugate prior on the region-level parameters.
///
/// `1/sigmasq ~ Gamma(a0, b0)` and `mu | sigmasq ~ N(m, sigmasq / k0)` where
/// the prior mean `m` is either `mu0` or, when `mu0` is `None`, adapted per
/// region from its mean read coverage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    /// Prior mean for `mu`. `None` requests per-region adaptation.
    pub mu0: Option<f64>,
    /// Shrinkage weight pulling region means toward the prior mean.
    pub k0: f64,
    /// Shape pseudo-count of the inverse-gamma prior on `sigmasq`.
    pub a0: f64,
    /// Rate pseudo-count of the inverse-gamma prior on `sigmasq`.
    pub b0: f64,
}

impl Default for Prior {
    fn default() -> Self {
        Self {
            mu0: None,
            k0: 1.0,
            a0: 1.0,
            b0: 1.0,
        }
    }
}

impl Prior {
    /// Prior point estimate of `sigmasq`, used for the coverage bias
    /// correction of adaptive prior means.
    pub fn sigmasq0(&self) -> f64 {
        self.b0 / self.a0
    }
}

/// Settings for the block-local Newton mode search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Stop when the gradient infinity-norm drops below this.
    pub grad_tol: f64,
    /// Iteration cap; exceeding it fails the block.
    pub max_iter: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            grad_tol: 1e-6,
            max_iter: 100,
        }
    }
}

/// Full configuration for one sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Number of worker threads.
    pub n_workers: usize,
    /// Number of Gibbs sweeps, including the stored initial state.
    pub max_iter: usize,
    /// Block width for the distributed theta update.
    /// `None` defaults to `sequence length / n_workers`.
    pub block_width: Option<usize>,
    /// Degrees of freedom of the multivariate-t proposal.
    pub prop_df: f64,
    /// Seed for the coordinator RNG; worker `i` is seeded with `seed + 1 + i`.
    pub seed: u64,
    pub prior: Prior,
    pub solver: SolverSettings,
}

impl SamplerConfig {
    pub fn new(n_workers: usize, max_iter: usize) -> Self {
        Self {
            n_workers,
            max_iter,
            block_width: None,
            prop_df: 5.0,
            seed: 42,
            prior: Prior::default(),
            solver: SolverSettings::default(),
        }
    }

    /// Sets the block width explicitly.
    pub fn with_block_width(mut self, block_width: usize) -> Self {
        self.block_width = Some(block_width);
        self
    }

    /// Sets a new global seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.prior = prior;
        self
    }

    /// Resolves the effective block width for a sequence of length `len`.
    pub fn effective_block_width(&self, len: usize) -> usize {
        self.block_width.unwrap_or((len / self.n_workers).max(1))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_workers == 0 {
            return Err(Error::BadConfig("n_workers must be >= 1".into()));
        }
        if self.max_iter < 2 {
            return Err(Error::BadConfig(
                "max_iter must be >= 2 (the initial state occupies row 0)".into(),
            ));
        }
        if !(self.prop_df > 0.0) {
            return Err(Error::BadConfig("prop_df must be positive".into()));
        }
        if !(self.prior.a0 > 0.0 && self.prior.b0 > 0.0 && self.prior.k0 > 0.0) {
            return Err(Error::BadConfig("prior pseudo-counts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_width_is_length_over_workers() {
        let cfg = SamplerConfig::new(4, 10);
        assert_eq!(cfg.effective_block_width(100), 25);
        // Short sequences never yield a zero width.
        assert_eq!(cfg.effective_block_width(2), 1);
    }

    #[test]
    fn explicit_block_width_wins() {
        let cfg = SamplerConfig::new(4, 10).with_block_width(10);
        assert_eq!(cfg.effective_block_width(100), 10);
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(SamplerConfig::new(0, 10).validate().is_err());
    }

    #[test]
    fn rejects_single_iteration() {
        assert!(SamplerConfig::new(2, 1).validate().is_err());
    }
}
