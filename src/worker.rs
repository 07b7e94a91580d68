//! Sampling worker: one block-level Metropolis-Hastings step per `Work`
//! command.
//!
//! Each worker keeps private snapshots of `theta`, `mu` and `sigmasq`,
//! refreshed by `Sync` at the start of every sweep and by `Update` between
//! blocks within a sweep. A `Work` command names only the block's start
//! offset; the worker derives the padded block, the interior subset it may
//! perturb, and the non-overlapping output range it must return.
//!
//! Two conservative numeric policies are deliberate and load-bearing:
//! a block whose information matrix fails to factorize is always rejected,
//! and a proposal that would overflow the exponential transform downstream
//! is rejected without evaluating the likelihood ratio.

use crossbeam_channel::{Receiver, Sender};
use ndarray::{s, Array1};
use ndarray_stats::QuantileExt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StudentT};
use std::ops::Range;
use std::sync::Arc;

use crate::config::{SamplerConfig, SolverSettings};
use crate::data::SequenceData;
use crate::init::InitialState;
use crate::messages::{BlockResult, Command};
use crate::solver::BlockModel;

/// Proposals at or beyond this value would overflow `exp(theta)` math.
fn overflow_bound() -> f64 {
    f64::MAX.ln() / 2.0
}

pub struct Worker {
    id: usize,
    data: Arc<SequenceData>,
    block_width: usize,
    prop_df: f64,
    solver: SolverSettings,
    theta: Array1<f64>,
    mu: Array1<f64>,
    sigmasq: Array1<f64>,
    rng: SmallRng,
    commands: Receiver<Command>,
    results: Sender<BlockResult>,
}

impl Worker {
    pub fn new(
        id: usize,
        data: Arc<SequenceData>,
        config: &SamplerConfig,
        init: &InitialState,
        commands: Receiver<Command>,
        results: Sender<BlockResult>,
    ) -> Self {
        let block_width = config.effective_block_width(data.len());
        Self {
            id,
            data,
            block_width,
            prop_df: config.prop_df,
            solver: config.solver,
            theta: init.theta.clone(),
            mu: init.mu.clone(),
            sigmasq: init.sigmasq.clone(),
            rng: SmallRng::seed_from_u64(config.seed + 1 + id as u64),
            commands,
            results,
        }
    }

    /// Command loop; returns when told to stop or when either channel closes.
    pub fn run(mut self) {
        while let Ok(cmd) = self.commands.recv() {
            match cmd {
                Command::Sync { theta, mu, sigmasq } => {
                    self.theta = (*theta).clone();
                    self.mu = (*mu).clone();
                    self.sigmasq = (*sigmasq).clone();
                }
                Command::Update { theta } => {
                    self.theta = (*theta).clone();
                }
                Command::Work { start } => {
                    let result = self.sample_block(start);
                    if self.results.send(result).is_err() {
                        break;
                    }
                }
                Command::Stop => break,
            }
        }
    }

    /// Block geometry relative to the padded block: (block range, interior
    /// subset, output range).
    fn geometry(&self, start: usize) -> (Range<usize>, Range<usize>, Range<usize>) {
        let len = self.data.len();
        let w = self.data.half_width();
        let end = (start + self.block_width).min(len);

        let bs = start.saturating_sub(w);
        let be = (end + w).min(len);

        let sub_lo = if start == 0 { 0 } else { start + w };
        let sub_hi = if end == len { len } else { end - w };

        (bs..be, (sub_lo - bs)..(sub_hi.max(sub_lo) - bs), (start - bs)..(end - bs))
    }

    fn sample_block(&mut self, start: usize) -> BlockResult {
        let (block, subset, out) = self.geometry(start);
        let theta_block = self.theta.slice(s![block.clone()]).to_owned();
        let y_block = self.data.y.slice(s![block.clone()]);
        let regions_block = &self.data.region_types[block.clone()];
        let model = BlockModel::new(
            y_block,
            regions_block,
            self.data.template.view(),
            &self.mu,
            &self.sigmasq,
        );

        let theta_hat = match model.find_mode(&theta_block, &subset, &self.solver) {
            Ok(t) => t,
            Err(_) => return self.rejected(&theta_block, &out),
        };

        let info = model.information(&theta_hat, &subset);
        let factor = match info.ldlt() {
            Ok(f) => f,
            // Always reject: conservative fallback, not an abort.
            Err(_) => return self.rejected(&theta_block, &out),
        };
        let sqrt_d = factor.diag().mapv(f64::sqrt);

        // Multivariate-t perturbation around the mode, decorrelated by the
        // factor: theta' = theta_hat + L^-T (z / sqrt(D)).
        let student = StudentT::new(self.prop_df).expect("validated prop_df");
        let z = Array1::from_iter((0..subset.len()).map(|_| student.sample(&mut self.rng)));
        let perturbation = factor.solve_unit_lower_transpose(&(&z / &sqrt_d));

        let mut theta_prop = theta_block.clone();
        for (a, j) in subset.clone().enumerate() {
            theta_prop[j] = theta_hat[j] + perturbation[a];
        }

        match theta_prop.max() {
            Ok(&m) if m < overflow_bound() => {}
            // Overflow-prone (or non-finite) proposal: always reject.
            _ => return self.rejected(&theta_block, &out),
        }

        // Demean and decorrelate the current value the same way the draw was
        // correlated, so both proposal densities use iid t coordinates.
        let diff = Array1::from_iter(subset.clone().map(|j| theta_block[j] - theta_hat[j]));
        let z_prev = factor.unit_lower_transpose_mul(&diff) * &sqrt_d;

        let log_target_ratio = model.log_target(&theta_prop) - model.log_target(&theta_block);
        let df = self.prop_df;
        let log_prop_ratio = -0.5
            * (df + 1.0)
            * z.iter()
                .zip(z_prev.iter())
                .map(|(&a, &b)| (1.0 + a * a / df).ln() - (1.0 + b * b / df).ln())
                .sum::<f64>();

        let log_accept_prob = log_target_ratio - log_prop_ratio;
        let u: f64 = self.rng.gen();
        if u.ln() < log_accept_prob {
            BlockResult {
                worker: self.id,
                values: theta_prop.slice(s![out]).to_vec(),
                accepted: true,
            }
        } else {
            self.rejected(&theta_block, &out)
        }
    }

    fn rejected(&self, theta_block: &Array1<f64>, out: &Range<usize>) -> BlockResult {
        BlockResult {
            worker: self.id,
            values: theta_block.slice(s![out.clone()]).to_vec(),
            accepted: false,
        }
    }
}
