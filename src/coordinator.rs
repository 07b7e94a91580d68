//! Sampling coordinator: owns the draw histories and drives the worker pool.
//!
//! Each sweep is a strict generation: broadcast the previous row, dispatch a
//! randomized double-scan schedule of blocks to whichever workers are idle,
//! merge results as they arrive (in any order), then draw the region-level
//! hyperparameters from their closed-form conditionals on the coordinator
//! thread. Draw histories are append-only: each row is written exactly once.

use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;

use crate::config::SamplerConfig;
use crate::data::SequenceData;
use crate::error::{Error, Result};
use crate::init::InitialState;
use crate::messages::{BlockResult, Command};
use crate::schedule;
use crate::worker::Worker;

/// Complete draw history of one run.
///
/// Rows are iterations; row 0 holds the initial state. Rows are written once
/// and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    /// Log-occupancy draws, shape `(max_iter, L)`.
    pub theta: Array2<f64>,
    /// Region log-mean draws, shape `(max_iter, n_regions)`.
    pub mu: Array2<f64>,
    /// Region log-variance draws, shape `(max_iter, n_regions)`.
    pub sigmasq: Array2<f64>,
    pub region_ids: Vec<usize>,
    /// Number of accepted block proposals covering each position.
    pub accepts: Array1<u64>,
}

impl RunHistory {
    pub fn n_iterations(&self) -> usize {
        self.theta.nrows()
    }
}

#[derive(Debug)]
pub struct Coordinator {
    data: Arc<SequenceData>,
    config: SamplerConfig,
}

impl Coordinator {
    /// Validates the configuration against the data and builds a coordinator.
    pub fn new(data: SequenceData, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        if data.is_empty() {
            return Err(Error::BadConfig("sequence must be non-empty".into()));
        }
        let block_width = config.effective_block_width(data.len());
        let half_width = data.half_width();
        if block_width <= 2 * half_width {
            return Err(Error::BlockTooNarrow {
                block_width,
                half_width,
            });
        }
        Ok(Self {
            data: Arc::new(data),
            config,
        })
    }

    /// Runs the sampler from the default `ln(y + 1)` initialization.
    pub fn run(&self) -> Result<RunHistory> {
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        let init = InitialState::from_counts(&self.data, &self.config.prior, &mut rng)?;
        self.run_inner(init, rng, None)
    }

    /// Runs the sampler from a caller-provided warm start.
    pub fn run_from(&self, init: InitialState) -> Result<RunHistory> {
        init.validate(&self.data)?;
        let rng = SmallRng::seed_from_u64(self.config.seed);
        self.run_inner(init, rng, None)
    }

    /// Same as [`Coordinator::run`], with a progress bar on the sweep loop.
    pub fn run_with_progress(&self) -> Result<RunHistory> {
        let pb = ProgressBar::new((self.config.max_iter - 1) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .expect("static template")
                .progress_chars("##-"),
        );
        pb.set_prefix("Sweeps");
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        let init = InitialState::from_counts(&self.data, &self.config.prior, &mut rng)?;
        let out = self.run_inner(init, rng, Some(&pb));
        pb.finish_with_message("Done!");
        out
    }

    fn run_inner(
        &self,
        init: InitialState,
        mut rng: SmallRng,
        pb: Option<&ProgressBar>,
    ) -> Result<RunHistory> {
        let len = self.data.len();
        let n_regions = self.data.n_regions();
        let max_iter = self.config.max_iter;
        let block_width = self.config.effective_block_width(len);

        let mut theta = Array2::<f64>::zeros((max_iter, len));
        let mut mu = Array2::<f64>::zeros((max_iter, n_regions));
        let mut sigmasq = Array2::<f64>::zeros((max_iter, n_regions));
        theta.row_mut(0).assign(&init.theta);
        mu.row_mut(0).assign(&init.mu);
        sigmasq.row_mut(0).assign(&init.sigmasq);
        let mut accepts = Array1::<u64>::zeros(len);

        let prior_mean = self.prior_means();

        thread::scope(|scope| -> Result<()> {
            let (res_tx, res_rx): (Sender<BlockResult>, Receiver<BlockResult>) = unbounded();
            let mut commands = Vec::with_capacity(self.config.n_workers);
            for id in 0..self.config.n_workers {
                let (cmd_tx, cmd_rx) = unbounded();
                let worker = Worker::new(
                    id,
                    Arc::clone(&self.data),
                    &self.config,
                    &init,
                    cmd_rx,
                    res_tx.clone(),
                );
                scope.spawn(move || worker.run());
                commands.push(cmd_tx);
            }
            drop(res_tx);

            for t in 1..max_iter {
                let theta_prev = Arc::new(theta.row(t - 1).to_owned());
                let mu_prev = Arc::new(mu.row(t - 1).to_owned());
                let sigmasq_prev = Arc::new(sigmasq.row(t - 1).to_owned());
                for tx in &commands {
                    tx.send(Command::Sync {
                        theta: Arc::clone(&theta_prev),
                        mu: Arc::clone(&mu_prev),
                        sigmasq: Arc::clone(&sigmasq_prev),
                    })
                    .map_err(|_| Error::WorkerDisconnected)?;
                }

                let mut theta_t = (*theta_prev).clone();
                let starts = schedule::shuffled_schedule(len, block_width, &mut rng);
                let n_jobs = starts.len();
                let mut assigned = vec![0usize; self.config.n_workers];
                let mut n_started = 0;
                let mut n_completed = 0;

                for id in 0..self.config.n_workers.min(n_jobs) {
                    commands[id]
                        .send(Command::Work {
                            start: starts[n_started],
                        })
                        .map_err(|_| Error::WorkerDisconnected)?;
                    assigned[id] = starts[n_started];
                    n_started += 1;
                }

                while n_completed < n_jobs {
                    let result = res_rx.recv().map_err(|_| Error::WorkerDisconnected)?;
                    n_completed += 1;

                    // The target range comes from the assignment table, never
                    // from delivery order.
                    let start = assigned[result.worker];
                    let range = schedule::output_range(start, block_width, len);
                    debug_assert_eq!(result.values.len(), range.len());
                    theta_t
                        .slice_mut(s![range.clone()])
                        .assign(&Array1::from_vec(result.values));
                    if result.accepted {
                        for p in range {
                            accepts[p] += 1;
                        }
                    }

                    if n_started < n_jobs {
                        let snapshot = Arc::new(theta_t.clone());
                        commands[result.worker]
                            .send(Command::Update { theta: snapshot })
                            .map_err(|_| Error::WorkerDisconnected)?;
                        commands[result.worker]
                            .send(Command::Work {
                                start: starts[n_started],
                            })
                            .map_err(|_| Error::WorkerDisconnected)?;
                        assigned[result.worker] = starts[n_started];
                        n_started += 1;
                    }
                }

                theta.row_mut(t).assign(&theta_t);
                self.draw_region_params(
                    &theta_t,
                    &prior_mean,
                    &mut mu.row_mut(t),
                    &mut sigmasq.row_mut(t),
                    &mut rng,
                )?;

                if let Some(pb) = pb {
                    pb.inc(1);
                }
            }

            for tx in &commands {
                // Workers may already be gone if something failed; halting is
                // best effort.
                let _ = tx.send(Command::Stop);
            }
            Ok(())
        })?;

        Ok(RunHistory {
            theta,
            mu,
            sigmasq,
            region_ids: self.data.region_ids(),
            accepts,
        })
    }

    /// Prior means per region: the configured `mu0`, or adapted from each
    /// region's mean read coverage (log scale, bias-corrected by
    /// `sigmasq0 / 2`). Zero-coverage regions keep a prior mean of 0.
    fn prior_means(&self) -> Array1<f64> {
        let n_regions = self.data.n_regions();
        match self.config.prior.mu0 {
            Some(m0) => Array1::from_elem(n_regions, m0),
            None => {
                let sigmasq0 = self.config.prior.sigmasq0();
                let mut means = Array1::zeros(n_regions);
                for region in &self.data.regions {
                    let coverage = self
                        .data
                        .y
                        .slice(s![region.start..region.end])
                        .mean()
                        .unwrap_or(0.0);
                    if coverage > 0.0 {
                        means[region.id] = coverage.ln() - sigmasq0 / 2.0;
                    }
                }
                means
            }
        }
    }

    /// Closed-form Gibbs draw of `(sigmasq, mu)` for every region given the
    /// current theta row.
    fn draw_region_params(
        &self,
        theta_t: &Array1<f64>,
        prior_mean: &Array1<f64>,
        mu_row: &mut ndarray::ArrayViewMut1<f64>,
        sigmasq_row: &mut ndarray::ArrayViewMut1<f64>,
        rng: &mut SmallRng,
    ) -> Result<()> {
        let prior = &self.config.prior;
        for region in &self.data.regions {
            let slice = theta_t.slice(s![region.start..region.end]);
            let n = region.len() as f64;
            let mean = slice.mean().unwrap_or(0.0);
            let var = slice.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);
            let pm = prior_mean[region.id];

            let shape = n / 2.0 + prior.a0;
            let rate = var * n / 2.0
                + prior.b0
                + prior.k0 * n / (2.0 * (1.0 + prior.k0)) * (mean - pm) * (mean - pm);
            let gamma = Gamma::new(shape, 1.0).expect("positive shape");
            // The scaled reciprocal can overflow on an extreme gamma draw;
            // surface that as an error rather than sampling from a broken
            // normal downstream.
            let draw = rate / gamma.sample(rng);
            if !draw.is_finite() {
                return Err(Error::DegenerateDraw(region.id));
            }
            sigmasq_row[region.id] = draw;

            let mean_mu = (mean + pm * prior.k0) / (1.0 + prior.k0);
            let var_mu = sigmasq_row[region.id] / ((1.0 + prior.k0) * n);
            let normal = Normal::new(mean_mu, var_mu.sqrt()).expect("finite normal parameters");
            mu_row[region.id] = normal.sample(rng);
        }
        Ok(())
    }
}
