/*!
# deconv-mcmc

Distributed MCMC inference for a hierarchical Bayesian spatial deconvolution
model: a per-position latent log-occupancy curve observed through convolution
with a known kernel plus Poisson count noise, with region-level
hyperparameters sharing information across contiguous spans.

A [`coordinator::Coordinator`] owns the full parameter state and drives a
fixed pool of [`worker::Worker`] threads over channels. Each sweep broadcasts
the previous draw, covers the sequence with a randomized double-scan schedule
of overlapping blocks, and merges block-level Metropolis-Hastings results back
into a globally consistent Gibbs iteration; the cheap region-level updates
happen on the coordinator in closed form.

## Example

```no_run
use deconv_mcmc::config::SamplerConfig;
use deconv_mcmc::coordinator::Coordinator;
use deconv_mcmc::data::SequenceData;
use ndarray::arr1;

let y = arr1(&[0.0, 3.0, 7.0, 4.0, 1.0, 0.0, 2.0, 5.0, 3.0, 0.0]);
let template = arr1(&[0.25, 0.5, 0.25]);
let labels = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];

let data = SequenceData::new(y, template, labels)?;
let config = SamplerConfig::new(2, 100).with_block_width(5).with_seed(42);
let history = Coordinator::new(data, config)?.run()?;
println!("drew {} iterations", history.n_iterations());
# Ok::<(), deconv_mcmc::error::Error>(())
```
*/

pub mod banded;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod init;
pub mod io;
pub mod messages;
pub mod schedule;
pub mod solver;
pub mod worker;
