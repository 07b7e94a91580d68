//! End-to-end tests of the distributed sampler.

use deconv_mcmc::config::{Prior, SamplerConfig};
use deconv_mcmc::coordinator::Coordinator;
use deconv_mcmc::data::SequenceData;
use deconv_mcmc::init::InitialState;
use deconv_mcmc::io::{load_history, save_history};
use ndarray::{arr1, Array1};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tempfile::NamedTempFile;

/// Synthetic sequence with two regions and a 5-wide template (w = 2).
fn reference_data() -> SequenceData {
    let y = Array1::from_iter((0..20).map(|i| ((i * 5 + 2) % 7) as f64));
    let template = arr1(&[0.1, 0.2, 0.4, 0.2, 0.1]);
    let mut labels = vec![0usize; 10];
    labels.extend(vec![1usize; 10]);
    SequenceData::new(y, template, labels).unwrap()
}

#[test]
fn reference_scenario_produces_complete_histories() {
    // L = 20, 2 workers, block_width = 10, w = 2: the schedule covers the
    // sequence with blocks {0, 10} and {5, 15}; every position must receive a
    // value from exactly one block per scan, every iteration.
    let data = reference_data();
    let config = SamplerConfig::new(2, 6).with_block_width(10).with_seed(123);
    let history = Coordinator::new(data, config).unwrap().run().unwrap();

    assert_eq!(history.theta.dim(), (6, 20));
    assert_eq!(history.mu.dim(), (6, 2));
    assert_eq!(history.sigmasq.dim(), (6, 2));

    for v in history.theta.iter() {
        assert!(v.is_finite());
    }
    for &s in history.sigmasq.iter() {
        assert!(s > 0.0 && s.is_finite());
    }
    // Two blocks cover each position per sweep; five sweeps after init.
    for &a in history.accepts.iter() {
        assert!(a <= 10);
    }
}

#[test]
fn more_jobs_than_workers_exercises_dynamic_dispatch() {
    let y = Array1::from_iter((0..60).map(|i| ((i * 3 + 1) % 5) as f64));
    let template = arr1(&[0.25, 0.5, 0.25]);
    let data = SequenceData::new(y, template, vec![0; 60]).unwrap();
    // 12 blocks per sweep, only 2 workers: mid-sweep updates must flow.
    let config = SamplerConfig::new(2, 4).with_block_width(10).with_seed(7);
    let history = Coordinator::new(data, config).unwrap().run().unwrap();

    assert_eq!(history.theta.dim(), (4, 60));
    for v in history.theta.iter() {
        assert!(v.is_finite());
    }
}

#[test]
fn warm_start_runs_from_caller_theta() {
    let data = reference_data();
    let config = SamplerConfig::new(2, 4).with_block_width(10).with_seed(99);
    let coordinator = Coordinator::new(data, config).unwrap();

    let data_again = reference_data();
    let mut rng = SmallRng::seed_from_u64(99);
    let warm = InitialState::from_theta(
        Array1::from_elem(20, 0.5),
        &data_again,
        &Prior::default(),
        &mut rng,
    )
    .unwrap();
    let history = coordinator.run_from(warm).unwrap();
    assert_eq!(history.theta.row(0), Array1::from_elem(20, 0.5));
}

#[test]
fn run_bundle_round_trips_bit_for_bit() {
    let data = reference_data();
    let config = SamplerConfig::new(2, 5).with_block_width(10).with_seed(321);
    let history = Coordinator::new(data, config).unwrap().run().unwrap();

    let file = NamedTempFile::new().unwrap();
    save_history(&history, file.path()).unwrap();
    let reloaded = load_history(file.path()).unwrap();

    assert_eq!(history, reloaded);
    for (a, b) in history.theta.iter().zip(reloaded.theta.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
    for (a, b) in history.sigmasq.iter().zip(reloaded.sigmasq.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
