use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, warn};

use super::error::EngineError;
use super::sampler::sample_cash_flows_into;
use super::types::{Scenario, SimulationConfig};
use super::valuation::{npv, validate_rate};

/// Cooperative stop signal for long simulations. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(EngineError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// NPV distribution for `num_simulations` trials using the default seed.
pub fn run_monte_carlo(
    rate: f64,
    initial_investment: f64,
    scenarios: &[Scenario],
    num_simulations: usize,
) -> Result<Vec<f64>, EngineError> {
    let config = SimulationConfig::new(
        rate,
        initial_investment,
        scenarios.to_vec(),
        num_simulations,
    );
    run_simulation(&config, &CancelToken::new())
}

/// Runs every trial in `config`, returning one NPV per trial in trial order.
///
/// Trials are grouped in chunks of `config.chunk_size`; each chunk draws from
/// its own generator seeded from `config.seed` and the chunk index, so the
/// output depends only on the config and not on how rayon schedules work.
pub fn run_simulation(
    config: &SimulationConfig,
    cancel: &CancelToken,
) -> Result<Vec<f64>, EngineError> {
    validate_config(config)?;

    let chunk_size = config.chunk_size.max(1);
    let chunks = config.simulations.div_ceil(chunk_size);
    debug!(
        simulations = config.simulations,
        years = config.scenarios.len(),
        chunks,
        seed = config.seed,
        "starting monte carlo run"
    );

    let parts = (0..chunks)
        .into_par_iter()
        .map(|chunk| {
            let start = chunk * chunk_size;
            let len = chunk_size.min(config.simulations - start);
            simulate_chunk(config, chunk as u64, len, cancel)
        })
        .collect::<Result<Vec<_>, _>>();

    let parts = match parts {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, "monte carlo run aborted");
            return Err(err);
        }
    };

    let mut outcomes = Vec::with_capacity(config.simulations);
    for part in parts {
        outcomes.extend(part);
    }
    Ok(outcomes)
}

fn validate_config(config: &SimulationConfig) -> Result<(), EngineError> {
    validate_rate(config.rate)?;
    if !config.initial_investment.is_finite() {
        return Err(EngineError::NonFiniteInput {
            what: "initial investment",
        });
    }
    if config.scenarios.is_empty() {
        return Err(EngineError::EmptyScenarios);
    }
    for (idx, scenario) in config.scenarios.iter().enumerate() {
        scenario.validate(idx + 1)?;
    }
    if config.simulations == 0 {
        return Err(EngineError::ZeroSimulations);
    }
    Ok(())
}

fn simulate_chunk(
    config: &SimulationConfig,
    chunk: u64,
    trials: usize,
    cancel: &CancelToken,
) -> Result<Vec<f64>, EngineError> {
    let mut rng = StdRng::seed_from_u64(derive_seed(config.seed, chunk));
    let mut flows = Vec::with_capacity(config.scenarios.len());
    let mut outcomes = Vec::with_capacity(trials);

    for _ in 0..trials {
        cancel.check()?;
        sample_cash_flows_into(&mut rng, &config.scenarios, &mut flows)?;
        outcomes.push(npv(config.rate, config.initial_investment, &flows)?);
    }
    Ok(outcomes)
}

fn derive_seed(base_seed: u64, chunk: u64) -> u64 {
    splitmix64(base_seed ^ chunk.rotate_left(32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
