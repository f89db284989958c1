mod engine;
mod error;
mod sampler;
mod solver;
mod summary;
mod types;
mod valuation;

pub use engine::{CancelToken, run_monte_carlo, run_simulation};
pub use error::EngineError;
pub use sampler::{sample_cash_flows, sample_triangular};
pub use summary::{histogram, percentile, summarize};
pub use types::{
    DEFAULT_CHUNK_SIZE, DEFAULT_SEED, DeterministicAnalysis, HistogramBin, PaybackResult,
    Scenario, SimulationConfig, SimulationSummary,
};
pub use valuation::{analyze_project, apply_variation, irr, irr_sign_changes, npv, simple_payback};
