use std::fmt;

use serde::Serialize;

use super::error::EngineError;

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 42;

/// Trials drawn from a single random stream before the driver moves on to a
/// freshly seeded one.
pub const DEFAULT_CHUNK_SIZE: usize = 1_024;

/// Pessimistic, most likely and optimistic cash flow for one project year.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Scenario {
    pub low: f64,
    pub mode: f64,
    pub high: f64,
}

impl Scenario {
    pub fn new(low: f64, mode: f64, high: f64) -> Result<Self, EngineError> {
        let scenario = Self { low, mode, high };
        scenario.validate(1)?;
        Ok(scenario)
    }

    /// A point mass: every draw returns `value`.
    pub fn fixed(value: f64) -> Self {
        Self {
            low: value,
            mode: value,
            high: value,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.low == self.high
    }

    pub(crate) fn validate(&self, year: usize) -> Result<(), EngineError> {
        let finite = self.low.is_finite() && self.mode.is_finite() && self.high.is_finite();
        if !finite || self.low > self.mode || self.mode > self.high {
            return Err(EngineError::InvalidScenario {
                year,
                low: self.low,
                mode: self.mode,
                high: self.high,
            });
        }
        Ok(())
    }
}

impl From<(f64, f64, f64)> for Scenario {
    fn from((low, mode, high): (f64, f64, f64)) -> Self {
        Self { low, mode, high }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PaybackResult {
    Recovered { years: u32, months: u32 },
    NotRecovered,
}

impl PaybackResult {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

impl fmt::Display for PaybackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Recovered { years, months } => {
                let year_label = if years == 1 { "year" } else { "years" };
                let month_label = if months == 1 { "month" } else { "months" };
                write!(f, "{years} {year_label} and {months} {month_label}")
            }
            Self::NotRecovered => f.write_str("not recovered within the project horizon"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicAnalysis {
    pub npv: f64,
    pub payback: PaybackResult,
    pub irr: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub rate: f64,
    pub initial_investment: f64,
    pub scenarios: Vec<Scenario>,
    pub simulations: usize,
    pub seed: u64,
    pub chunk_size: usize,
}

impl SimulationConfig {
    pub fn new(
        rate: f64,
        initial_investment: f64,
        scenarios: Vec<Scenario>,
        simulations: usize,
    ) -> Self {
        Self {
            rate,
            initial_investment,
            scenarios,
            simulations,
            seed: DEFAULT_SEED,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub simulations: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub std_error: f64,
    pub probability_positive: f64,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}
