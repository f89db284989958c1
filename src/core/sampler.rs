use rand::Rng;
use rand_distr::{Distribution, Triangular};

use super::error::EngineError;
use super::types::Scenario;

/// One draw from the triangular distribution described by `scenario`.
///
/// A degenerate scenario (`low == high`) is a point mass and returns `low`
/// without touching the generator. An unordered or non-finite triple is
/// rejected with `EngineError::InvalidScenario`.
pub fn sample_triangular<R: Rng + ?Sized>(
    rng: &mut R,
    scenario: &Scenario,
) -> Result<f64, EngineError> {
    draw(rng, scenario, 1)
}

/// One cash flow per project year, in scenario order.
pub fn sample_cash_flows<R: Rng + ?Sized>(
    rng: &mut R,
    scenarios: &[Scenario],
) -> Result<Vec<f64>, EngineError> {
    let mut flows = Vec::with_capacity(scenarios.len());
    sample_cash_flows_into(rng, scenarios, &mut flows)?;
    Ok(flows)
}

pub(crate) fn sample_cash_flows_into<R: Rng + ?Sized>(
    rng: &mut R,
    scenarios: &[Scenario],
    flows: &mut Vec<f64>,
) -> Result<(), EngineError> {
    flows.clear();
    for (idx, scenario) in scenarios.iter().enumerate() {
        flows.push(draw(rng, scenario, idx + 1)?);
    }
    Ok(())
}

fn draw<R: Rng + ?Sized>(
    rng: &mut R,
    scenario: &Scenario,
    year: usize,
) -> Result<f64, EngineError> {
    scenario.validate(year)?;
    if scenario.is_degenerate() {
        return Ok(scenario.low);
    }

    let dist = Triangular::new(scenario.low, scenario.high, scenario.mode).map_err(|_| {
        EngineError::InvalidScenario {
            year,
            low: scenario.low,
            mode: scenario.mode,
            high: scenario.high,
        }
    })?;
    Ok(dist.sample(rng))
}
