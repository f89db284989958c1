use super::error::EngineError;
use super::types::{HistogramBin, SimulationSummary};

pub fn summarize(outcomes: &[f64]) -> Result<SimulationSummary, EngineError> {
    if outcomes.is_empty() {
        return Err(EngineError::EmptyDistribution);
    }

    let n = outcomes.len();
    let mean = outcomes.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        outcomes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let std_dev = variance.sqrt();
    let positive = outcomes.iter().filter(|v| **v > 0.0).count();

    let mut sorted = outcomes.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    Ok(SimulationSummary {
        simulations: n,
        mean,
        std_dev,
        std_error: std_dev / (n as f64).sqrt(),
        probability_positive: positive as f64 / n as f64,
        p5: percentile_sorted(&sorted, 5.0),
        p50: percentile_sorted(&sorted, 50.0),
        p95: percentile_sorted(&sorted, 95.0),
        min: sorted[0],
        max: sorted[n - 1],
    })
}

/// Percentile `p` in `[0, 100]` with linear interpolation between the two
/// closest ranks. Sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> Result<f64, EngineError> {
    if values.is_empty() {
        return Err(EngineError::EmptyDistribution);
    }

    values.sort_by(|a, b| a.total_cmp(b));
    Ok(percentile_sorted(values, p))
}

fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] + (values[upper] - values[lower]) * w
    }
}

/// Equal-width histogram over `[min, max]`; the last bin includes `max`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0_usize; bins];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| HistogramBin {
            lower: min + width * idx as f64,
            upper: if idx + 1 == bins {
                max
            } else {
                min + width * (idx + 1) as f64
            },
            count,
        })
        .collect()
}
