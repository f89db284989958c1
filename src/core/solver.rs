/// Starting point for Newton iterations, matching the usual spreadsheet guess.
const NEWTON_GUESS: f64 = 0.10;
const MAX_ITERATIONS: u32 = 200;
const VALUE_TOLERANCE: f64 = 1e-10;
const STEP_TOLERANCE: f64 = 1e-12;

/// Candidate rates scanned left to right for a sign change when Newton fails.
const BRACKET_GRID: [f64; 16] = [
    -1.0 + 1e-9,
    -0.999,
    -0.99,
    -0.9,
    -0.5,
    -0.2,
    0.0,
    0.1,
    0.25,
    0.5,
    1.0,
    2.0,
    10.0,
    100.0,
    1_000.0,
    1_000_000.0,
];

/// Rate `r > -1` with `sum_t flows[t] / (1 + r)^t == 0`, where `flows[0]` is
/// undiscounted.
pub(crate) fn solve_irr(flows: &[f64]) -> Option<f64> {
    if flows.len() < 2 || flows.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let has_inflow = flows.iter().any(|v| *v > 0.0);
    let has_outflow = flows.iter().any(|v| *v < 0.0);
    if !(has_inflow && has_outflow) {
        return None;
    }

    newton(flows).or_else(|| bisect(flows))
}

fn newton(flows: &[f64]) -> Option<f64> {
    let mut rate = NEWTON_GUESS;
    for _ in 0..MAX_ITERATIONS {
        let (value, slope) = value_and_slope(flows, rate);
        if !value.is_finite() || !slope.is_finite() {
            return None;
        }
        if value.abs() <= VALUE_TOLERANCE {
            return Some(rate);
        }
        if slope == 0.0 {
            return None;
        }

        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            return None;
        }
        if (next - rate).abs() <= STEP_TOLERANCE * (1.0 + rate.abs()) {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisect(flows: &[f64]) -> Option<f64> {
    let mut previous: Option<(f64, f64)> = None;
    for &point in &BRACKET_GRID {
        let value = value_at(flows, point);
        // Near -1 long horizons overflow to `inf - inf`; such points carry no sign.
        if value.is_nan() {
            continue;
        }
        if value.abs() <= VALUE_TOLERANCE {
            return Some(point);
        }
        if let Some((prev_point, prev_value)) = previous {
            if prev_value.signum() != value.signum() {
                return bisect_bracket(flows, prev_point, prev_value, point);
            }
        }
        previous = Some((point, value));
    }
    None
}

fn bisect_bracket(flows: &[f64], mut lo: f64, mut lo_value: f64, mut hi: f64) -> Option<f64> {
    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let value = value_at(flows, mid);
        if value.is_nan() {
            lo = mid;
            continue;
        }
        if value.abs() <= VALUE_TOLERANCE || (hi - lo) <= STEP_TOLERANCE * (1.0 + mid.abs()) {
            return Some(mid);
        }
        if value.signum() == lo_value.signum() {
            lo = mid;
            lo_value = value;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

fn value_at(flows: &[f64], rate: f64) -> f64 {
    value_and_slope(flows, rate).0
}

fn value_and_slope(flows: &[f64], rate: f64) -> (f64, f64) {
    let growth = 1.0 + rate;
    let mut discount = 1.0;
    let mut value = 0.0;
    let mut slope = 0.0;
    for (t, flow) in flows.iter().enumerate() {
        value += flow / discount;
        if t > 0 {
            slope -= t as f64 * flow / (discount * growth);
        }
        discount *= growth;
    }
    (value, slope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn value_and_slope_match_closed_form() {
        let (value, slope) = value_and_slope(&[-100.0, 110.0], 0.0);
        assert_approx(value, 10.0);
        assert_approx(slope, -110.0);
    }

    #[test]
    fn newton_converges_for_conventional_project() {
        let rate = newton(&[-100.0, 60.0, 60.0]).expect("newton should converge");
        assert_approx(value_at(&[-100.0, 60.0, 60.0], rate), 0.0);
    }

    #[test]
    fn bisection_finds_root_newton_overshoots() {
        let flows = [-100.0, 10.0];
        assert_eq!(newton(&flows), None);
        let rate = bisect(&flows).expect("bisection should bracket the root");
        assert_approx(rate, -0.9);
    }

    #[test]
    fn bisection_finds_large_rates() {
        let flows = [-1.0, 500.0];
        let rate = solve_irr(&flows).expect("root exists");
        assert!((rate - 499.0).abs() < 1e-6, "got {rate}");
    }

    #[test]
    fn solve_irr_rejects_single_sign_sequences() {
        assert_eq!(solve_irr(&[-1.0, -2.0]), None);
        assert_eq!(solve_irr(&[0.0, 0.0]), None);
        assert_eq!(solve_irr(&[-1.0]), None);
        assert_eq!(solve_irr(&[-1.0, f64::NAN]), None);
    }

    #[test]
    fn long_horizon_skips_grid_points_that_overflow() {
        let mut flows = vec![-1_000.0];
        flows.extend([1.0; 40]);
        flows[37] = -1.0;
        assert!(value_at(&flows, BRACKET_GRID[0]).is_nan());

        let rate = bisect(&flows).expect("sign change between -0.2 and 0");
        assert!((rate + 0.116_137_675_8).abs() < 1e-6, "got {rate}");
        assert!(value_at(&flows, rate).abs() < 1e-6);

        let rate = solve_irr(&flows).expect("root exists");
        assert!(value_at(&flows, rate).abs() < 1e-6);
    }

    #[test]
    fn multiple_sign_changes_report_a_valid_root() {
        // Roots at 10% and 20%.
        let flows = [-100.0, 230.0, -132.0];
        let rate = solve_irr(&flows).expect("root exists");
        assert!(value_at(&flows, rate).abs() < 1e-8);
        assert!((rate - 0.1).abs() < 1e-6 || (rate - 0.2).abs() < 1e-6);
    }
}
