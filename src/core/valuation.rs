use super::error::EngineError;
use super::solver::solve_irr;
use super::types::{DeterministicAnalysis, PaybackResult};

/// Net present value of `cash_flows` (year 1 first) discounted at `rate`,
/// plus the undiscounted `initial_investment` at year 0.
pub fn npv(rate: f64, initial_investment: f64, cash_flows: &[f64]) -> Result<f64, EngineError> {
    validate_rate(rate)?;
    ensure_finite(initial_investment, "initial investment")?;

    let growth = 1.0 + rate;
    let mut discount = 1.0;
    let mut total = initial_investment;
    for &flow in cash_flows {
        ensure_finite(flow, "cash flow")?;
        discount *= growth;
        total += flow / discount;
    }

    if !total.is_finite() {
        return Err(EngineError::NonFiniteResult);
    }
    Ok(total)
}

pub fn simple_payback(
    initial_investment: f64,
    cash_flows: &[f64],
) -> Result<PaybackResult, EngineError> {
    ensure_finite(initial_investment, "initial investment")?;
    let target = initial_investment.abs();
    if target == 0.0 {
        return Ok(PaybackResult::Recovered {
            years: 0,
            months: 0,
        });
    }

    let mut cumulative = 0.0;
    for (idx, &flow) in cash_flows.iter().enumerate() {
        ensure_finite(flow, "cash flow")?;
        let before = cumulative;
        cumulative += flow;
        if cumulative < target {
            continue;
        }

        // Reaching the target from below implies a positive flow this year.
        if flow <= 0.0 {
            return Err(EngineError::UndefinedPayback { year: idx + 1 });
        }

        let fraction = (target - before) / flow;
        let months = (fraction * 12.0).round() as u32;
        let years = idx as u32;
        return Ok(if months >= 12 {
            PaybackResult::Recovered {
                years: years + 1,
                months: 0,
            }
        } else {
            PaybackResult::Recovered { years, months }
        });
    }

    Ok(PaybackResult::NotRecovered)
}

/// Internal rate of return of `[initial_investment, cash_flows...]`, or
/// `None` when no real rate zeroes the NPV.
///
/// With several sign changes (see [`irr_sign_changes`]) this is the root
/// Newton reaches from 10%, falling back to the lowest root bracketed by a
/// left-to-right scan; it is not necessarily the root closest to zero.
pub fn irr(initial_investment: f64, cash_flows: &[f64]) -> Option<f64> {
    let mut flows = Vec::with_capacity(cash_flows.len() + 1);
    flows.push(initial_investment);
    flows.extend_from_slice(cash_flows);
    solve_irr(&flows)
}

/// Number of sign changes in `[initial_investment, cash_flows...]`, ignoring
/// zero flows. More than one means the IRR may not be unique.
pub fn irr_sign_changes(initial_investment: f64, cash_flows: &[f64]) -> usize {
    std::iter::once(initial_investment)
        .chain(cash_flows.iter().copied())
        .filter(|v| *v != 0.0)
        .collect::<Vec<_>>()
        .windows(2)
        .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
        .count()
}

pub fn analyze_project(
    rate: f64,
    initial_investment: f64,
    cash_flows: &[f64],
) -> Result<DeterministicAnalysis, EngineError> {
    Ok(DeterministicAnalysis {
        npv: npv(rate, initial_investment, cash_flows)?,
        payback: simple_payback(initial_investment, cash_flows)?,
        irr: irr(initial_investment, cash_flows),
    })
}

/// Scales every flow by `1 + percent / 100`.
pub fn apply_variation(cash_flows: &[f64], percent: f64) -> Vec<f64> {
    let factor = 1.0 + percent / 100.0;
    cash_flows.iter().map(|flow| flow * factor).collect()
}

pub(crate) fn validate_rate(rate: f64) -> Result<(), EngineError> {
    if !rate.is_finite() || rate <= -1.0 {
        return Err(EngineError::InvalidRate { rate });
    }
    Ok(())
}

fn ensure_finite(value: f64, what: &'static str) -> Result<(), EngineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::NonFiniteInput { what })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn npv_matches_hand_calculation() {
        let value = npv(0.10, -100_000.0, &[40_000.0, 50_000.0, 50_000.0]).expect("valid npv");
        let expected =
            -100_000.0 + 40_000.0 / 1.1 + 50_000.0 / 1.1_f64.powi(2) + 50_000.0 / 1.1_f64.powi(3);
        assert_approx(value, expected);
    }

    #[test]
    fn npv_with_no_cash_flows_is_initial_investment() {
        assert_eq!(npv(0.10, -12_345.67, &[]), Ok(-12_345.67));
        assert_eq!(npv(-0.5, 0.0, &[]), Ok(0.0));
    }

    #[test]
    fn npv_at_zero_rate_is_plain_sum() {
        let value = npv(0.0, -100.0, &[30.0, 30.0, 30.0]).expect("valid npv");
        assert_approx(value, -10.0);
    }

    #[test]
    fn npv_rejects_rate_at_or_below_minus_one() {
        assert_eq!(
            npv(-1.0, -100.0, &[110.0]),
            Err(EngineError::InvalidRate { rate: -1.0 })
        );
        assert!(matches!(
            npv(-1.5, -100.0, &[110.0]),
            Err(EngineError::InvalidRate { .. })
        ));
        assert!(matches!(
            npv(f64::NAN, -100.0, &[110.0]),
            Err(EngineError::InvalidRate { .. })
        ));
    }

    #[test]
    fn npv_rejects_non_finite_flows() {
        assert_eq!(
            npv(0.1, -100.0, &[f64::INFINITY]),
            Err(EngineError::NonFiniteInput { what: "cash flow" })
        );
        assert_eq!(
            npv(0.1, f64::NAN, &[]),
            Err(EngineError::NonFiniteInput {
                what: "initial investment"
            })
        );
    }

    #[test]
    fn npv_reports_overflow() {
        let flows = vec![1e300; 400];
        assert_eq!(
            npv(-0.999, 0.0, &flows),
            Err(EngineError::NonFiniteResult)
        );
    }

    #[test]
    fn payback_recovers_in_third_year() {
        let payback = simple_payback(-100_000.0, &[40_000.0, 50_000.0, 50_000.0]).expect("valid");
        assert_eq!(
            payback,
            PaybackResult::Recovered {
                years: 2,
                months: 2
            }
        );
        assert_eq!(payback.to_string(), "2 years and 2 months");
    }

    #[test]
    fn payback_exactly_on_year_boundary_has_zero_months() {
        let payback = simple_payback(-100.0, &[50.0, 50.0, 50.0]).expect("valid");
        assert_eq!(
            payback,
            PaybackResult::Recovered {
                years: 2,
                months: 0
            }
        );
    }

    #[test]
    fn payback_within_first_year() {
        let payback = simple_payback(-100.0, &[400.0]).expect("valid");
        assert_eq!(
            payback,
            PaybackResult::Recovered {
                years: 0,
                months: 3
            }
        );
        assert_eq!(payback.to_string(), "0 years and 3 months");
    }

    #[test]
    fn payback_rolls_twelve_months_into_next_year() {
        let payback = simple_payback(-99.0, &[100.0]).expect("valid");
        assert_eq!(
            payback,
            PaybackResult::Recovered {
                years: 1,
                months: 0
            }
        );
    }

    #[test]
    fn payback_not_recovered_is_a_result_not_an_error() {
        let payback = simple_payback(-100_000.0, &[10_000.0, 20_000.0]).expect("valid");
        assert_eq!(payback, PaybackResult::NotRecovered);
        assert!(!payback.is_recovered());
        assert_eq!(simple_payback(-1.0, &[]), Ok(PaybackResult::NotRecovered));
    }

    #[test]
    fn payback_survives_negative_years_before_recovery() {
        let payback = simple_payback(-100.0, &[60.0, -20.0, 0.0, 120.0]).expect("valid");
        // cumulative 60, 40, 40, 160: recovery in year four.
        assert_eq!(
            payback,
            PaybackResult::Recovered {
                years: 3,
                months: 6
            }
        );
    }

    #[test]
    fn payback_with_zero_investment_is_immediate() {
        assert_eq!(
            simple_payback(0.0, &[0.0, -5.0]),
            Ok(PaybackResult::Recovered {
                years: 0,
                months: 0
            })
        );
    }

    #[test]
    fn irr_of_single_period_matches_simple_return() {
        let rate = irr(-100.0, &[110.0]).expect("irr should exist");
        assert_approx(rate, 0.10);
    }

    #[test]
    fn irr_zeroes_npv_for_multi_year_project() {
        let flows = [40_000.0, 50_000.0, 50_000.0];
        let rate = irr(-100_000.0, &flows).expect("irr should exist");
        let value = npv(rate, -100_000.0, &flows).expect("valid npv");
        assert!(value.abs() < 1e-4, "npv at irr was {value}");
        assert!(rate > 0.15 && rate < 0.20, "unexpected irr {rate}");
    }

    #[test]
    fn irr_is_none_without_sign_change() {
        assert_eq!(irr(100.0, &[10.0, 20.0]), None);
        assert_eq!(irr(-100.0, &[-10.0, -20.0]), None);
        assert_eq!(irr(-100.0, &[]), None);
    }

    #[test]
    fn irr_handles_total_loss_projects() {
        let rate = irr(-100.0, &[10.0]).expect("irr should exist");
        assert_approx(rate, -0.9);
    }

    #[test]
    fn sign_changes_ignore_zero_flows() {
        assert_eq!(irr_sign_changes(-100.0, &[0.0, 50.0, 60.0]), 1);
        assert_eq!(irr_sign_changes(-100.0, &[230.0, -132.0]), 2);
        assert_eq!(irr_sign_changes(100.0, &[1.0]), 0);
    }

    #[test]
    fn analyze_project_bundles_all_metrics() {
        let analysis =
            analyze_project(0.10, -100_000.0, &[40_000.0, 50_000.0, 50_000.0]).expect("valid");
        assert!(analysis.npv > 0.0);
        assert!(analysis.payback.is_recovered());
        assert!(analysis.irr.is_some_and(|r| r > 0.10));
    }

    #[test]
    fn apply_variation_scales_all_flows() {
        let flows = apply_variation(&[100.0, 200.0], -30.0);
        assert_approx(flows[0], 70.0);
        assert_approx(flows[1], 140.0);
        assert_eq!(apply_variation(&[1.5], 0.0), vec![1.5]);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_npv_decreases_as_rate_rises_for_flat_positive_flows(
            flow in 1.0f64..1_000_000.0,
            years in 1usize..30,
            investment in -1_000_000.0f64..0.0,
            low_rate in -0.9f64..1.0,
            step in 0.001f64..1.0,
        ) {
            let flows = vec![flow; years];
            let low = npv(low_rate, investment, &flows).expect("valid npv");
            let high = npv(low_rate + step, investment, &flows).expect("valid npv");
            prop_assert!(high < low, "npv({}) = {} not below npv({}) = {}", low_rate + step, high, low_rate, low);
        }

        #[test]
        fn prop_npv_of_empty_flows_is_investment(
            rate in -0.99f64..5.0,
            investment in -1e9f64..1e9,
        ) {
            prop_assert_eq!(npv(rate, investment, &[]).expect("valid npv"), investment);
        }

        #[test]
        fn prop_irr_is_a_root_of_npv(
            investment in -1_000_000.0f64..-1_000.0,
            flows in proptest::collection::vec(100.0f64..500_000.0, 1..12),
        ) {
            if let Some(rate) = irr(investment, &flows) {
                let value = npv(rate, investment, &flows).expect("valid npv");
                prop_assert!(value.abs() <= 1e-4 * investment.abs(), "npv at irr {} was {}", rate, value);
            }
        }

        #[test]
        fn prop_payback_months_stay_below_twelve(
            investment in -1_000_000.0f64..-1.0,
            flows in proptest::collection::vec(-10_000.0f64..500_000.0, 0..15),
        ) {
            match simple_payback(investment, &flows).expect("valid payback") {
                PaybackResult::Recovered { years, months } => {
                    prop_assert!(months < 12);
                    prop_assert!((years as usize) <= flows.len());
                }
                PaybackResult::NotRecovered => {
                    let mut running = 0.0;
                    for flow in &flows {
                        running += flow;
                        prop_assert!(running < investment.abs());
                    }
                }
            }
        }
    }
}
