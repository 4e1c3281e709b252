//! Property-based tests for polynomial approximation.
//!
//! Run with: cargo test -p sim-opensim -- proptest

use proptest::prelude::*;
use sim_opensim::{MAX_POLYNOMIAL_DEGREE, eval_polynomial, fit_polynomial};

// =============================================================================
// Strategies
// =============================================================================

/// Strictly increasing sample positions.
fn arb_xs(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    (-1.0..1.0f64, prop::collection::vec(0.05..0.2f64, min_len..=max_len)).prop_map(
        |(start, steps)| {
            steps
                .iter()
                .scan(start, |x, step| {
                    let current = *x;
                    *x += step;
                    Some(current)
                })
                .collect()
        },
    )
}

fn arb_coefficients() -> impl Strategy<Value = [f64; 5]> {
    prop::array::uniform5(-1.0..1.0f64)
}

/// Amplitude, frequency and phase of a sinusoid no quartic can absorb.
fn arb_wobble() -> impl Strategy<Value = (f64, f64, f64)> {
    (0.05..0.5f64, 3.0..12.0f64, 0.0..std::f64::consts::TAU)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn proptest_degree_is_bounded(xs in arb_xs(2, 20), coefficients in arb_coefficients()) {
        let ys: Vec<f64> = xs.iter().map(|x| eval_polynomial(&coefficients, *x)).collect();
        if let Ok(fit) = fit_polynomial(&xs, &ys, MAX_POLYNOMIAL_DEGREE, 0.5) {
            prop_assert!(fit.quality.degree <= MAX_POLYNOMIAL_DEGREE);
            prop_assert!(fit.quality.degree < xs.len());
            prop_assert_eq!(fit.quality.samples, xs.len());
            prop_assert!(fit.quality.r_squared > 0.5);
            for c in &fit.coefficients[fit.quality.degree + 1..] {
                prop_assert!(c.abs() < 1e-9);
            }
        }
    }

    #[test]
    fn proptest_quartic_samples_are_reproduced(
        xs in arb_xs(5, 20),
        coefficients in arb_coefficients(),
    ) {
        let ys: Vec<f64> = xs.iter().map(|x| eval_polynomial(&coefficients, *x)).collect();
        let fit = fit_polynomial(&xs, &ys, MAX_POLYNOMIAL_DEGREE, 0.5).unwrap();
        for (x, y) in xs.iter().zip(&ys) {
            prop_assert!((fit.eval(*x) - y).abs() < 1e-6 * (1.0 + y.abs()));
        }
    }

    #[test]
    fn proptest_refit_is_idempotent(
        xs in arb_xs(6, 20),
        coefficients in arb_coefficients(),
        (amplitude, frequency, phase) in arb_wobble(),
    ) {
        let ys: Vec<f64> = xs
            .iter()
            .map(|x| eval_polynomial(&coefficients, *x) + amplitude * (frequency * x + phase).sin())
            .collect();
        // Off-curve samples: only the refit has to pass the quality gate
        let first = fit_polynomial(&xs, &ys, MAX_POLYNOMIAL_DEGREE, f64::NEG_INFINITY).unwrap();
        let refit_ys: Vec<f64> = xs.iter().map(|x| first.eval(*x)).collect();
        let second = fit_polynomial(&xs, &refit_ys, MAX_POLYNOMIAL_DEGREE, 0.5).unwrap();
        for (a, b) in first.coefficients.iter().zip(&second.coefficients) {
            prop_assert!((a - b).abs() < 1e-6 * (1.0 + a.abs()));
        }
    }
}
