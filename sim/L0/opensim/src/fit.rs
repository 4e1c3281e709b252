//! Polynomial approximation of tabulated functions.
//!
//! The target's joint equality constraint is a quartic polynomial
//! `q1 = c0 + c1*q2 + c2*q2² + c3*q2³ + c4*q2⁴`. Spline couplings from the
//! source are approximated by a least-squares polynomial and accepted only if
//! the fit explains enough of the sample variance.
//!
//! The fit is solved in a scaled domain (`x` mapped onto `[-1, 1]`) for
//! conditioning, then expanded back into the raw power basis.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::MAX_POLYNOMIAL_DEGREE;
use crate::error::{ConvertError, Result};

/// Number of coefficients in a target polynomial.
pub const POLY_LEN: usize = MAX_POLYNOMIAL_DEGREE + 1;

/// Iteration cap for the least-squares solve.
const SVD_MAX_ITERATIONS: usize = 1000;

/// Polynomial `q1 = q2`.
pub const IDENTITY_POLYCOEF: [f64; POLY_LEN] = [0.0, 1.0, 0.0, 0.0, 0.0];

/// Summary of how well a polynomial matches its samples.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitQuality {
    /// Coefficient of determination against the samples.
    pub r_squared: f64,
    /// Degree of the fitted polynomial.
    pub degree: usize,
    /// Number of samples fitted.
    pub samples: usize,
}

/// Result of fitting a tabulated function.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFit {
    /// Power-basis coefficients, lowest order first, zero-padded to degree 4.
    pub coefficients: [f64; POLY_LEN],
    /// Minimum and maximum fitted value over the samples.
    pub range: (f64, f64),
    /// Fit quality metrics.
    pub quality: FitQuality,
}

impl PolynomialFit {
    /// Evaluate the fitted polynomial.
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        eval_polynomial(&self.coefficients, x)
    }
}

/// Evaluate a power-basis polynomial with Horner's scheme.
#[must_use]
pub fn eval_polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Polynomial for `q1 = slope * q2 + intercept`.
#[must_use]
pub fn linear_polycoef(slope: f64, intercept: f64) -> [f64; POLY_LEN] {
    [intercept, slope, 0.0, 0.0, 0.0]
}

/// Polynomial pinning a joint to a constant value.
#[must_use]
pub fn constant_polycoef(value: f64) -> [f64; POLY_LEN] {
    [value, 0.0, 0.0, 0.0, 0.0]
}

/// Check that a linear DoF mapping is `+x` or `-x`.
///
/// Returns `true` if the mapping mirrors the axis.
///
/// # Errors
///
/// Returns [`ConvertError::UnsupportedLinearForm`] for any other slope or a
/// non-zero intercept.
pub fn check_unit_linear(slope: f64, intercept: f64) -> Result<bool> {
    if (slope.abs() - 1.0).abs() > f64::EPSILON || intercept != 0.0 {
        return Err(ConvertError::UnsupportedLinearForm { slope, intercept });
    }
    Ok(slope < 0.0)
}

/// Fit a least-squares polynomial of degree `min(max_degree, N - 1)`.
///
/// # Errors
///
/// - [`ConvertError::MismatchedSamples`] if `xs` and `ys` differ in length.
/// - [`ConvertError::InsufficientSamples`] for fewer than two samples.
/// - [`ConvertError::InvalidValue`] for non-finite samples or a solve that
///   does not converge.
/// - [`ConvertError::PoorApproximation`] if R² does not exceed `min_r_squared`.
pub fn fit_polynomial(
    xs: &[f64],
    ys: &[f64],
    max_degree: usize,
    min_r_squared: f64,
) -> Result<PolynomialFit> {
    if xs.len() != ys.len() {
        return Err(ConvertError::MismatchedSamples {
            x: xs.len(),
            y: ys.len(),
        });
    }
    let n = xs.len();
    if n < 2 {
        return Err(ConvertError::InsufficientSamples { count: n });
    }
    if let Some(bad) = xs.iter().chain(ys).find(|v| !v.is_finite()) {
        return Err(ConvertError::invalid_value(
            "samples",
            "polynomial fit",
            format!("non-finite sample {bad}"),
        ));
    }
    let degree = max_degree.min(MAX_POLYNOMIAL_DEGREE).min(n - 1);

    // Map [x_min, x_max] onto [-1, 1]: u = offset + scale * x
    let (x_min, x_max) = min_max(xs.iter().copied());
    let span = x_max - x_min;
    let (offset, scale) = if span > 0.0 {
        (-(x_min + x_max) / span, 2.0 / span)
    } else {
        (-x_min, 1.0)
    };
    let us: Vec<f64> = xs.iter().map(|x| offset + scale * x).collect();

    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    let vandermonde = DMatrix::from_fn(n, degree + 1, |i, j| us[i].powi(j as i32));
    let rhs = DVector::from_column_slice(ys);
    let scaled = vandermonde
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| {
            ConvertError::invalid_value("samples", "polynomial fit", "SVD did not converge")
        })?
        .solve(&rhs, 1e-12)
        .map_err(|e| ConvertError::invalid_value("samples", "polynomial fit", e))?;

    let fitted: Vec<f64> = us
        .iter()
        .map(|u| eval_polynomial(scaled.as_slice(), *u))
        .collect();
    let r_squared = r_squared(ys, &fitted);
    // NaN must fail the gate too
    if !(r_squared > min_r_squared) {
        return Err(ConvertError::PoorApproximation {
            r_squared,
            threshold: min_r_squared,
        });
    }

    Ok(PolynomialFit {
        coefficients: expand_scaled(scaled.as_slice(), offset, scale),
        range: min_max(fitted.iter().copied()),
        quality: FitQuality {
            r_squared,
            degree,
            samples: n,
        },
    })
}

/// Expand `p(offset + scale * x)` into the power basis of `x`.
fn expand_scaled(scaled: &[f64], offset: f64, scale: f64) -> [f64; POLY_LEN] {
    let mut out = [0.0; POLY_LEN];
    for (j, c) in scaled.iter().enumerate() {
        // (offset + scale x)^j = sum_k C(j,k) offset^(j-k) scale^k x^k
        let mut binom = 1.0;
        for k in 0..=j {
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let term = binom * offset.powi((j - k) as i32) * scale.powi(k as i32);
            out[k] += c * term;
            #[allow(clippy::cast_precision_loss)]
            {
                binom = binom * (j - k) as f64 / (k + 1) as f64;
            }
        }
    }
    out
}

/// Coefficient of determination.
///
/// A constant target is explained perfectly (1.0) or not at all (0.0).
fn r_squared(ys: &[f64], fitted: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = ys.len() as f64;
    let mean = ys.iter().sum::<f64>() / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = ys
        .iter()
        .zip(fitted)
        .map(|(y, f)| (y - f).powi(2))
        .sum();

    let magnitude = ys.iter().fold(1.0_f64, |m, y| m.max(y.abs()));
    let negligible = (magnitude * 1e-12).powi(2) * n;
    if ss_tot <= negligible {
        return if ss_res <= negligible { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}
