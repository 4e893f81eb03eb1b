//! Floating point helpers shared by the reservoirs of the model.
//!
//! All four contamination reservoirs (hands, air, fomite and surface stains) are integrated with
//! the same first-order implicit (backward Euler) decay step, provided here as
//! [`implicit_decay`]. The viral-load ramps of the person state machine use
//! [`log_interpolate`]. [`gamma_cdf`] bins the fitted droplet size distribution of a cough.

use approx::AbsDiffEq;

use crate::error::SimError;

/// Targeted accuracy instantiated over `f64`
pub const ACC: f64 = 10e-11;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

#[macro_export]
macro_rules! assert_almost_eq {
    ($a:expr, $b:expr, $prec:expr $(,)?) => {
        if !$crate::numeric::almost_eq($a, $b, $prec) {
            panic!(
                "assertion failed: `abs(left - right) < {:e}`, (left: `{}`, right: `{}`)",
                $prec, $a, $b
            );
        }
    };
}

/// One implicit first-order decay step:
///
/// `new = (prior + pending / normalizer) / (1 + rate * dt)`
///
/// `pending` is an amount accumulated during the step, `normalizer` the area or volume that
/// turns it into a concentration. `rate` must already be expressed in the reciprocal of the
/// unit of `dt`. Negative results are clamped to zero.
///
/// # Errors
///
/// Returns [`SimError::NumericalInstability`] if `normalizer` or the decay denominator is not
/// strictly positive, or if the result is not finite.
pub fn implicit_decay(
    prior: f64,
    pending: f64,
    rate: f64,
    dt: f64,
    normalizer: f64,
) -> Result<f64, SimError> {
    if !(normalizer.is_finite() && normalizer > 0.0) {
        return Err(SimError::NumericalInstability(format!(
            "decay normalizer must be positive, got {normalizer}"
        )));
    }
    let denominator = 1.0 + rate * dt;
    if denominator.is_nan() || denominator <= 0.0 {
        return Err(SimError::NumericalInstability(format!(
            "decay denominator 1 + {rate} * {dt} is not positive"
        )));
    }

    let value = (prior + pending / normalizer) / denominator;
    if !value.is_finite() {
        return Err(SimError::NumericalInstability(format!(
            "decay of {prior} with pending {pending} is not finite"
        )));
    }
    Ok(value.max(0.0))
}

/// Interpolates linearly in `log10(y)` between `(x0, y0)` and `(x1, y1)`. `x` is clamped to the
/// interval and both end values must be positive. A degenerate interval returns `y1`.
#[must_use]
pub fn log_interpolate(x: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> f64 {
    if x1 <= x0 {
        return y1;
    }
    let fraction = ((x - x0) / (x1 - x0)).clamp(0.0, 1.0);
    let (log0, log1) = (y0.log10(), y1.log10());
    10f64.powf(log0 + fraction * (log1 - log0))
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// `ln(Γ(x))` for `x > 0` (Lanczos approximation).
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return ln_gamma(x + 1.0) - x.ln();
    }
    let x = x - 1.0;
    let mut sum = LANCZOS_COEFFICIENTS[0];
    let mut denominator = x;
    for coefficient in &LANCZOS_COEFFICIENTS[1..] {
        denominator += 1.0;
        sum += coefficient / denominator;
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// CDF of the unit-scale gamma distribution with the given shape, i.e. the regularized lower
/// incomplete gamma function `P(shape, x)`.
#[must_use]
pub fn gamma_cdf(shape: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    // P(a, x) = x^a e^-x / Γ(a) * Σ x^n / (a (a + 1) ... (a + n))
    let mut term = 1.0 / shape;
    let mut sum = term;
    let mut n = shape;
    for _ in 0..1000 {
        n += 1.0;
        term *= x / n;
        sum += term;
        if term < sum * 1e-16 {
            break;
        }
    }
    (sum.ln() + shape * x.ln() - x - ln_gamma(shape))
        .exp()
        .min(1.0)
}
