//! Statistical machinery for A/B comparison: paired t-test, Cohen's d,
//! and Bonferroni correction.
//!
//! The two-sided p-value comes from the Student t CDF evaluated through
//! the regularized incomplete beta function (continued-fraction form, as
//! in Numerical Recipes); no stats crate in the dependency tree carries
//! these.

use crate::error::{EvalError, Result};

/// Result of a paired t-test between two equal-length sample vectors.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TTestResult {
    /// t statistic.
    pub t: f64,
    /// Degrees of freedom (`n - 1`).
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p: f64,
    /// Cohen's d over the per-sample differences.
    pub cohens_d: f64,
}

/// Lanczos approximation of `ln Γ(x)`.
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.001_208_650_973_866_179,
        -0.000_005_395_239_384_953,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coefficient in COEFFICIENTS {
        y += 1.0;
        series += coefficient / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Continued-fraction evaluation for the incomplete beta function.
#[allow(clippy::cast_precision_loss)]
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPSILON: f64 = 3.0e-14;
    const TINY: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Two-sided p-value for a t statistic with `df` degrees of freedom.
#[must_use]
pub fn t_to_p(t: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return 1.0;
    }
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / (t.mul_add(t, df));
    incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Paired t-test over equal-length per-sample metric vectors (pairing by
/// sample index).
///
/// Degenerate cases: identical vectors yield `t = 0, p = 1, d = 0`; a
/// nonzero mean difference with zero variance yields `p = 0` (the effect
/// is deterministic in-sample).
///
/// # Errors
///
/// [`EvalError::PairLengthMismatch`] for unequal lengths,
/// [`EvalError::EmptyDataset`] for fewer than two pairs.
#[allow(clippy::cast_precision_loss)]
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Result<TTestResult> {
    if a.len() != b.len() {
        return Err(EvalError::PairLengthMismatch {
            left: a.len(),
            right: b.len(),
        }
        .into());
    }
    if a.len() < 2 {
        return Err(EvalError::EmptyDataset.into());
    }

    let n = a.len() as f64;
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let mean = diffs.iter().sum::<f64>() / n;
    let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    let degrees_of_freedom = n - 1.0;

    if std_dev == 0.0 {
        // All differences identical.
        return Ok(if mean == 0.0 {
            TTestResult {
                t: 0.0,
                degrees_of_freedom,
                p: 1.0,
                cohens_d: 0.0,
            }
        } else {
            TTestResult {
                t: if mean > 0.0 {
                    f64::INFINITY
                } else {
                    f64::NEG_INFINITY
                },
                degrees_of_freedom,
                p: 0.0,
                cohens_d: if mean > 0.0 {
                    f64::INFINITY
                } else {
                    f64::NEG_INFINITY
                },
            }
        });
    }

    let t = mean / (std_dev / n.sqrt());
    let cohens_d = mean / std_dev;
    Ok(TTestResult {
        t,
        degrees_of_freedom,
        p: t_to_p(t, degrees_of_freedom),
        cohens_d,
    })
}

/// Bonferroni correction: `p_adj = min(1, p * comparisons)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bonferroni(p: f64, comparisons: usize) -> f64 {
    (p * comparisons.max(1) as f64).min(1.0)
}

/// Number of variant pairs among `m` variants: `m * (m - 1) / 2`.
#[must_use]
pub const fn variant_pairs(variants: usize) -> usize {
    variants * variants.saturating_sub(1) / 2
}

/// Significance annotation for a corrected p-value.
#[must_use]
pub fn significance_marker(p_adj: f64) -> &'static str {
    if p_adj < 0.001 {
        "***"
    } else if p_adj < 0.01 {
        "**"
    } else if p_adj < 0.05 {
        "*"
    } else {
        ""
    }
}
