//! Dispersion statistics: percentile-based CEP and maximum-likelihood fits
//! of two-parameter miss-distance distributions (location fixed at zero).

use nalgebra::Vector3;
use serde::Serialize;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::frame::local_impact;
use crate::propagator::ImpactBatch;
use crate::DispersionError;

/// Fitted Gamma(shape, scale) model of the radial miss distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GammaParams {
    pub shape: f64,
    pub scale: f64,
}

impl GammaParams {
    /// Density at radius `r`; zero for `r <= 0`.
    pub fn pdf(&self, r: f64) -> f64 {
        if r <= 0.0 {
            return 0.0;
        }
        let log_pdf = (self.shape - 1.0) * r.ln() - r / self.scale
            - ln_gamma(self.shape)
            - self.shape * self.scale.ln();
        log_pdf.exp()
    }
}

/// Fitted Nakagami(shape m, spread omega) model of the radial miss distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NakagamiParams {
    pub shape: f64,
    pub spread: f64,
}

impl NakagamiParams {
    /// Density at radius `r`; zero for `r <= 0`.
    pub fn pdf(&self, r: f64) -> f64 {
        if r <= 0.0 {
            return 0.0;
        }
        let m = self.shape;
        let omega = self.spread;
        let log_pdf = std::f64::consts::LN_2 + m * m.ln() + (2.0 * m - 1.0) * r.ln()
            - m * r * r / omega
            - ln_gamma(m)
            - m * omega.ln();
        log_pdf.exp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfitReason {
    /// Fewer than two samples in the batch.
    TooFewSamples,
    /// Fewer than two distinct positive radii (zero-variance cloud).
    DegenerateSample,
}

/// Outcome of the distribution fits. Degenerate batches report an explicit
/// unfit state instead of inventing fallback parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFit {
    Fitted {
        gamma: GammaParams,
        nakagami: NakagamiParams,
    },
    Unfit {
        reason: UnfitReason,
    },
}

/// Miss-distance statistics for one impact batch.
#[derive(Debug, Clone, Serialize)]
pub struct DispersionSummary {
    pub samples: usize,
    /// Median radial miss [m]
    pub cep: f64,
    pub fit: DistributionFit,
}

/// Percentile of a sorted sample with linear interpolation between order
/// statistics. `None` for an empty slice or `q` outside [0, 1].
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let n = sorted.len();
    if n == 1 {
        return Some(sorted[0]);
    }
    let rank = q * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Circular Error Probable: the 50th percentile of the radial misses.
/// `None` for an empty sample.
pub fn cep(misses: &[f64]) -> Option<f64> {
    let mut sorted = misses.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile(&sorted, 0.5)
}

/// Reduce a batch to its dispersion summary relative to `aim`.
pub fn summarize(
    batch: &ImpactBatch,
    aim: &Vector3<f64>,
) -> Result<DispersionSummary, DispersionError> {
    let misses: Vec<f64> = batch
        .records
        .iter()
        .map(|record| local_impact(aim, &record.position()).radial_miss())
        .collect();

    let cep = cep(&misses).ok_or(DispersionError::EmptyBatch)?;
    Ok(DispersionSummary {
        samples: misses.len(),
        cep,
        fit: fit_distributions(&misses),
    })
}

/// Fit both dispersion families to the radial misses.
pub fn fit_distributions(misses: &[f64]) -> DistributionFit {
    if misses.len() < 2 {
        return DistributionFit::Unfit {
            reason: UnfitReason::TooFewSamples,
        };
    }

    let mut positive: Vec<f64> = misses.iter().copied().filter(|&r| r > 0.0).collect();
    positive.sort_by(f64::total_cmp);
    if count_distinct(&positive) < 2 {
        return DistributionFit::Unfit {
            reason: UnfitReason::DegenerateSample,
        };
    }

    let squared: Vec<f64> = positive.iter().map(|&r| r * r).collect();
    match (fit_gamma_mle(&positive), fit_gamma_mle(&squared)) {
        (Some(gamma), Some(radial_power)) => DistributionFit::Fitted {
            gamma,
            // r^2 ~ Gamma(m, omega/m), so the Nakagami parameters fall out of
            // the gamma fit of the squared radii.
            nakagami: NakagamiParams {
                shape: radial_power.shape,
                spread: radial_power.shape * radial_power.scale,
            },
        },
        _ => DistributionFit::Unfit {
            reason: UnfitReason::DegenerateSample,
        },
    }
}

fn count_distinct(sorted: &[f64]) -> usize {
    let mut distinct = 0;
    let mut last = f64::NAN;
    for &v in sorted {
        if v != last {
            distinct += 1;
            last = v;
        }
    }
    distinct
}

/// Maximum-likelihood Gamma fit of strictly positive samples.
///
/// Shape solves `ln(k) - psi(k) = ln(mean) - mean(ln x)` starting from the
/// Greenwood-Durand closed-form guess, refined by secant steps; scale is
/// `mean / shape`.
fn fit_gamma_mle(samples: &[f64]) -> Option<GammaParams> {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let mean_ln = samples.iter().map(|&x| x.ln()).sum::<f64>() / n;
    let s = mean.ln() - mean_ln;
    if !s.is_finite() || s <= 1e-12 {
        return None;
    }

    let objective = |k: f64| k.ln() - digamma(k) - s;
    let mut k0 = (3.0 - s + ((s - 3.0).powi(2) + 24.0 * s).sqrt()) / (12.0 * s);
    let mut f0 = objective(k0);
    let mut k1 = k0 * 1.1;
    let mut f1 = objective(k1);

    for _ in 0..40 {
        if f1.abs() < 1e-12 || (f1 - f0).abs() < 1e-15 {
            break;
        }
        let k2 = k1 - f1 * (k1 - k0) / (f1 - f0);
        if !k2.is_finite() || k2 <= 0.0 {
            break;
        }
        k0 = k1;
        f0 = f1;
        k1 = k2;
        f1 = objective(k1);
    }

    if !k1.is_finite() || k1 <= 0.0 {
        return None;
    }
    Some(GammaParams {
        shape: k1,
        scale: mean / k1,
    })
}
