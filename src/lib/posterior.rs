use crate::sampler::Trace;
use crate::stats;
use serde::Serialize;

/// Probability mass of the reported highest density interval.
pub const DEFAULT_HDI_PROB: f64 = 0.94;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PosteriorSummary {
    pub n_draws: usize,
    pub mean: f64,
    pub sd: f64,
    pub hdi_prob: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
}

impl PosteriorSummary {
    pub fn from_draws(draws: &[f64], hdi_prob: f64) -> Self {
        let (hdi_low, hdi_high) = hdi(draws, hdi_prob);
        Self {
            n_draws: draws.len(),
            mean: stats::mean(draws),
            sd: stats::population_std(draws),
            hdi_prob,
            hdi_low,
            hdi_high,
        }
    }

    pub fn from_trace(trace: &Trace) -> Self {
        Self::from_draws(&trace.draws(), DEFAULT_HDI_PROB)
    }
}

/// Narrowest interval holding `prob` of the draws.
pub fn hdi(draws: &[f64], prob: f64) -> (f64, f64) {
    if draws.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let sorted = stats::sorted(draws);
    let n = sorted.len();
    let inside = ((prob.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n - 1);
    let (start, _) = (0..n - inside)
        .map(|i| (i, sorted[i + inside] - sorted[i]))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best });
    (sorted[start], sorted[start + inside])
}
