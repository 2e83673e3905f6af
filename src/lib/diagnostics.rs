use crate::stats;
use serde::Serialize;

/// Split R-hat above this counts as non-converged.
pub const MAX_R_HAT: f64 = 1.01;

/// Minimum effective sample size per chain.
pub const MIN_ESS_PER_CHAIN: f64 = 100.0;

/// What a single chain did after warm-up.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChainStats {
    pub accept_rate: f64,
    pub divergences: usize,
    pub step_size: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostics {
    pub r_hat: f64,
    pub ess: f64,
    pub divergences: usize,
    pub accept_rate: f64,
    pub chains: Vec<ChainStats>,
}

impl Diagnostics {
    pub fn from_chains(chains: &[Vec<f64>], stats: Vec<ChainStats>) -> Self {
        let divergences = stats.iter().map(|s| s.divergences).sum();
        let accept_rate = stats.iter().map(|s| s.accept_rate).sum::<f64>() / stats.len() as f64;
        Self {
            r_hat: split_r_hat(chains),
            ess: effective_sample_size(chains),
            divergences,
            accept_rate,
            chains: stats,
        }
    }

    /// Problems worth surfacing to the user. Empty when the run looks healthy.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.r_hat.is_nan() {
            out.push("R-hat could not be computed (chains too short or constant)".to_string());
        } else if self.r_hat > MAX_R_HAT {
            out.push(format!(
                "R-hat is {:.3}, above {}: chains have not converged",
                self.r_hat, MAX_R_HAT
            ));
        }
        let min_ess = MIN_ESS_PER_CHAIN * self.chains.len() as f64;
        if self.ess < min_ess {
            out.push(format!(
                "Effective sample size {:.0} is below {:.0}",
                self.ess, min_ess
            ));
        }
        if self.divergences > 0 {
            out.push(format!("{} divergent transitions after tuning", self.divergences));
        }
        out
    }

    pub fn is_ok(&self) -> bool {
        self.warnings().is_empty()
    }
}

fn sample_variance(x: &[f64]) -> f64 {
    let m = stats::mean(x);
    x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (x.len() as f64 - 1.0)
}

/// Gelman-Rubin potential scale reduction, computed on chains split in
/// half. NaN when the halves are shorter than two draws or have no spread.
pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let half = chains.iter().map(|c| c.len() / 2).min().unwrap_or(0);
    if half < 2 {
        return f64::NAN;
    }
    let mut halves: Vec<&[f64]> = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        halves.push(&chain[..half]);
        halves.push(&chain[chain.len() - half..]);
    }
    let n = half as f64;
    let means: Vec<f64> = halves.iter().map(|h| stats::mean(h)).collect();
    let within = halves.iter().map(|h| sample_variance(h)).sum::<f64>() / halves.len() as f64;
    if within <= 0.0 {
        return f64::NAN;
    }
    let between = n * sample_variance(&means);
    let var_plus = (n - 1.0) / n * within + between / n;
    (var_plus / within).sqrt()
}

/// Lag-k autocorrelation of a chain with known mean and (population) variance.
fn autocorrelation(chain: &[f64], k: usize, mean: f64, var: f64) -> f64 {
    let n = chain.len();
    if k >= n {
        return 0.0;
    }
    let cov: f64 = (0..(n - k))
        .map(|i| (chain[i] - mean) * (chain[i + k] - mean))
        .sum::<f64>()
        / n as f64;
    cov / var
}

/// ESS of one chain, truncating the autocorrelation sum at the first
/// non-positive pair of lags (Geyer's initial positive sequence).
pub fn chain_ess(chain: &[f64]) -> f64 {
    let n = chain.len();
    if n < 4 {
        return n as f64;
    }
    let mean = stats::mean(chain);
    let var = chain.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if var < 1e-12 {
        return n as f64;
    }

    let mut pair_sum = 0.0;
    let mut k = 0;
    while k + 1 < n / 2 {
        let pair = autocorrelation(chain, k, mean, var) + autocorrelation(chain, k + 1, mean, var);
        if pair <= 0.0 {
            break;
        }
        pair_sum += pair;
        k += 2;
    }
    let tau = (2.0 * pair_sum - 1.0).max(1.0 / n as f64);
    n as f64 / tau
}

/// Effective sample size summed over chains.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    chains.iter().map(|c| chain_ess(c)).sum()
}
