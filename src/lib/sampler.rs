use crate::diagnostics::{ChainStats, Diagnostics};
use crate::model::{LinearNormalModel, ModelBuilder, NormalPrior};
use anyhow::{bail, Result};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use std::time::Instant;

/// Energy error beyond which an HMC transition is counted as divergent.
const MAX_ENERGY_ERROR: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Hamiltonian Monte Carlo with a jittered number of leapfrog steps
    Hmc,
    /// Random-walk Metropolis
    Metropolis,
}

impl Method {
    fn default_target_accept(&self) -> f64 {
        match self {
            Method::Hmc => 0.8,
            Method::Metropolis => 0.44,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SamplerConfig {
    pub method: Method,
    pub chains: usize,
    /// Retained draws per chain
    pub draws: usize,
    /// Warm-up iterations per chain, discarded
    pub tune: usize,
    /// Defaults to 0.8 for HMC and 0.44 for Metropolis
    pub target_accept: Option<f64>,
    pub max_leapfrog: usize,
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            method: Method::Hmc,
            chains: 2,
            draws: 1000,
            tune: 1000,
            target_accept: None,
            max_leapfrog: 10,
            seed: None,
        }
    }
}

/// Posterior draws of `alpha`, one vector per chain, plus diagnostics.
#[derive(Clone, Debug)]
pub struct Trace {
    pub chains: Vec<Vec<f64>>,
    pub diagnostics: Diagnostics,
    pub seed: u64,
}

impl Trace {
    /// All draws, chain after chain.
    pub fn draws(&self) -> Vec<f64> {
        self.chains.iter().flatten().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.chains.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dual averaging of the log step size (Hoffman & Gelman 2014).
#[derive(Clone, Debug)]
struct DualAveraging {
    mu: f64,
    target: f64,
    log_step: f64,
    log_step_bar: f64,
    h_bar: f64,
    t: f64,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    fn new(initial_step: f64, target: f64) -> Self {
        Self {
            mu: (10.0 * initial_step).ln(),
            target,
            log_step: initial_step.ln(),
            log_step_bar: 0.0,
            h_bar: 0.0,
            t: 0.0,
        }
    }

    fn update(&mut self, accept_prob: f64) {
        self.t += 1.0;
        let eta = 1.0 / (self.t + Self::T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target - accept_prob);
        self.log_step = self.mu - self.t.sqrt() / Self::GAMMA * self.h_bar;
        let w = self.t.powf(-Self::KAPPA);
        self.log_step_bar = w * self.log_step + (1.0 - w) * self.log_step_bar;
    }

    fn current(&self) -> f64 {
        self.log_step.exp()
    }

    fn adapted(&self) -> f64 {
        if self.t == 0.0 {
            self.current()
        } else {
            self.log_step_bar.exp()
        }
    }
}

struct Transition {
    accept_prob: f64,
    divergent: bool,
}

/// One Markov chain over `alpha`. Owns its RNG.
struct Chain<'a> {
    model: &'a LinearNormalModel,
    rng: Xoshiro256PlusPlus,
    position: f64,
    log_p: f64,
    grad: f64,
    step_size: f64,
}

impl<'a> Chain<'a> {
    fn new(model: &'a LinearNormalModel, seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        // jittered start around the prior mean
        let position = model.prior().mu + rng.random_range(-1.0..1.0);
        Self {
            model,
            rng,
            position,
            log_p: model.log_density(position),
            grad: model.grad_log_density(position),
            step_size: 1.0,
        }
    }

    fn hmc_step(&mut self, max_leapfrog: usize) -> Transition {
        let momentum: f64 = StandardNormal.sample(&mut self.rng);
        let n_steps = self.rng.random_range(1..=max_leapfrog.max(1));
        let eps = self.step_size;

        let mut q = self.position;
        let mut p = momentum;
        let mut g = self.grad;
        for _ in 0..n_steps {
            p += 0.5 * eps * g;
            q += eps * p;
            g = self.model.grad_log_density(q);
            p += 0.5 * eps * g;
        }
        let log_p = self.model.log_density(q);

        let h0 = -self.log_p + 0.5 * momentum * momentum;
        let h1 = -log_p + 0.5 * p * p;
        let energy_error = h1 - h0;
        if !energy_error.is_finite() || energy_error > MAX_ENERGY_ERROR {
            return Transition {
                accept_prob: 0.0,
                divergent: true,
            };
        }

        let accept_prob = (-energy_error).exp().min(1.0);
        if self.rng.random::<f64>() < accept_prob {
            self.position = q;
            self.log_p = log_p;
            self.grad = g;
        }
        Transition {
            accept_prob,
            divergent: false,
        }
    }

    fn metropolis_step(&mut self) -> Transition {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        let proposal = self.position + self.step_size * z;
        let log_p = self.model.log_density(proposal);
        let accept_prob = if log_p.is_finite() {
            (log_p - self.log_p).exp().min(1.0)
        } else {
            0.0
        };
        if self.rng.random::<f64>() < accept_prob {
            self.position = proposal;
            self.log_p = log_p;
        }
        Transition {
            accept_prob,
            divergent: false,
        }
    }

    fn step(&mut self, config: &SamplerConfig) -> Transition {
        match config.method {
            Method::Hmc => self.hmc_step(config.max_leapfrog),
            Method::Metropolis => self.metropolis_step(),
        }
    }

    fn run(mut self, config: &SamplerConfig) -> (Vec<f64>, ChainStats) {
        let target = config
            .target_accept
            .unwrap_or_else(|| config.method.default_target_accept());
        let mut adaptation = DualAveraging::new(self.step_size, target);

        for _ in 0..config.tune {
            let transition = self.step(config);
            adaptation.update(transition.accept_prob);
            self.step_size = adaptation.current();
        }
        self.step_size = adaptation.adapted();
        debug!("Adapted step size: {:.4}", self.step_size);

        let mut draws = Vec::with_capacity(config.draws);
        let mut accept_sum = 0.0;
        let mut divergences = 0;
        for _ in 0..config.draws {
            let transition = self.step(config);
            accept_sum += transition.accept_prob;
            if transition.divergent {
                divergences += 1;
            }
            draws.push(self.position);
        }

        let stats = ChainStats {
            accept_rate: accept_sum / config.draws as f64,
            divergences,
            step_size: self.step_size,
        };
        (draws, stats)
    }
}

/// Samples the posterior of `alpha`. Chains run one after the other, chain
/// `i` seeded with `seed + i`.
pub fn sample(model: &LinearNormalModel, config: &SamplerConfig) -> Result<Trace> {
    if config.chains == 0 {
        bail!("Sampler needs at least one chain");
    }
    if config.draws == 0 {
        bail!("Sampler needs at least one draw per chain");
    }
    if let Some(target) = config.target_accept {
        if !(target > 0.0 && target < 1.0) {
            bail!("Target acceptance must lie in (0, 1), got {}", target);
        }
    }

    let seed = match config.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::rng().random::<u64>();
            info!("No seed given, using {}", seed);
            seed
        }
    };

    info!(
        "Sampling {} chains with {:?} ({} tune, {} draws each)",
        config.chains, config.method, config.tune, config.draws
    );
    let timer = Instant::now();
    let mut chains = Vec::with_capacity(config.chains);
    let mut stats = Vec::with_capacity(config.chains);
    for idx in 0..config.chains {
        let chain = Chain::new(model, seed.wrapping_add(idx as u64));
        let (draws, chain_stats) = chain.run(config);
        debug!(
            "Chain {}: accept rate {:.3}, {} divergences",
            idx, chain_stats.accept_rate, chain_stats.divergences
        );
        chains.push(draws);
        stats.push(chain_stats);
    }
    info!("Finished sampling in {:?}", timer.elapsed());

    let diagnostics = Diagnostics::from_chains(&chains, stats);
    for warning in diagnostics.warnings() {
        warn!("{}", warning);
    }
    Ok(Trace {
        chains,
        diagnostics,
        seed,
    })
}

/// Fits `alpha` in `g ~ Normal(alpha * a, 1)`, `alpha ~ Normal(0, 1)` with
/// HMC, keeping `n_samples` draws per chain.
pub fn fit_posterior(a: &[f64], g: &[f64], n_samples: usize, seed: Option<u64>) -> Result<Trace> {
    let model = ModelBuilder::new()
        .prior(NormalPrior::standard())
        .noise_sigma(1.0)
        .predictor(a)
        .observed(g)
        .build()?;
    let config = SamplerConfig {
        draws: n_samples,
        seed,
        ..SamplerConfig::default()
    };
    sample(&model, &config)
}
