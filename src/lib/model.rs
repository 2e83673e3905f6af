use anyhow::{anyhow, bail, Result};
use log::debug;
use serde::Serialize;
use statrs::distribution::{Continuous, Normal};

/// A Normal distribution over a scalar parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NormalPrior {
    pub mu: f64,
    pub sigma: f64,
}

impl NormalPrior {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    /// Normal(0, 1)
    pub fn standard() -> Self {
        Self::new(0.0, 1.0)
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        match Normal::new(self.mu, self.sigma) {
            Ok(dist) => dist.ln_pdf(x),
            Err(_) => f64::NAN,
        }
    }
}

/// `alpha ~ prior`, `observed_i ~ Normal(alpha * predictor_i, noise_sigma)`.
///
/// Immutable once built; inference lives in [`crate::sampler`].
#[derive(Clone, Debug, PartialEq)]
pub struct LinearNormalModel {
    prior: NormalPrior,
    noise_sigma: f64,
    predictor: Vec<f64>,
    observed: Vec<f64>,
    // sufficient statistics of the likelihood
    sum_xx: f64,
    sum_xy: f64,
    sum_yy: f64,
}

impl LinearNormalModel {
    pub fn prior(&self) -> NormalPrior {
        self.prior
    }

    pub fn noise_sigma(&self) -> f64 {
        self.noise_sigma
    }

    pub fn predictor(&self) -> &[f64] {
        &self.predictor
    }

    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn n_observations(&self) -> usize {
        self.observed.len()
    }

    /// Unnormalized log posterior of `alpha`.
    pub fn log_density(&self, alpha: f64) -> f64 {
        let var = self.noise_sigma * self.noise_sigma;
        // sum_i (y_i - alpha x_i)^2 expanded with the sufficient statistics
        let sq_resid = self.sum_yy - 2.0 * alpha * self.sum_xy + alpha * alpha * self.sum_xx;
        let n = self.n_observations() as f64;
        let log_lik = -0.5 * sq_resid / var
            - n * (self.noise_sigma.ln() + 0.5 * (2.0 * std::f64::consts::PI).ln());
        self.prior.log_pdf(alpha) + log_lik
    }

    /// Derivative of [`Self::log_density`] with respect to `alpha`.
    pub fn grad_log_density(&self, alpha: f64) -> f64 {
        let var = self.noise_sigma * self.noise_sigma;
        let d_prior = -(alpha - self.prior.mu) / (self.prior.sigma * self.prior.sigma);
        let d_lik = (self.sum_xy - alpha * self.sum_xx) / var;
        d_prior + d_lik
    }

    /// Exact posterior of `alpha`; the Normal prior is conjugate here.
    pub fn conjugate_posterior(&self) -> NormalPrior {
        let var = self.noise_sigma * self.noise_sigma;
        let prior_precision = 1.0 / (self.prior.sigma * self.prior.sigma);
        let precision = prior_precision + self.sum_xx / var;
        let mu = (prior_precision * self.prior.mu + self.sum_xy / var) / precision;
        NormalPrior::new(mu, precision.sqrt().recip())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelBuilder {
    prior: Option<NormalPrior>,
    noise_sigma: Option<f64>,
    predictor: Option<Vec<f64>>,
    observed: Option<Vec<f64>>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prior(mut self, prior: NormalPrior) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn noise_sigma(mut self, sigma: f64) -> Self {
        self.noise_sigma = Some(sigma);
        self
    }

    pub fn predictor(mut self, values: &[f64]) -> Self {
        self.predictor = Some(values.to_vec());
        self
    }

    pub fn observed(mut self, values: &[f64]) -> Self {
        self.observed = Some(values.to_vec());
        self
    }

    /// Validates the pieces and freezes them into a model. The prior
    /// defaults to Normal(0, 1) and the noise sigma to 1.
    pub fn build(self) -> Result<LinearNormalModel> {
        let prior = self.prior.unwrap_or_else(NormalPrior::standard);
        let noise_sigma = self.noise_sigma.unwrap_or(1.0);
        let predictor = self.predictor.ok_or_else(|| anyhow!("Model has no predictor"))?;
        let observed = self.observed.ok_or_else(|| anyhow!("Model has no observed data"))?;

        if !(prior.sigma > 0.0 && prior.sigma.is_finite() && prior.mu.is_finite()) {
            bail!("Invalid prior: mu = {}, sigma = {}", prior.mu, prior.sigma);
        }
        if !(noise_sigma > 0.0 && noise_sigma.is_finite()) {
            bail!("Invalid noise sigma: {}", noise_sigma);
        }
        if predictor.len() != observed.len() {
            bail!(
                "Predictor has {} values, observed data has {}",
                predictor.len(),
                observed.len()
            );
        }
        if observed.is_empty() {
            bail!("Model has no observations");
        }
        if let Some(i) = predictor
            .iter()
            .zip(&observed)
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            bail!("Non-finite value at observation {}", i);
        }

        let sum_xx = predictor.iter().map(|x| x * x).sum();
        let sum_xy = predictor.iter().zip(&observed).map(|(x, y)| x * y).sum();
        let sum_yy = observed.iter().map(|y| y * y).sum();
        debug!(
            "Built linear model with {} observations, prior N({}, {})",
            observed.len(),
            prior.mu,
            prior.sigma
        );
        Ok(LinearNormalModel {
            prior,
            noise_sigma,
            predictor,
            observed,
            sum_xx,
            sum_xy,
            sum_yy,
        })
    }
}
