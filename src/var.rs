//! Value-at-Risk engine
//!
//! This module computes Value-at-Risk and Expected Shortfall from return
//! distributions using historical, parametric (Normal) and Monte Carlo
//! resampling methods, plus per-asset VaR contributions.
//!
//! All VaR and ES values are returned as negative numbers (currency losses).

use ndarray::{Array1, Array2, Axis};
use ndarray_stats::CorrelationExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::warn;

use crate::config::VarConfig;
use crate::RiskError;

/// Sample size below which historical estimates are flagged low-confidence
pub const MIN_SAMPLE_SIZE: usize = 30;

/// Default number of Monte Carlo simulation paths
pub const DEFAULT_SIMULATIONS: usize = 10_000;

/// VaR estimation method
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarMethod {
    /// Empirical percentile of the historical return distribution
    Historical,

    /// Normal distribution fitted to sample mean and standard deviation
    Parametric,

    /// Bootstrap resampling from the historical distribution
    ///
    /// Resampling (rather than model fitting) preserves fat tails. A fixed
    /// `seed` makes the estimate deterministic for testing.
    MonteCarlo {
        simulations: usize,
        seed: Option<u64>,
    },
}

impl VarMethod {
    /// Monte Carlo with the default simulation count and no fixed seed
    pub fn monte_carlo() -> Self {
        VarMethod::MonteCarlo {
            simulations: DEFAULT_SIMULATIONS,
            seed: None,
        }
    }
}

/// Value-at-Risk engine
#[derive(Debug, Clone)]
pub struct VarEngine {
    config: VarConfig,
}

impl VarEngine {
    /// Create a new engine, validating the configuration
    pub fn new(config: VarConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Engine configuration
    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Whether a sample of `n` observations is too small for the configured
    /// confidence level to be trustworthy
    pub fn is_low_confidence(&self, n: usize) -> bool {
        n < MIN_SAMPLE_SIZE
    }

    /// Historical (empirical percentile) VaR
    ///
    /// Degrades gracefully on small samples: the result is still produced,
    /// but a warning is logged and callers should surface the reduced
    /// confidence (see [`VarEngine::is_low_confidence`]).
    pub fn historical_var(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        lookback: Option<usize>,
    ) -> Result<f64, RiskError> {
        let returns = window(returns, lookback);
        self.check_inputs(returns, portfolio_value)?;

        if self.is_low_confidence(returns.len()) {
            warn!(
                samples = returns.len(),
                confidence = self.config.confidence_level,
                "historical VaR sample below {} observations; estimate is low-confidence",
                MIN_SAMPLE_SIZE
            );
        }

        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let idx = self.tail_index(sorted.len());
        let percentile = sorted[idx];

        let horizon = self.config.time_horizon as f64;
        Ok((percentile * horizon.sqrt() * portfolio_value).min(0.0))
    }

    /// Parametric (Normal) VaR
    ///
    /// Fails fast when the sample has fewer than 2 observations or zero
    /// standard deviation: a Normal fit is meaningless in either case.
    pub fn parametric_var(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        lookback: Option<usize>,
    ) -> Result<f64, RiskError> {
        let returns = window(returns, lookback);
        self.check_inputs(returns, portfolio_value)?;

        let (mean, std_dev) = fit_normal(returns)?;
        let z = standard_normal_quantile(1.0 - self.config.confidence_level)?;

        let horizon = self.config.time_horizon as f64;
        let var = (mean * horizon + z * std_dev * horizon.sqrt()) * portfolio_value;
        Ok(var.min(0.0))
    }

    /// Monte Carlo VaR by bootstrap resampling of historical returns
    ///
    /// Draws `simulations * time_horizon` returns from the historical series
    /// and compounds them multiplicatively into terminal portfolio values.
    /// Deterministic under a fixed `seed`.
    pub fn monte_carlo_var(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        simulations: usize,
        seed: Option<u64>,
        lookback: Option<usize>,
    ) -> Result<f64, RiskError> {
        let returns = window(returns, lookback);
        let terminals = self.simulate_terminals(returns, portfolio_value, simulations, seed)?;

        let idx = self.tail_index(terminals.len());
        Ok((terminals[idx] - portfolio_value).min(0.0))
    }

    /// Monte Carlo VaR offloaded to a blocking worker thread
    ///
    /// Large simulation counts take tens of milliseconds; this variant keeps
    /// the cooperative scheduler responsive when called from async context.
    pub async fn monte_carlo_var_async(
        &self,
        returns: Vec<f64>,
        portfolio_value: f64,
        simulations: usize,
        seed: Option<u64>,
    ) -> Result<f64, RiskError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            engine.monte_carlo_var(&returns, portfolio_value, simulations, seed, None)
        })
        .await
        .map_err(|e| RiskError::Computation(format!("simulation task failed: {}", e)))?
    }

    /// VaR for the given method
    pub fn value_at_risk(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        method: &VarMethod,
        lookback: Option<usize>,
    ) -> Result<f64, RiskError> {
        match method {
            VarMethod::Historical => self.historical_var(returns, portfolio_value, lookback),
            VarMethod::Parametric => self.parametric_var(returns, portfolio_value, lookback),
            VarMethod::MonteCarlo { simulations, seed } => {
                self.monte_carlo_var(returns, portfolio_value, *simulations, *seed, lookback)
            }
        }
    }

    /// Expected Shortfall: mean of losses at or beyond the VaR threshold
    ///
    /// Invariant: `|ES| >= |VaR|` for every method, since the tail mean is at
    /// least as extreme as the percentile cut.
    pub fn expected_shortfall(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        method: &VarMethod,
        lookback: Option<usize>,
    ) -> Result<f64, RiskError> {
        let returns = window(returns, lookback);
        let horizon = self.config.time_horizon as f64;

        match method {
            VarMethod::Historical => {
                self.check_inputs(returns, portfolio_value)?;

                let mut sorted = returns.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

                let idx = self.tail_index(sorted.len());
                let tail_mean = sorted[..=idx].iter().sum::<f64>() / (idx + 1) as f64;

                let var = self.historical_var(returns, portfolio_value, None)?;
                Ok((tail_mean * horizon.sqrt() * portfolio_value).min(var))
            }
            VarMethod::Parametric => {
                self.check_inputs(returns, portfolio_value)?;

                let (mean, std_dev) = fit_normal(returns)?;
                let alpha = 1.0 - self.config.confidence_level;
                let normal = standard_normal()?;
                let z = normal.inverse_cdf(alpha);

                // Closed-form Normal ES: mu - sigma * phi(z_alpha) / alpha
                let es_return = mean * horizon - std_dev * horizon.sqrt() * normal.pdf(z) / alpha;

                let var = self.parametric_var(returns, portfolio_value, None)?;
                Ok((es_return * portfolio_value).min(var))
            }
            VarMethod::MonteCarlo { simulations, seed } => {
                let terminals =
                    self.simulate_terminals(returns, portfolio_value, *simulations, *seed)?;

                let idx = self.tail_index(terminals.len());
                let tail_mean = terminals[..=idx].iter().sum::<f64>() / (idx + 1) as f64;
                let var = terminals[idx] - portfolio_value;

                Ok((tail_mean - portfolio_value).min(var).min(0.0))
            }
        }
    }

    /// Marginal contribution of each asset to total portfolio VaR
    ///
    /// `asset_returns` has one row per asset, one column per observation.
    /// Under the parametric method, contributions are component VaR
    /// (covariance with the portfolio) and sum to the portfolio's parametric
    /// VaR within numerical tolerance. Under the historical method, each
    /// contribution is the leave-one-out difference in empirical VaR.
    pub fn var_contribution(
        &self,
        asset_returns: &Array2<f64>,
        weights: &[f64],
        portfolio_value: f64,
        method: &VarMethod,
    ) -> Result<Vec<f64>, RiskError> {
        let n_assets = asset_returns.nrows();
        let n_obs = asset_returns.ncols();

        if weights.len() != n_assets {
            return Err(RiskError::InvalidParameter {
                name: "weights",
                reason: format!("{} weights for {} assets", weights.len(), n_assets),
            });
        }
        if n_obs < 2 {
            return Err(RiskError::InsufficientData {
                required: 2,
                actual: n_obs,
            });
        }
        if portfolio_value <= 0.0 {
            return Err(RiskError::InvalidParameter {
                name: "portfolio_value",
                reason: "must be positive".to_string(),
            });
        }

        match method {
            VarMethod::Parametric => {
                let cov = asset_returns
                    .cov(1.0)
                    .map_err(|e| RiskError::Computation(format!("covariance failed: {:?}", e)))?;

                let w = Array1::from(weights.to_vec());
                let cov_w = cov.dot(&w);
                let sigma = w.dot(&cov_w).sqrt();
                if !(sigma > 0.0) {
                    return Err(RiskError::Computation(
                        "portfolio variance is zero; cannot decompose VaR".to_string(),
                    ));
                }

                let mu = asset_returns
                    .mean_axis(Axis(1))
                    .ok_or_else(|| RiskError::Computation("empty return matrix".to_string()))?;

                let z = standard_normal_quantile(1.0 - self.config.confidence_level)?;
                let horizon = self.config.time_horizon as f64;

                Ok((0..n_assets)
                    .map(|i| {
                        (w[i] * mu[i] * horizon + z * horizon.sqrt() * w[i] * cov_w[i] / sigma)
                            * portfolio_value
                    })
                    .collect())
            }
            VarMethod::Historical => {
                let full = portfolio_series(asset_returns, weights);
                let var_full = self.historical_var(&full, portfolio_value, None)?;

                let mut contributions = Vec::with_capacity(n_assets);
                for i in 0..n_assets {
                    let mut reduced = weights.to_vec();
                    reduced[i] = 0.0;

                    let series = portfolio_series(asset_returns, &reduced);
                    let var_without = self.historical_var(&series, portfolio_value, None)?;
                    contributions.push(var_full - var_without);
                }
                Ok(contributions)
            }
            VarMethod::MonteCarlo { .. } => Err(RiskError::InvalidParameter {
                name: "method",
                reason: "VaR contribution supports historical and parametric methods".to_string(),
            }),
        }
    }

    /// Index of the `(1 - confidence)` percentile in a sorted sample of `n`
    fn tail_index(&self, n: usize) -> usize {
        let idx = ((1.0 - self.config.confidence_level) * n as f64).floor() as usize;
        idx.min(n.saturating_sub(1))
    }

    fn check_inputs(&self, returns: &[f64], portfolio_value: f64) -> Result<(), RiskError> {
        if returns.is_empty() {
            return Err(RiskError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if portfolio_value <= 0.0 || !portfolio_value.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "portfolio_value",
                reason: format!("must be positive and finite, got {}", portfolio_value),
            });
        }
        Ok(())
    }

    /// Run the bootstrap simulation and return sorted terminal values
    fn simulate_terminals(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        simulations: usize,
        seed: Option<u64>,
    ) -> Result<Vec<f64>, RiskError> {
        self.check_inputs(returns, portfolio_value)?;

        if simulations == 0 {
            return Err(RiskError::InvalidParameter {
                name: "simulations",
                reason: "must be positive".to_string(),
            });
        }

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let n = returns.len();
        let mut terminals = Vec::with_capacity(simulations);
        for _ in 0..simulations {
            let mut value = portfolio_value;
            for _ in 0..self.config.time_horizon {
                value *= 1.0 + returns[rng.gen_range(0..n)];
            }
            terminals.push(value);
        }

        terminals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(terminals)
    }
}

/// Weighted portfolio return series from an asset return matrix
fn portfolio_series(asset_returns: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    (0..asset_returns.ncols())
        .map(|t| {
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| w * asset_returns[[i, t]])
                .sum()
        })
        .collect()
}

/// Last `lookback` observations of the series, or all of it
fn window(returns: &[f64], lookback: Option<usize>) -> &[f64] {
    match lookback {
        Some(n) if n < returns.len() => &returns[returns.len() - n..],
        _ => returns,
    }
}

/// Sample mean and standard deviation, rejecting degenerate series
fn fit_normal(returns: &[f64]) -> Result<(f64, f64), RiskError> {
    if returns.len() < 2 {
        return Err(RiskError::Computation(format!(
            "parametric fit requires at least 2 observations, got {}",
            returns.len()
        )));
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if !(std_dev > 0.0) || !std_dev.is_finite() {
        return Err(RiskError::Computation(
            "sample standard deviation is zero; parametric VaR is undefined".to_string(),
        ));
    }

    Ok((mean, std_dev))
}

fn standard_normal() -> Result<Normal, RiskError> {
    Normal::new(0.0, 1.0).map_err(|e| RiskError::Computation(format!("normal distribution: {}", e)))
}

fn standard_normal_quantile(p: f64) -> Result<f64, RiskError> {
    Ok(standard_normal()?.inverse_cdf(p))
}
