//! Position sizing
//!
//! Single-position sizing (Kelly criterion, fixed-fractional) and full
//! portfolio allocation (risk parity, minimum variance, maximum Sharpe,
//! equal risk contribution, volatility targeting).
//!
//! Every sizing output is clamped to the configured `max_single_position`;
//! allocation methods additionally project their weight vector onto the
//! configured per-asset bounds with weights summing to 1. A degenerate
//! covariance matrix (flat asset, non-finite entries) falls back to equal
//! weighting rather than failing, since single-day and flat series are
//! ordinary inputs in practice.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use ndarray_stats::CorrelationExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analytics::TRADING_DAYS_PER_YEAR;
use crate::config::SizerConfig;
use crate::optimize::{
    equal_weights, is_degenerate, project_capped_simplex, projected_gradient_descent,
};
use crate::RiskError;

/// Sizing method selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SizingMethod {
    /// Kelly criterion from win/loss statistics
    Kelly {
        win_rate: f64,
        avg_win_return: f64,
        avg_loss_return: f64,
    },

    /// Fixed fraction of portfolio value, optionally volatility-adjusted
    FixedFractional {
        risk_per_trade: Option<f64>,
        volatility: Option<f64>,
    },

    /// Inverse-volatility weighting, optionally scaled to a target volatility
    RiskParity { target_volatility: Option<f64> },

    /// Minimum-variance portfolio
    MinimumVariance,

    /// Maximum-Sharpe portfolio
    MaximumSharpe,

    /// Equal risk contribution portfolio
    EqualRiskContribution,

    /// Risk-parity base scaled to an annualized volatility target
    VolatilityTarget { target_volatility: f64 },
}

impl SizingMethod {
    /// Whether this method produces a full allocation rather than a single
    /// position fraction
    pub fn is_allocation(&self) -> bool {
        !matches!(
            self,
            SizingMethod::Kelly { .. } | SizingMethod::FixedFractional { .. }
        )
    }
}

/// Result of a Kelly criterion calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellySizing {
    /// Raw Kelly fraction, may be negative when there is no edge
    pub kelly_fraction: f64,

    /// Kelly fraction after the configured divisor (half Kelly by default)
    pub conservative_kelly: f64,

    /// Final fraction to deploy, clamped to `max_single_position`
    pub position_size: f64,

    /// `position_size * portfolio_value`
    pub position_value: f64,

    /// False when the raw Kelly fraction is non-positive; callers should not
    /// open a position in that case
    pub has_edge: bool,
}

/// Position sizer
pub struct PositionSizer {
    config: SizerConfig,
}

impl PositionSizer {
    pub fn new(config: SizerConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SizerConfig {
        &self.config
    }

    /// Kelly criterion position size
    ///
    /// `kelly = (b*p - q) / b` with `b = avg_win / |avg_loss|`. The returned
    /// `position_size` is the conservative (divided) fraction clamped to
    /// `max_single_position`, never the raw Kelly value.
    pub fn kelly_criterion(
        &self,
        win_rate: f64,
        avg_win_return: f64,
        avg_loss_return: f64,
        portfolio_value: f64,
    ) -> Result<KellySizing, RiskError> {
        if !(win_rate > 0.0 && win_rate < 1.0) {
            return Err(RiskError::InvalidParameter {
                name: "win_rate",
                reason: format!("must be in (0, 1), got {}", win_rate),
            });
        }
        if avg_win_return <= 0.0 {
            return Err(RiskError::InvalidParameter {
                name: "avg_win_return",
                reason: format!("must be positive, got {}", avg_win_return),
            });
        }
        if avg_loss_return >= 0.0 {
            return Err(RiskError::InvalidParameter {
                name: "avg_loss_return",
                reason: format!("must be negative, got {}", avg_loss_return),
            });
        }
        check_portfolio_value(portfolio_value)?;

        let b = avg_win_return / avg_loss_return.abs();
        let p = win_rate;
        let q = 1.0 - p;

        let kelly_fraction = (b * p - q) / b;
        let conservative_kelly = kelly_fraction / self.config.kelly_divisor;
        let has_edge = kelly_fraction > 0.0;

        let position_size = if has_edge {
            conservative_kelly.min(self.config.max_single_position)
        } else {
            0.0
        };

        Ok(KellySizing {
            kelly_fraction,
            conservative_kelly,
            position_size,
            position_value: position_size * portfolio_value,
            has_edge,
        })
    }

    /// Kelly sizing with win/loss statistics estimated from a return series
    pub fn size_from_returns(
        &self,
        returns: &[f64],
        portfolio_value: f64,
    ) -> Result<KellySizing, RiskError> {
        let wins: Vec<f64> = returns.iter().copied().filter(|&r| r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();

        if wins.is_empty() || losses.is_empty() {
            return Err(RiskError::InsufficientData {
                required: 2,
                actual: wins.len().min(losses.len()),
            });
        }

        let win_rate = wins.len() as f64 / (wins.len() + losses.len()) as f64;
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;

        self.kelly_criterion(win_rate, avg_win, avg_loss, portfolio_value)
    }

    /// Fixed-fractional sizing, volatility-adjusted when a volatility is given
    pub fn fixed_fractional(
        &self,
        portfolio_value: f64,
        risk_per_trade: Option<f64>,
        volatility: Option<f64>,
    ) -> Result<f64, RiskError> {
        check_portfolio_value(portfolio_value)?;

        let mut fraction = risk_per_trade.unwrap_or(self.config.max_portfolio_risk);
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(RiskError::InvalidParameter {
                name: "risk_per_trade",
                reason: format!("must be in (0, 1], got {}", fraction),
            });
        }

        if let Some(vol) = volatility {
            if !(vol > 0.0) {
                return Err(RiskError::InvalidParameter {
                    name: "volatility",
                    reason: format!("must be positive, got {}", vol),
                });
            }
            fraction /= vol;
        }

        Ok(fraction.min(self.config.max_single_position))
    }

    /// Inverse-volatility (risk parity) allocation
    pub fn risk_parity_allocation(
        &self,
        assets: &[String],
        asset_returns: &Array2<f64>,
        target_volatility: Option<f64>,
    ) -> Result<HashMap<String, f64>, RiskError> {
        let cov = self.covariance(assets, asset_returns)?;
        let n = assets.len();

        let mut w = if is_degenerate(&cov) {
            warn!("degenerate covariance matrix; falling back to equal weights");
            equal_weights(n)
        } else {
            let mut inv_vol: Array1<f64> = (0..n).map(|i| 1.0 / cov[[i, i]].sqrt()).collect();
            let sum = inv_vol.sum();
            inv_vol.mapv_inplace(|x| x / sum);
            inv_vol
        };

        if let Some(target) = target_volatility {
            self.scale_to_target_volatility(&mut w, &cov, target)?;
        }

        Ok(self.finish_allocation(assets, w))
    }

    /// Minimum-variance allocation
    pub fn minimum_variance_allocation(
        &self,
        assets: &[String],
        asset_returns: &Array2<f64>,
    ) -> Result<HashMap<String, f64>, RiskError> {
        let cov = self.covariance(assets, asset_returns)?;
        let n = assets.len();
        let (lo, hi) = self.config.weight_bounds;

        let w = if is_degenerate(&cov) {
            warn!("degenerate covariance matrix; falling back to equal weights");
            equal_weights(n)
        } else {
            projected_gradient_descent(n, |w| cov.dot(w) * 2.0, lo, hi, 500, 0.5)
        };

        Ok(self.finish_allocation(assets, w))
    }

    /// Maximum-Sharpe allocation (risk-free rate taken as zero)
    pub fn maximum_sharpe_allocation(
        &self,
        assets: &[String],
        asset_returns: &Array2<f64>,
    ) -> Result<HashMap<String, f64>, RiskError> {
        let cov = self.covariance(assets, asset_returns)?;
        let n = assets.len();
        let (lo, hi) = self.config.weight_bounds;

        let w = if is_degenerate(&cov) {
            warn!("degenerate covariance matrix; falling back to equal weights");
            equal_weights(n)
        } else {
            let mu: Array1<f64> = (0..n)
                .map(|i| asset_returns.row(i).mean().unwrap_or(0.0))
                .collect();

            // Gradient of the negative Sharpe ratio.
            projected_gradient_descent(
                n,
                |w| {
                    let cov_w = cov.dot(w);
                    let var = w.dot(&cov_w).max(1e-12);
                    let sigma = var.sqrt();
                    let excess = w.dot(&mu);
                    (&cov_w * (excess / (var * sigma))) - &(&mu / sigma)
                },
                lo,
                hi,
                500,
                0.01,
            )
        };

        Ok(self.finish_allocation(assets, w))
    }

    /// Equal risk contribution allocation
    ///
    /// Multiplicative iteration: each weight is adjusted toward the point
    /// where every asset contributes the same share of portfolio variance.
    pub fn equal_risk_contribution(
        &self,
        assets: &[String],
        asset_returns: &Array2<f64>,
    ) -> Result<HashMap<String, f64>, RiskError> {
        let cov = self.covariance(assets, asset_returns)?;
        let n = assets.len();

        let w = if is_degenerate(&cov) {
            warn!("degenerate covariance matrix; falling back to equal weights");
            equal_weights(n)
        } else {
            let mut w = equal_weights(n);
            for _ in 0..200 {
                let cov_w = cov.dot(&w);
                let port_var = w.dot(&cov_w);
                if !(port_var > 0.0) {
                    break;
                }

                let target = port_var / n as f64;
                for i in 0..n {
                    let rc = w[i] * cov_w[i];
                    if rc > 0.0 {
                        w[i] *= (target / rc).sqrt();
                    }
                }

                let sum = w.sum();
                if sum > 0.0 {
                    w.mapv_inplace(|x| x / sum);
                }
            }
            w
        };

        Ok(self.finish_allocation(assets, w))
    }

    /// Risk-parity base scaled toward an annualized volatility target
    pub fn volatility_targeted_allocation(
        &self,
        assets: &[String],
        asset_returns: &Array2<f64>,
        target_volatility: f64,
    ) -> Result<HashMap<String, f64>, RiskError> {
        self.risk_parity_allocation(assets, asset_returns, Some(target_volatility))
    }

    /// Dispatch an allocation method
    pub fn allocate(
        &self,
        method: &SizingMethod,
        assets: &[String],
        asset_returns: &Array2<f64>,
    ) -> Result<HashMap<String, f64>, RiskError> {
        match method {
            SizingMethod::RiskParity { target_volatility } => {
                self.risk_parity_allocation(assets, asset_returns, *target_volatility)
            }
            SizingMethod::MinimumVariance => self.minimum_variance_allocation(assets, asset_returns),
            SizingMethod::MaximumSharpe => self.maximum_sharpe_allocation(assets, asset_returns),
            SizingMethod::EqualRiskContribution => {
                self.equal_risk_contribution(assets, asset_returns)
            }
            SizingMethod::VolatilityTarget { target_volatility } => {
                self.volatility_targeted_allocation(assets, asset_returns, *target_volatility)
            }
            SizingMethod::Kelly { .. } | SizingMethod::FixedFractional { .. } => {
                Err(RiskError::InvalidParameter {
                    name: "method",
                    reason: "single-position method passed to allocate".to_string(),
                })
            }
        }
    }

    fn covariance(
        &self,
        assets: &[String],
        asset_returns: &Array2<f64>,
    ) -> Result<Array2<f64>, RiskError> {
        if assets.is_empty() {
            return Err(RiskError::InvalidParameter {
                name: "assets",
                reason: "must not be empty".to_string(),
            });
        }
        if assets.len() != asset_returns.nrows() {
            return Err(RiskError::InvalidParameter {
                name: "asset_returns",
                reason: format!(
                    "{} rows for {} assets",
                    asset_returns.nrows(),
                    assets.len()
                ),
            });
        }
        if asset_returns.ncols() < 2 {
            return Err(RiskError::InsufficientData {
                required: 2,
                actual: asset_returns.ncols(),
            });
        }

        asset_returns
            .cov(1.0)
            .map_err(|e| RiskError::Computation(format!("covariance failed: {:?}", e)))
    }

    /// Scale the weight vector so that annualized portfolio volatility moves
    /// toward `target`; the vector is re-projected onto the simplex afterward
    fn scale_to_target_volatility(
        &self,
        w: &mut Array1<f64>,
        cov: &Array2<f64>,
        target: f64,
    ) -> Result<(), RiskError> {
        if !(target > 0.0) {
            return Err(RiskError::InvalidParameter {
                name: "target_volatility",
                reason: format!("must be positive, got {}", target),
            });
        }

        let port_vol = w.dot(&cov.dot(w)).max(0.0).sqrt() * TRADING_DAYS_PER_YEAR.sqrt();
        if port_vol > 0.0 {
            let scale = target / port_vol;
            w.mapv_inplace(|x| x * scale);
        }
        Ok(())
    }

    /// Project onto configured bounds and pair with asset names
    fn finish_allocation(&self, assets: &[String], mut w: Array1<f64>) -> HashMap<String, f64> {
        let (lo, hi) = self.config.weight_bounds;
        project_capped_simplex(&mut w, lo, hi);

        assets
            .iter()
            .cloned()
            .zip(w.iter().copied())
            .collect()
    }
}

fn check_portfolio_value(portfolio_value: f64) -> Result<(), RiskError> {
    if !(portfolio_value > 0.0) || !portfolio_value.is_finite() {
        return Err(RiskError::InvalidParameter {
            name: "portfolio_value",
            reason: format!("must be positive and finite, got {}", portfolio_value),
        });
    }
    Ok(())
}
