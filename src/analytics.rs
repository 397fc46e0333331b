//! Portfolio analytics
//!
//! Pure functions over return series, portfolio-value series and optional
//! benchmark series: risk-adjusted ratios, drawdown, beta/alpha, correlation
//! and covariance matrices, and the efficient frontier.
//!
//! Degenerate denominators follow a consistent convention: ratios with a
//! zero risk denominator return an infinity sentinel with the sign of the
//! numerator rather than failing, since flat series are an expected feature
//! of real market data. Beta is the exception: a zero-variance market series
//! makes beta genuinely undefined and is rejected.

use ndarray::{Array1, Array2};
use ndarray_stats::CorrelationExt;
use serde::{Deserialize, Serialize};

use crate::optimize::{project_capped_simplex, projected_gradient_descent};
use crate::RiskError;

/// Trading periods per year for daily data
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Bundle of portfolio performance and risk ratios
///
/// Benchmark-relative fields are `None` when no benchmark series was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub beta: Option<f64>,
    pub jensens_alpha: Option<f64>,
    pub information_ratio: Option<f64>,
}

/// A single point on the efficient frontier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    /// Per-period expected portfolio return at this point
    pub expected_return: f64,

    /// Per-period portfolio volatility at this point
    pub volatility: f64,

    /// Asset weights, summing to 1
    pub weights: Vec<f64>,
}

/// Portfolio analytics calculator
#[derive(Debug, Clone)]
pub struct PortfolioAnalytics {
    /// Annual risk-free rate
    risk_free_rate: f64,

    /// Return observations per year (252 for daily data)
    periods_per_year: f64,
}

impl Default for PortfolioAnalytics {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl PortfolioAnalytics {
    pub fn new(risk_free_rate: f64, periods_per_year: f64) -> Result<Self, RiskError> {
        if !risk_free_rate.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "risk_free_rate",
                reason: "must be finite".to_string(),
            });
        }
        if !(periods_per_year > 0.0) {
            return Err(RiskError::InvalidParameter {
                name: "periods_per_year",
                reason: format!("must be positive, got {}", periods_per_year),
            });
        }
        Ok(Self {
            risk_free_rate,
            periods_per_year,
        })
    }

    /// Risk-free rate per return period
    fn period_risk_free(&self) -> f64 {
        self.risk_free_rate / self.periods_per_year
    }

    /// Sharpe ratio: mean excess return over its standard deviation
    pub fn sharpe_ratio(&self, returns: &[f64], annualized: bool) -> Result<f64, RiskError> {
        require_observations(returns, 2)?;

        let rf = self.period_risk_free();
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();

        let m = mean(&excess);
        let s = sample_std(&excess);
        let ratio = safe_ratio(m, s);

        Ok(if annualized && ratio.is_finite() {
            ratio * self.periods_per_year.sqrt()
        } else {
            ratio
        })
    }

    /// Sortino ratio: mean excess return over downside deviation
    ///
    /// Returns `+inf` when the series has no negative excess returns.
    pub fn sortino_ratio(&self, returns: &[f64], annualized: bool) -> Result<f64, RiskError> {
        require_observations(returns, 2)?;

        let rf = self.period_risk_free();
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
        let m = mean(&excess);

        if excess.iter().all(|&e| e >= 0.0) {
            return Ok(f64::INFINITY);
        }

        // Downside deviation over the full sample length, per convention.
        let downside_dev = (excess
            .iter()
            .map(|&e| e.min(0.0).powi(2))
            .sum::<f64>()
            / excess.len() as f64)
            .sqrt();
        let ratio = safe_ratio(m, downside_dev);

        Ok(if annualized && ratio.is_finite() {
            ratio * self.periods_per_year.sqrt()
        } else {
            ratio
        })
    }

    /// Maximum drawdown of a portfolio-value series, as a positive magnitude
    pub fn max_drawdown(&self, values: &[f64]) -> Result<f64, RiskError> {
        require_observations(values, 1)?;

        let mut peak = values[0];
        let mut max_dd = 0.0f64;
        for &v in values {
            if v > peak {
                peak = v;
            }
            if peak > 0.0 {
                max_dd = max_dd.max((peak - v) / peak);
            }
        }
        Ok(max_dd)
    }

    /// Maximum drawdown of a return series, compounded from a unit start
    pub fn drawdown_from_returns(&self, returns: &[f64]) -> Result<f64, RiskError> {
        require_observations(returns, 1)?;
        self.max_drawdown(&returns_to_values(returns, 1.0))
    }

    /// Beta of the portfolio against a market series
    ///
    /// Errors when the market series has zero variance: beta is undefined,
    /// not merely degenerate.
    pub fn beta(&self, portfolio: &[f64], market: &[f64]) -> Result<f64, RiskError> {
        require_paired(portfolio, market)?;

        let market_var = sample_std(market).powi(2);
        if !(market_var > 0.0) {
            return Err(RiskError::Computation(
                "market series has zero variance; beta is undefined".to_string(),
            ));
        }

        Ok(sample_cov(portfolio, market) / market_var)
    }

    /// Jensen's alpha: portfolio return beyond its CAPM-expected return
    pub fn jensens_alpha(&self, portfolio: &[f64], market: &[f64]) -> Result<f64, RiskError> {
        let beta = self.beta(portfolio, market)?;
        let rf = self.period_risk_free();
        Ok(mean(portfolio) - (rf + beta * (mean(market) - rf)))
    }

    /// Calmar ratio: annualized return over max drawdown of the value series
    ///
    /// Returns `+inf` for a series that never draws down.
    pub fn calmar_ratio(&self, values: &[f64]) -> Result<f64, RiskError> {
        require_observations(values, 2)?;

        let returns = values_to_returns(values);
        let annual_return = mean(&returns) * self.periods_per_year;
        let dd = self.max_drawdown(values)?;

        if dd == 0.0 {
            return Ok(f64::INFINITY);
        }
        Ok(annual_return / dd)
    }

    /// Information ratio against a benchmark series
    pub fn information_ratio(
        &self,
        portfolio: &[f64],
        benchmark: &[f64],
    ) -> Result<f64, RiskError> {
        require_paired(portfolio, benchmark)?;

        let active: Vec<f64> = portfolio
            .iter()
            .zip(benchmark)
            .map(|(p, b)| p - b)
            .collect();

        Ok(safe_ratio(mean(&active), sample_std(&active)))
    }

    /// Annualized volatility of a return series
    pub fn annualized_volatility(&self, returns: &[f64]) -> Result<f64, RiskError> {
        require_observations(returns, 2)?;
        Ok(sample_std(returns) * self.periods_per_year.sqrt())
    }

    /// Annualized mean return of a return series
    pub fn annualized_return(&self, returns: &[f64]) -> Result<f64, RiskError> {
        require_observations(returns, 1)?;
        Ok(mean(returns) * self.periods_per_year)
    }

    /// Covariance matrix of an asset return matrix (one row per asset)
    pub fn covariance_matrix(
        &self,
        asset_returns: &Array2<f64>,
        annualized: bool,
    ) -> Result<Array2<f64>, RiskError> {
        if asset_returns.ncols() < 2 {
            return Err(RiskError::InsufficientData {
                required: 2,
                actual: asset_returns.ncols(),
            });
        }

        let cov = asset_returns
            .cov(1.0)
            .map_err(|e| RiskError::Computation(format!("covariance failed: {:?}", e)))?;

        Ok(if annualized {
            cov * self.periods_per_year
        } else {
            cov
        })
    }

    /// Pairwise Pearson correlation matrix of an asset return matrix
    pub fn correlation_matrix(
        &self,
        asset_returns: &Array2<f64>,
    ) -> Result<Array2<f64>, RiskError> {
        if asset_returns.ncols() < 2 {
            return Err(RiskError::InsufficientData {
                required: 2,
                actual: asset_returns.ncols(),
            });
        }

        asset_returns
            .pearson_correlation()
            .map_err(|e| RiskError::Computation(format!("correlation failed: {:?}", e)))
    }

    /// Average off-diagonal pairwise correlation
    pub fn average_correlation(&self, asset_returns: &Array2<f64>) -> Result<f64, RiskError> {
        let corr = self.correlation_matrix(asset_returns)?;
        let n = corr.nrows();
        if n < 2 {
            return Ok(0.0);
        }

        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..n {
            for j in (i + 1)..n {
                if corr[[i, j]].is_finite() {
                    sum += corr[[i, j]];
                    count += 1;
                }
            }
        }
        Ok(if count > 0 { sum / count as f64 } else { 0.0 })
    }

    /// Efficient frontier over `points` target returns
    ///
    /// For each target between the lowest and highest asset mean return,
    /// solves for the minimum-variance weight vector subject to long-only
    /// weights summing to 1 and hitting the target expected return (enforced
    /// by quadratic penalty). Weights in every returned point sum to 1.
    pub fn efficient_frontier(
        &self,
        asset_returns: &Array2<f64>,
        points: usize,
    ) -> Result<Vec<FrontierPoint>, RiskError> {
        let n_assets = asset_returns.nrows();
        if n_assets < 2 {
            return Err(RiskError::InvalidParameter {
                name: "asset_returns",
                reason: format!("frontier needs at least 2 assets, got {}", n_assets),
            });
        }
        if points < 2 {
            return Err(RiskError::InvalidParameter {
                name: "points",
                reason: format!("must be at least 2, got {}", points),
            });
        }

        let cov = self.covariance_matrix(asset_returns, false)?;
        let mu: Array1<f64> = (0..n_assets)
            .map(|i| asset_returns.row(i).mean().unwrap_or(0.0))
            .collect();

        let min_ret = mu.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_ret = mu.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        // Penalty weight large enough to pin the return constraint without
        // destabilizing the quadratic term at daily-return magnitudes.
        let penalty = 1000.0;

        let mut frontier = Vec::with_capacity(points);
        for k in 0..points {
            let target = min_ret + (max_ret - min_ret) * k as f64 / (points - 1) as f64;

            let mut w = projected_gradient_descent(
                n_assets,
                |w| {
                    let grad_var = cov.dot(w) * 2.0;
                    let gap = w.dot(&mu) - target;
                    grad_var + &(&mu * (2.0 * penalty * gap))
                },
                0.0,
                1.0,
                500,
                0.01,
            );
            project_capped_simplex(&mut w, 0.0, 1.0);

            let volatility = w.dot(&cov.dot(&w)).max(0.0).sqrt();
            frontier.push(FrontierPoint {
                expected_return: w.dot(&mu),
                volatility,
                weights: w.to_vec(),
            });
        }

        Ok(frontier)
    }

    /// Full ratio bundle for a return series
    ///
    /// The portfolio-value path used for drawdown and Calmar is compounded
    /// from the returns starting at 1.0.
    pub fn portfolio_stats(
        &self,
        returns: &[f64],
        benchmark: Option<&[f64]>,
    ) -> Result<PortfolioStats, RiskError> {
        require_observations(returns, 2)?;

        let values = returns_to_values(returns, 1.0);

        let wins = returns.iter().filter(|&&r| r > 0.0).count();
        let gains: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
        let losses: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| -r).sum();

        let (beta, jensens_alpha, information_ratio) = match benchmark {
            Some(bench) => (
                Some(self.beta(returns, bench)?),
                Some(self.jensens_alpha(returns, bench)?),
                Some(self.information_ratio(returns, bench)?),
            ),
            None => (None, None, None),
        };

        Ok(PortfolioStats {
            annualized_return: self.annualized_return(returns)?,
            annualized_volatility: self.annualized_volatility(returns)?,
            sharpe_ratio: self.sharpe_ratio(returns, true)?,
            sortino_ratio: self.sortino_ratio(returns, true)?,
            calmar_ratio: self.calmar_ratio(&values)?,
            max_drawdown: self.max_drawdown(&values)?,
            win_rate: wins as f64 / returns.len() as f64,
            profit_factor: safe_ratio(gains, losses),
            beta,
            jensens_alpha,
            information_ratio,
        })
    }
}

/// Ratio with an infinity sentinel for a zero denominator
fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        f64::INFINITY
    } else if numerator < 0.0 {
        f64::NEG_INFINITY
    } else {
        0.0
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64).sqrt()
}

fn sample_cov(xs: &[f64], ys: &[f64]) -> f64 {
    let mx = mean(xs);
    let my = mean(ys);
    xs.iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / (xs.len() - 1) as f64
}

fn values_to_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn returns_to_values(returns: &[f64], start: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(returns.len() + 1);
    let mut v = start;
    values.push(v);
    for r in returns {
        v *= 1.0 + r;
        values.push(v);
    }
    values
}

fn require_observations(xs: &[f64], required: usize) -> Result<(), RiskError> {
    if xs.len() < required {
        return Err(RiskError::InsufficientData {
            required,
            actual: xs.len(),
        });
    }
    Ok(())
}

fn require_paired(a: &[f64], b: &[f64]) -> Result<(), RiskError> {
    if a.len() != b.len() {
        return Err(RiskError::InvalidParameter {
            name: "series",
            reason: format!("length mismatch: {} vs {}", a.len(), b.len()),
        });
    }
    require_observations(a, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn analytics() -> PortfolioAnalytics {
        PortfolioAnalytics::default()
    }

    #[test]
    fn test_sharpe_sign_follows_mean() {
        let a = analytics();

        let up = vec![0.01, 0.02, -0.005, 0.015, 0.01];
        assert!(a.sharpe_ratio(&up, false).unwrap() > 0.0);

        let down = vec![-0.01, -0.02, 0.005, -0.015, -0.01];
        assert!(a.sharpe_ratio(&down, false).unwrap() < 0.0);
    }

    #[test]
    fn test_sortino_infinite_without_downside() {
        let a = analytics();
        let all_up = vec![0.01, 0.02, 0.005, 0.015];
        assert_eq!(a.sortino_ratio(&all_up, true).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_sortino_exceeds_sharpe_on_skewed_series() {
        // Mostly small gains with one loss: downside deviation is smaller
        // than total deviation, so Sortino > Sharpe.
        let a = analytics();
        let returns = vec![0.01, 0.012, 0.011, -0.02, 0.009, 0.013, 0.01];

        let sharpe = a.sharpe_ratio(&returns, false).unwrap();
        let sortino = a.sortino_ratio(&returns, false).unwrap();
        assert!(sortino > sharpe);
    }

    #[test]
    fn test_max_drawdown() {
        let a = analytics();
        let values = vec![100.0, 120.0, 90.0, 110.0, 80.0];
        // Peak 120 -> trough 80 = 1/3 drawdown
        let dd = a.max_drawdown(&values).unwrap();
        assert!((dd - 1.0 / 3.0).abs() < 1e-12);

        let monotone = vec![100.0, 105.0, 110.0];
        assert_eq!(a.max_drawdown(&monotone).unwrap(), 0.0);
    }

    #[test]
    fn test_calmar_infinite_without_drawdown() {
        let a = analytics();
        let values = vec![100.0, 101.0, 102.0, 103.0];
        assert_eq!(a.calmar_ratio(&values).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_beta_of_scaled_market() {
        let a = analytics();
        let market = vec![0.01, -0.02, 0.015, 0.005, -0.01, 0.02];
        let portfolio: Vec<f64> = market.iter().map(|r| r * 1.5).collect();

        let beta = a.beta(&portfolio, &market).unwrap();
        assert!((beta - 1.5).abs() < 1e-9);

        // Perfectly tracking portfolio has zero alpha at rf = 0.
        let alpha = a.jensens_alpha(&portfolio, &market).unwrap();
        let expected = mean(&portfolio) - 1.5 * mean(&market);
        assert!((alpha - expected).abs() < 1e-12);
    }

    #[test]
    fn test_beta_rejects_flat_market() {
        let a = analytics();
        let portfolio = vec![0.01, -0.02, 0.015];
        let market = vec![0.0, 0.0, 0.0];
        assert!(a.beta(&portfolio, &market).is_err());
    }

    #[test]
    fn test_information_ratio_zero_against_self() {
        let a = analytics();
        let returns = vec![0.01, -0.005, 0.02, 0.003];
        assert_eq!(a.information_ratio(&returns, &returns).unwrap(), 0.0);
    }

    #[test]
    fn test_correlation_matrix_diagonal() {
        let a = analytics();
        let matrix = Array2::from_shape_vec(
            (2, 6),
            vec![
                0.01, -0.02, 0.015, 0.005, -0.01, 0.02, // asset 1
                0.005, -0.01, 0.02, -0.005, 0.01, -0.015, // asset 2
            ],
        )
        .unwrap();

        let corr = a.correlation_matrix(&matrix).unwrap();
        assert!((corr[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((corr[[1, 1]] - 1.0).abs() < 1e-9);
        assert!((corr[[0, 1]] - corr[[1, 0]]).abs() < 1e-12);
        assert!(corr[[0, 1]].abs() <= 1.0 + 1e-9);
    }

    #[test]
    fn test_covariance_annualization() {
        let a = analytics();
        let matrix = Array2::from_shape_vec(
            (2, 4),
            vec![0.01, -0.02, 0.015, 0.005, 0.005, -0.01, 0.02, -0.005],
        )
        .unwrap();

        let daily = a.covariance_matrix(&matrix, false).unwrap();
        let annual = a.covariance_matrix(&matrix, true).unwrap();
        assert!((annual[[0, 0]] - daily[[0, 0]] * TRADING_DAYS_PER_YEAR).abs() < 1e-12);
    }

    #[test]
    fn test_efficient_frontier_weights_sum_to_one() {
        let a = analytics();
        // Two assets with different means and volatilities.
        let matrix = Array2::from_shape_vec(
            (2, 8),
            vec![
                0.02, -0.01, 0.03, 0.01, -0.02, 0.025, 0.015, -0.005, // risky
                0.005, 0.002, 0.004, 0.003, 0.001, 0.004, 0.002, 0.003, // stable
            ],
        )
        .unwrap();

        let frontier = a.efficient_frontier(&matrix, 5).unwrap();
        assert_eq!(frontier.len(), 5);

        for point in &frontier {
            let sum: f64 = point.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "weights sum {}", sum);
            assert!(point.weights.iter().all(|&w| w >= -1e-9));
            assert!(point.volatility >= 0.0);
        }

        // Expected returns are non-decreasing along the target grid.
        for pair in frontier.windows(2) {
            assert!(pair[1].expected_return >= pair[0].expected_return - 1e-6);
        }
    }

    #[test]
    fn test_portfolio_stats_bundle() {
        let a = analytics();
        let returns = vec![0.01, -0.02, 0.015, 0.005, -0.01, 0.02, 0.003, -0.004];
        let bench = vec![0.008, -0.015, 0.01, 0.004, -0.008, 0.015, 0.002, -0.003];

        let stats = a.portfolio_stats(&returns, Some(&bench)).unwrap();
        assert!(stats.annualized_volatility > 0.0);
        assert!(stats.max_drawdown >= 0.0);
        assert!((stats.win_rate - 5.0 / 8.0).abs() < 1e-12);
        assert!(stats.profit_factor > 0.0);
        assert!(stats.beta.is_some());
        assert!(stats.information_ratio.is_some());

        let solo = a.portfolio_stats(&returns, None).unwrap();
        assert!(solo.beta.is_none());
        assert!(solo.jensens_alpha.is_none());
    }
}
