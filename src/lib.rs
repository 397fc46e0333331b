//! Portfolio risk management engine
//!
//! Provides the risk core for a trading system:
//!
//! - **VaR engine** ([`VarEngine`]): historical, parametric and Monte Carlo
//!   Value-at-Risk, Expected Shortfall, per-asset VaR contributions
//! - **Position sizer** ([`PositionSizer`]): Kelly criterion,
//!   fixed-fractional sizing and portfolio allocation (risk parity, minimum
//!   variance, maximum Sharpe, equal risk contribution, volatility target)
//! - **Portfolio analytics** ([`PortfolioAnalytics`]): Sharpe, Sortino,
//!   Calmar, Information Ratio, beta/alpha, drawdown, correlation and
//!   covariance matrices, efficient frontier
//! - **Risk controller** ([`RiskController`]): stop-loss, take-profit and
//!   trailing-stop triggers per price tick, daily-loss and concentration
//!   limits, emergency liquidation
//! - **Orchestrator** ([`RiskOrchestrator`]): the unified façade, including
//!   a cancellable background monitoring loop
//!
//! The crate is a library boundary only: market data, order execution and
//! transport are the caller's concern.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

pub mod alerts;
pub mod analytics;
pub mod config;
pub mod controller;
mod optimize;
pub mod sizing;
pub mod var;

pub use alerts::{Alert, AlertLog, AlertSeverity};
pub use analytics::{FrontierPoint, PortfolioAnalytics, PortfolioStats};
pub use config::{MonitorConfig, RiskLimits, SizerConfig, VarConfig};
pub use controller::{CloseReason, ClosedPosition, Position, PriceTriggers, RiskController};
pub use sizing::{KellySizing, PositionSizer, SizingMethod};
pub use var::{VarEngine, VarMethod};

/// Errors from the risk engine
#[derive(Debug, Error)]
pub enum RiskError {
    /// A caller-supplied parameter is out of range or inconsistent
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A computation is mathematically undefined for the given input
    #[error("computation failed: {0}")]
    Computation(String),

    /// The input series is too short for the requested method
    #[error("insufficient data: need {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// The monitoring loop is already running
    #[error("risk monitoring already running")]
    AlreadyRunning,

    /// The monitoring loop is not running
    #[error("risk monitoring not running")]
    NotRunning,

    /// No tracked position for the instrument
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
}

/// Qualitative portfolio risk level
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Point-in-time result of a portfolio risk assessment
///
/// Immutable once produced; every field is populated on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,

    /// Confidence level the VaR figures were computed at
    pub confidence_level: f64,

    /// Historical VaR in currency terms (negative = loss)
    pub value_at_risk: f64,
    pub expected_shortfall: f64,

    pub sharpe_ratio: f64,

    /// Positive drawdown magnitude of the supplied return series
    pub max_drawdown: f64,

    /// Herfindahl index of the supplied portfolio
    pub concentration: f64,

    /// Average pairwise correlation, when asset-level series were supplied
    pub average_correlation: f64,

    pub position_size_breached: bool,
    pub daily_loss_breached: bool,

    /// Ordered, human-readable recommendations
    pub recommendations: Vec<String>,

    /// Alerts pending in the log at assessment time
    pub active_alerts: Vec<Alert>,
}

/// Result of a single-position sizing call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingResult {
    pub instrument: String,

    /// Fraction of portfolio value to deploy, after all clamps
    pub fraction: f64,
    pub position_value: f64,
    pub quantity: f64,

    /// Kelly detail when the Kelly method was used
    pub kelly: Option<KellySizing>,
}

/// Bundle returned by [`RiskOrchestrator::get_portfolio_risk_profile`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRiskProfile {
    pub timestamp: DateTime<Utc>,
    pub stats: PortfolioStats,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,

    /// Average pairwise correlation, when asset-level series were supplied
    pub average_correlation: Option<f64>,

    /// Herfindahl index of the controller's open positions
    pub concentration: f64,
}

/// Unified façade over the risk components
///
/// Composes the VaR engine, analytics, sizer and controller; contains no
/// numerical logic of its own, only composition, defaulting and result
/// aggregation.
pub struct RiskOrchestrator {
    var_engine: VarEngine,
    analytics: PortfolioAnalytics,
    sizer: PositionSizer,
    controller: Arc<RiskController>,
    monitor: MonitorConfig,
    alerts: Arc<AlertLog>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl RiskOrchestrator {
    pub fn new(
        limits: RiskLimits,
        var_config: VarConfig,
        sizer_config: SizerConfig,
        monitor: MonitorConfig,
    ) -> Result<Self, RiskError> {
        let alerts = Arc::new(AlertLog::new(monitor.alert_history_size));
        let controller = Arc::new(RiskController::new(limits, alerts.clone())?);

        Ok(Self {
            var_engine: VarEngine::new(var_config)?,
            analytics: PortfolioAnalytics::default(),
            sizer: PositionSizer::new(sizer_config)?,
            controller,
            monitor,
            alerts,
            shutdown: Mutex::new(None),
        })
    }

    /// Orchestrator with default configuration everywhere
    pub fn with_defaults() -> Result<Self, RiskError> {
        Self::new(
            RiskLimits::default(),
            VarConfig::default(),
            SizerConfig::default(),
            MonitorConfig::default(),
        )
    }

    pub fn controller(&self) -> &Arc<RiskController> {
        &self.controller
    }

    pub fn var_engine(&self) -> &VarEngine {
        &self.var_engine
    }

    pub fn analytics(&self) -> &PortfolioAnalytics {
        &self.analytics
    }

    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    /// Assess portfolio-wide risk
    ///
    /// `portfolio` maps instruments to quantities, `prices` to current
    /// prices. `returns` is the portfolio's historical return series; when
    /// absent, distribution-based figures are reported as zero and a
    /// recommendation notes the limitation. `asset_returns` (one row per
    /// asset) additionally enables the correlation score.
    pub fn assess_portfolio_risk(
        &self,
        portfolio: &HashMap<String, f64>,
        prices: &HashMap<String, f64>,
        returns: Option<&[f64]>,
        asset_returns: Option<&Array2<f64>>,
    ) -> Result<RiskAssessment, RiskError> {
        let limits = self.controller.limits();

        let mut position_values = Vec::with_capacity(portfolio.len());
        for (instrument, &quantity) in portfolio {
            let price = prices.get(instrument).copied().ok_or_else(|| {
                RiskError::InvalidParameter {
                    name: "prices",
                    reason: format!("no price for {}", instrument),
                }
            })?;
            position_values.push(quantity.abs() * price);
        }

        let portfolio_value: f64 = position_values.iter().sum();
        if !(portfolio_value > 0.0) {
            return Err(RiskError::InvalidParameter {
                name: "portfolio",
                reason: "total portfolio value must be positive".to_string(),
            });
        }

        let concentration: f64 = position_values
            .iter()
            .map(|v| (v / portfolio_value).powi(2))
            .sum();
        let position_size_breached = position_values
            .iter()
            .any(|v| v / portfolio_value > limits.max_position_size);
        let daily_loss_breached =
            -self.controller.daily_pnl() / portfolio_value >= limits.max_daily_loss;

        let (value_at_risk, expected_shortfall, sharpe_ratio, max_drawdown) = match returns {
            Some(series) => (
                self.var_engine
                    .historical_var(series, portfolio_value, None)?,
                self.var_engine.expected_shortfall(
                    series,
                    portfolio_value,
                    &VarMethod::Historical,
                    None,
                )?,
                self.analytics.sharpe_ratio(series, true)?,
                self.analytics.drawdown_from_returns(series)?,
            ),
            None => (0.0, 0.0, 0.0, 0.0),
        };

        let average_correlation = match asset_returns {
            Some(matrix) => self.analytics.average_correlation(matrix)?,
            None => 0.0,
        };

        let mut recommendations = Vec::new();
        if daily_loss_breached {
            recommendations
                .push("daily loss limit breached; halt trading for the session".to_string());
        }
        if -value_at_risk / portfolio_value > limits.max_portfolio_var {
            recommendations.push(format!(
                "portfolio VaR exceeds the {:.0}% limit; reduce exposure",
                limits.max_portfolio_var * 100.0
            ));
        }
        if position_size_breached {
            recommendations.push(format!(
                "a position exceeds {:.0}% of portfolio value; trim it",
                limits.max_position_size * 100.0
            ));
        }
        if concentration > limits.max_concentration {
            recommendations.push("portfolio is concentrated; diversify holdings".to_string());
        }
        if average_correlation > limits.max_correlation {
            recommendations
                .push("holdings are highly correlated; diversification is weak".to_string());
        }
        match returns {
            Some(series) if self.var_engine.is_low_confidence(series.len()) => {
                recommendations.push(
                    "return history is short; VaR estimate is low-confidence".to_string(),
                );
            }
            None => {
                recommendations.push(
                    "no return history supplied; VaR and ratio figures are omitted".to_string(),
                );
            }
            _ => {}
        }

        let risk_level = derive_risk_level(
            daily_loss_breached,
            -value_at_risk / portfolio_value,
            max_drawdown,
            concentration,
            sharpe_ratio,
            &limits,
        );

        Ok(RiskAssessment {
            timestamp: Utc::now(),
            risk_level,
            confidence_level: self.var_engine.config().confidence_level,
            value_at_risk,
            expected_shortfall,
            sharpe_ratio,
            max_drawdown,
            concentration,
            average_correlation,
            position_size_breached,
            daily_loss_breached,
            recommendations,
            active_alerts: self.alerts.snapshot(),
        })
    }

    /// Size a single position with the given method
    ///
    /// Only single-position methods (Kelly, fixed-fractional) are accepted
    /// here; allocation methods go through
    /// [`RiskOrchestrator::portfolio_allocation`]. The orchestrator's own
    /// `max_position_size` limit is applied as the final clamp.
    pub fn calculate_optimal_position_size(
        &self,
        instrument: &str,
        entry_price: f64,
        portfolio_value: f64,
        method: &SizingMethod,
    ) -> Result<SizingResult, RiskError> {
        if !(entry_price > 0.0) || !entry_price.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "entry_price",
                reason: format!("must be positive and finite, got {}", entry_price),
            });
        }

        let (fraction, kelly) = match method {
            SizingMethod::Kelly {
                win_rate,
                avg_win_return,
                avg_loss_return,
            } => {
                let sizing = self.sizer.kelly_criterion(
                    *win_rate,
                    *avg_win_return,
                    *avg_loss_return,
                    portfolio_value,
                )?;
                (sizing.position_size, Some(sizing))
            }
            SizingMethod::FixedFractional {
                risk_per_trade,
                volatility,
            } => (
                self.sizer
                    .fixed_fractional(portfolio_value, *risk_per_trade, *volatility)?,
                None,
            ),
            _ => {
                return Err(RiskError::InvalidParameter {
                    name: "method",
                    reason: "allocation methods require portfolio_allocation".to_string(),
                })
            }
        };

        let fraction = fraction.min(self.controller.limits().max_position_size);
        let position_value = fraction * portfolio_value;

        Ok(SizingResult {
            instrument: instrument.to_string(),
            fraction,
            position_value,
            quantity: position_value / entry_price,
            kelly,
        })
    }

    /// Produce a full portfolio allocation with the given method
    pub fn portfolio_allocation(
        &self,
        method: &SizingMethod,
        assets: &[String],
        asset_returns: &Array2<f64>,
    ) -> Result<HashMap<String, f64>, RiskError> {
        self.sizer.allocate(method, assets, asset_returns)
    }

    /// Arm stop-loss / take-profit / trailing-stop handling for a position
    pub fn setup_risk_management(
        &self,
        instrument: &str,
        entry_price: f64,
        quantity: f64,
        stop_loss_pct: Option<f64>,
        take_profit_pct: Option<f64>,
        trailing_stop: bool,
    ) -> Result<bool, RiskError> {
        self.controller.arm_position(
            instrument,
            entry_price,
            quantity,
            stop_loss_pct,
            take_profit_pct,
            trailing_stop,
        )?;
        Ok(true)
    }

    /// Feed a batch of price ticks through the controller
    pub fn update_position_prices(
        &self,
        prices: &HashMap<String, f64>,
    ) -> Result<HashMap<String, PriceTriggers>, RiskError> {
        self.controller.update_prices(prices)
    }

    /// Full analytics profile for a portfolio return series
    pub fn get_portfolio_risk_profile(
        &self,
        portfolio_value: f64,
        returns: &[f64],
        asset_returns: Option<&Array2<f64>>,
    ) -> Result<PortfolioRiskProfile, RiskError> {
        let stats = self.analytics.portfolio_stats(returns, None)?;
        let value_at_risk = self
            .var_engine
            .historical_var(returns, portfolio_value, None)?;
        let expected_shortfall = self.var_engine.expected_shortfall(
            returns,
            portfolio_value,
            &VarMethod::Historical,
            None,
        )?;

        let average_correlation = match asset_returns {
            Some(matrix) => Some(self.analytics.average_correlation(matrix)?),
            None => None,
        };

        Ok(PortfolioRiskProfile {
            timestamp: Utc::now(),
            stats,
            value_at_risk,
            expected_shortfall,
            average_correlation,
            concentration: self.controller.herfindahl_index(),
        })
    }

    /// Start the background monitoring loop
    ///
    /// Runs daily-loss and concentration checks every `check_interval`.
    /// `portfolio_value` is the denominator for the daily-loss ratio. A
    /// failed iteration is recorded as a warning alert and the loop
    /// continues. Must be called from within a tokio runtime.
    pub fn start_monitoring(&self, portfolio_value: f64) -> Result<(), RiskError> {
        if !(portfolio_value > 0.0) || !portfolio_value.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "portfolio_value",
                reason: format!("must be positive and finite, got {}", portfolio_value),
            });
        }

        let mut guard = self.shutdown.lock();
        if guard.is_some() {
            return Err(RiskError::AlreadyRunning);
        }

        let (tx, mut rx) = watch::channel(false);
        *guard = Some(tx);

        let controller = self.controller.clone();
        let alerts = self.alerts.clone();
        let interval = self.monitor.check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!(interval_ms = interval.as_millis() as u64, "risk monitoring started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = monitoring_iteration(&controller, portfolio_value) {
                            warn!(error = %e, "monitoring iteration failed");
                            alerts.push(Alert::new(
                                AlertSeverity::Warning,
                                format!("monitoring iteration failed: {}", e),
                                json!({ "error": e.to_string() }),
                            ));
                        }
                    }
                    changed = rx.changed() => {
                        // A dropped sender means the orchestrator is gone;
                        // treat it the same as an explicit stop.
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("risk monitoring stopped");
        });

        Ok(())
    }

    /// Stop the monitoring loop; it exits within one check interval
    pub fn stop_monitoring(&self) -> Result<(), RiskError> {
        match self.shutdown.lock().take() {
            Some(tx) => {
                let _ = tx.send(true);
                Ok(())
            }
            None => Err(RiskError::NotRunning),
        }
    }

    /// Whether the monitoring loop is running
    pub fn is_monitoring(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    /// Current alerts; `clear` drains the log atomically
    pub fn get_alerts(&self, clear: bool) -> Vec<Alert> {
        if clear {
            self.alerts.drain()
        } else {
            self.alerts.snapshot()
        }
    }
}

/// One pass of the portfolio-level limit checks
fn monitoring_iteration(
    controller: &RiskController,
    portfolio_value: f64,
) -> anyhow::Result<()> {
    controller.check_concentration();
    controller.check_daily_loss_limit(portfolio_value)?;
    Ok(())
}

/// Map quantitative figures onto a qualitative risk level
fn derive_risk_level(
    daily_loss_breached: bool,
    var_fraction: f64,
    max_drawdown: f64,
    concentration: f64,
    sharpe_ratio: f64,
    limits: &RiskLimits,
) -> RiskLevel {
    if daily_loss_breached || var_fraction > limits.max_portfolio_var {
        return RiskLevel::Critical;
    }
    if max_drawdown > 0.20 || concentration > limits.max_concentration {
        return RiskLevel::High;
    }
    if max_drawdown > 0.10 || (sharpe_ratio.is_finite() && sharpe_ratio < 0.5) {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn orchestrator() -> RiskOrchestrator {
        RiskOrchestrator::with_defaults().unwrap()
    }

    fn fast_orchestrator() -> RiskOrchestrator {
        let monitor = MonitorConfig {
            check_interval: Duration::from_millis(10),
            alert_history_size: 100,
        };
        RiskOrchestrator::new(
            RiskLimits::default(),
            VarConfig::default(),
            SizerConfig::default(),
            monitor,
        )
        .unwrap()
    }

    fn sample_returns() -> Vec<f64> {
        (0..120)
            .map(|i| {
                let base = ((i * 7) % 13) as f64 / 13.0 - 0.5;
                base * 0.02 + 0.0005
            })
            .collect()
    }

    #[test]
    fn test_assessment_fully_populated() {
        let o = orchestrator();

        let mut portfolio = HashMap::new();
        portfolio.insert("BTC".to_string(), 2.0);
        portfolio.insert("ETH".to_string(), 30.0);

        let mut prices = HashMap::new();
        prices.insert("BTC".to_string(), 50_000.0);
        prices.insert("ETH".to_string(), 2_000.0);

        let returns = sample_returns();
        let assessment = o
            .assess_portfolio_risk(&portfolio, &prices, Some(&returns), None)
            .unwrap();

        assert!(assessment.value_at_risk < 0.0);
        assert!(assessment.expected_shortfall <= assessment.value_at_risk);
        assert!(assessment.concentration > 0.0 && assessment.concentration <= 1.0);
        assert!(!assessment.daily_loss_breached);

        // BTC is ~62% of value, well past the 10% position limit.
        assert!(assessment.position_size_breached);
        assert!(!assessment.recommendations.is_empty());
    }

    #[test]
    fn test_assessment_without_returns() {
        let o = orchestrator();

        let mut portfolio = HashMap::new();
        portfolio.insert("BTC".to_string(), 1.0);
        let mut prices = HashMap::new();
        prices.insert("BTC".to_string(), 50_000.0);

        let assessment = o
            .assess_portfolio_risk(&portfolio, &prices, None, None)
            .unwrap();

        assert_eq!(assessment.value_at_risk, 0.0);
        assert!(assessment
            .recommendations
            .iter()
            .any(|r| r.contains("no return history")));
    }

    #[test]
    fn test_assessment_missing_price_rejected() {
        let o = orchestrator();

        let mut portfolio = HashMap::new();
        portfolio.insert("BTC".to_string(), 1.0);
        let prices = HashMap::new();

        assert!(o
            .assess_portfolio_risk(&portfolio, &prices, None, None)
            .is_err());
    }

    #[test]
    fn test_position_sizing_applies_limit_clamp() {
        // Orchestrator limit (5%) is tighter than the sizer's own cap (10%).
        let mut limits = RiskLimits::default();
        limits.max_position_size = 0.05;
        let o = RiskOrchestrator::new(
            limits,
            VarConfig::default(),
            SizerConfig::default(),
            MonitorConfig::default(),
        )
        .unwrap();

        let result = o
            .calculate_optimal_position_size(
                "BTC",
                50_000.0,
                100_000.0,
                &SizingMethod::Kelly {
                    win_rate: 0.6,
                    avg_win_return: 0.08,
                    avg_loss_return: -0.04,
                },
            )
            .unwrap();

        assert!((result.fraction - 0.05).abs() < 1e-12);
        assert!((result.position_value - 5_000.0).abs() < 1e-9);
        assert!((result.quantity - 0.1).abs() < 1e-12);
        assert!(result.kelly.is_some());
    }

    #[test]
    fn test_allocation_method_rejected_for_single_sizing() {
        let o = orchestrator();
        let result = o.calculate_optimal_position_size(
            "BTC",
            50_000.0,
            100_000.0,
            &SizingMethod::MinimumVariance,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_setup_and_tick_through_facade() {
        let o = orchestrator();
        assert!(o
            .setup_risk_management("BTC", 45_000.0, 1.0, Some(0.05), None, false)
            .unwrap());

        let mut prices = HashMap::new();
        prices.insert("BTC".to_string(), 42_000.0);

        let triggers = o.update_position_prices(&prices).unwrap();
        assert!(triggers["BTC"].stop_loss);

        let alerts = o.get_alerts(true);
        assert_eq!(alerts.len(), 1);
        assert!(o.get_alerts(false).is_empty());
    }

    #[test]
    fn test_risk_profile() {
        let o = orchestrator();
        let returns = sample_returns();

        let profile = o
            .get_portfolio_risk_profile(100_000.0, &returns, None)
            .unwrap();
        assert!(profile.value_at_risk < 0.0);
        assert!(profile.expected_shortfall <= profile.value_at_risk);
        assert!(profile.average_correlation.is_none());
        assert!(profile.stats.annualized_volatility > 0.0);
    }

    #[tokio::test]
    async fn test_monitoring_lifecycle() {
        let o = fast_orchestrator();

        assert!(!o.is_monitoring());
        o.start_monitoring(100_000.0).unwrap();
        assert!(o.is_monitoring());

        assert!(matches!(
            o.start_monitoring(100_000.0),
            Err(RiskError::AlreadyRunning)
        ));

        o.stop_monitoring().unwrap();
        assert!(!o.is_monitoring());
        assert!(matches!(o.stop_monitoring(), Err(RiskError::NotRunning)));
    }

    #[tokio::test]
    async fn test_monitoring_triggers_emergency_stop() {
        let o = fast_orchestrator();

        // Realize a 6% loss against a 100k portfolio, then let the loop run.
        o.setup_risk_management("A", 100.0, 100.0, None, None, false)
            .unwrap();
        o.controller().arm_position("C", 1_000.0, 10.0, None, None, false)
            .unwrap();
        o.controller().close_position("C", 400.0).unwrap();

        o.start_monitoring(100_000.0).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        o.stop_monitoring().unwrap();

        assert_eq!(o.controller().open_position_count(), 0);
        let alerts = o.get_alerts(false);
        assert!(alerts
            .iter()
            .any(|a| a.severity == AlertSeverity::Emergency));
    }

    #[tokio::test]
    async fn test_monitoring_exits_when_orchestrator_dropped() {
        let o = fast_orchestrator();
        o.start_monitoring(100_000.0).unwrap();

        // The spawned task holds the only other Arc on the controller.
        let weak = Arc::downgrade(o.controller());
        drop(o);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            weak.upgrade().is_none(),
            "monitoring task still holds the controller after drop"
        );
    }

    #[tokio::test]
    async fn test_monitoring_stops_within_interval() {
        let o = fast_orchestrator();
        o.start_monitoring(100_000.0).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        o.stop_monitoring().unwrap();
        let drained = o.get_alerts(true);

        // After one full interval no new alerts can arrive.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(o.get_alerts(false).is_empty(), "drained {} alerts", drained.len());
    }
}
