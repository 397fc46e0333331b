//! Configuration for the risk management engine
//!
//! This module provides the configuration structures for the risk limits,
//! VaR engine, position sizer and monitoring loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RiskError;

/// Hard limits enforced by the risk controller
///
/// All fields are fractions of portfolio value. The structure is immutable
/// once handed to the controller; it may be replaced wholesale via
/// [`crate::RiskController::replace_limits`] but never mutated field-by-field
/// while positions are open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum daily realized loss as a fraction of portfolio value
    pub max_daily_loss: f64,

    /// Maximum single-position fraction of portfolio value
    pub max_position_size: f64,

    /// Maximum portfolio VaR as a fraction of portfolio value
    pub max_portfolio_var: f64,

    /// Maximum acceptable average pairwise correlation
    pub max_correlation: f64,

    /// Maximum single-asset concentration (Herfindahl share)
    pub max_concentration: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss: 0.05,     // 5%
            max_position_size: 0.10,  // 10%
            max_portfolio_var: 0.15,  // 15%
            max_correlation: 0.70,
            max_concentration: 0.25,
        }
    }
}

impl RiskLimits {
    /// Validate that every limit is a fraction in (0, 1]
    pub fn validate(&self) -> Result<(), RiskError> {
        let fields = [
            ("max_daily_loss", self.max_daily_loss),
            ("max_position_size", self.max_position_size),
            ("max_portfolio_var", self.max_portfolio_var),
            ("max_correlation", self.max_correlation),
            ("max_concentration", self.max_concentration),
        ];

        for (name, value) in fields {
            if !(value > 0.0 && value <= 1.0) {
                return Err(RiskError::InvalidParameter {
                    name,
                    reason: format!("must be in (0, 1], got {}", value),
                });
            }
        }

        Ok(())
    }
}

/// Configuration for the VaR engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    /// Confidence level for VaR and Expected Shortfall (e.g. 0.95)
    pub confidence_level: f64,

    /// Time horizon in periods
    pub time_horizon: u32,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            time_horizon: 1,
        }
    }
}

impl VarConfig {
    /// Validate confidence level and horizon
    pub fn validate(&self) -> Result<(), RiskError> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(RiskError::InvalidParameter {
                name: "confidence_level",
                reason: format!("must be in (0, 1), got {}", self.confidence_level),
            });
        }

        if self.time_horizon == 0 {
            return Err(RiskError::InvalidParameter {
                name: "time_horizon",
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration for the position sizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizerConfig {
    /// Default risk per trade as a fraction of portfolio value
    pub max_portfolio_risk: f64,

    /// Maximum fraction any single position may take
    pub max_single_position: f64,

    /// Divisor applied to the raw Kelly fraction (2.0 = half Kelly)
    pub kelly_divisor: f64,

    /// Per-asset weight bounds for allocation methods
    pub weight_bounds: (f64, f64),
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            max_portfolio_risk: 0.02, // 2%
            max_single_position: 0.10, // 10%
            kelly_divisor: 2.0,
            weight_bounds: (0.0, 0.20),
        }
    }
}

impl SizerConfig {
    /// Validate sizing parameters
    pub fn validate(&self) -> Result<(), RiskError> {
        if !(self.max_portfolio_risk > 0.0 && self.max_portfolio_risk <= 1.0) {
            return Err(RiskError::InvalidParameter {
                name: "max_portfolio_risk",
                reason: format!("must be in (0, 1], got {}", self.max_portfolio_risk),
            });
        }

        if !(self.max_single_position > 0.0 && self.max_single_position <= 1.0) {
            return Err(RiskError::InvalidParameter {
                name: "max_single_position",
                reason: format!("must be in (0, 1], got {}", self.max_single_position),
            });
        }

        if self.kelly_divisor < 1.0 {
            return Err(RiskError::InvalidParameter {
                name: "kelly_divisor",
                reason: format!("must be >= 1, got {}", self.kelly_divisor),
            });
        }

        let (lo, hi) = self.weight_bounds;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
            return Err(RiskError::InvalidParameter {
                name: "weight_bounds",
                reason: format!("must satisfy 0 <= lo < hi <= 1, got ({}, {})", lo, hi),
            });
        }

        Ok(())
    }
}

/// Configuration for the monitoring loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between portfolio-level limit checks
    pub check_interval: Duration,

    /// Maximum number of alerts retained in memory
    pub alert_history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            alert_history_size: 1000,
        }
    }
}
