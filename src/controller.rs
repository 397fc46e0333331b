//! Stateful risk controller
//!
//! Tracks open positions, evaluates stop-loss, take-profit and trailing-stop
//! triggers on each price tick, enforces daily-loss and concentration limits,
//! raises alerts and executes emergency liquidation.
//!
//! The position table is owned exclusively by the controller instance. A
//! closed position is removed from the table immediately, so feeding the
//! same trigger price twice is a lookup miss on the second tick, never a
//! double-fired alert.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertLog, AlertSeverity};
use crate::config::RiskLimits;
use crate::RiskError;

/// An open position tracked by the controller
///
/// `quantity` is signed: positive is long, negative is short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,

    /// Stop-loss price level, if armed
    pub stop_loss: Option<f64>,

    /// Take-profit price level, if armed
    pub take_profit: Option<f64>,

    /// Whether the stop ratchets with favorable price movement
    pub trailing_stop: bool,

    /// Trail distance as a fraction of the high-water price
    pub trailing_pct: Option<f64>,

    /// Most favorable price observed since entry
    pub highest_price: f64,
    pub lowest_price: f64,

    pub current_price: f64,
    pub unrealized_pnl: f64,

    /// Worst peak-to-current adverse move observed, as a positive fraction
    pub max_drawdown: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    /// Market value of the position at the current price
    pub fn market_value(&self) -> f64 {
        self.quantity.abs() * self.current_price
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    Manual,
    Emergency,
}

/// Record of a closed position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub instrument: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub realized_pnl: f64,
    pub reason: CloseReason,

    /// Free-form context, e.g. the emergency-stop reason
    pub detail: Option<String>,

    pub closed_at: DateTime<Utc>,
}

/// Trigger outcome of a single price tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTriggers {
    pub stop_loss: bool,
    pub take_profit: bool,

    /// The trailing stop was raised on this tick (position stays open)
    pub trailing_stop: bool,
}

/// Stateful risk controller
pub struct RiskController {
    limits: RwLock<RiskLimits>,
    positions: DashMap<String, Position>,
    closed: RwLock<Vec<ClosedPosition>>,
    daily_pnl: RwLock<f64>,
    alerts: Arc<AlertLog>,
}

impl RiskController {
    pub fn new(limits: RiskLimits, alerts: Arc<AlertLog>) -> Result<Self, RiskError> {
        limits.validate()?;
        Ok(Self {
            limits: RwLock::new(limits),
            positions: DashMap::new(),
            closed: RwLock::new(Vec::new()),
            daily_pnl: RwLock::new(0.0),
            alerts,
        })
    }

    /// Arm risk management for an instrument
    ///
    /// `stop_loss_pct` and `take_profit_pct` are distances from the entry
    /// price. A trailing stop uses `stop_loss_pct` as its trail distance and
    /// is only supported for long positions.
    pub fn arm_position(
        &self,
        instrument: &str,
        entry_price: f64,
        quantity: f64,
        stop_loss_pct: Option<f64>,
        take_profit_pct: Option<f64>,
        trailing_stop: bool,
    ) -> Result<(), RiskError> {
        if !(entry_price > 0.0) || !entry_price.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "entry_price",
                reason: format!("must be positive and finite, got {}", entry_price),
            });
        }
        if quantity == 0.0 || !quantity.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "quantity",
                reason: format!("must be non-zero and finite, got {}", quantity),
            });
        }
        for (name, pct) in [("stop_loss_pct", stop_loss_pct), ("take_profit_pct", take_profit_pct)] {
            if let Some(p) = pct {
                if !(p > 0.0 && p < 1.0) {
                    return Err(RiskError::InvalidParameter {
                        name,
                        reason: format!("must be in (0, 1), got {}", p),
                    });
                }
            }
        }

        let long = quantity > 0.0;
        if trailing_stop {
            if stop_loss_pct.is_none() {
                return Err(RiskError::InvalidParameter {
                    name: "trailing_stop",
                    reason: "requires stop_loss_pct as the trail distance".to_string(),
                });
            }
            if !long {
                return Err(RiskError::InvalidParameter {
                    name: "trailing_stop",
                    reason: "not supported for short positions".to_string(),
                });
            }
        }
        if self.positions.contains_key(instrument) {
            return Err(RiskError::InvalidParameter {
                name: "instrument",
                reason: format!("{} already has risk management armed", instrument),
            });
        }

        let stop_loss = stop_loss_pct.map(|p| {
            if long {
                entry_price * (1.0 - p)
            } else {
                entry_price * (1.0 + p)
            }
        });
        let take_profit = take_profit_pct.map(|p| {
            if long {
                entry_price * (1.0 + p)
            } else {
                entry_price * (1.0 - p)
            }
        });

        let position = Position {
            instrument: instrument.to_string(),
            entry_price,
            quantity,
            entry_time: Utc::now(),
            stop_loss,
            take_profit,
            trailing_stop,
            trailing_pct: if trailing_stop { stop_loss_pct } else { None },
            highest_price: entry_price,
            lowest_price: entry_price,
            current_price: entry_price,
            unrealized_pnl: 0.0,
            max_drawdown: 0.0,
        };

        info!(
            instrument,
            entry_price,
            quantity,
            ?stop_loss,
            ?take_profit,
            trailing_stop,
            "risk management armed"
        );
        self.positions.insert(instrument.to_string(), position);
        Ok(())
    }

    /// Process a price tick for one instrument
    ///
    /// Returns the triggers that fired. An unknown instrument is a no-op
    /// (the position may have been closed by an earlier tick), not an error.
    pub fn update_price(&self, instrument: &str, price: f64) -> Result<PriceTriggers, RiskError> {
        if !(price > 0.0) || !price.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "price",
                reason: format!("must be positive and finite, got {}", price),
            });
        }

        let mut triggers = PriceTriggers::default();

        // Decide inside the entry guard, mutate the table after dropping it.
        let close = match self.positions.get_mut(instrument) {
            None => {
                debug!(instrument, "price tick for untracked instrument ignored");
                return Ok(triggers);
            }
            Some(mut position) => {
                let p = position.value_mut();

                if price > p.highest_price {
                    p.highest_price = price;

                    // Trailing stop ratchets up with the new high, never down.
                    if p.trailing_stop {
                        if let Some(trail) = p.trailing_pct {
                            let candidate = price * (1.0 - trail);
                            if p.stop_loss.map_or(true, |s| candidate > s) {
                                p.stop_loss = Some(candidate);
                                triggers.trailing_stop = true;
                            }
                        }
                    }
                }
                if price < p.lowest_price {
                    p.lowest_price = price;
                }

                p.current_price = price;
                p.unrealized_pnl = (price - p.entry_price) * p.quantity;
                let adverse = if p.is_long() {
                    (p.highest_price - price) / p.highest_price
                } else {
                    (price - p.lowest_price) / p.lowest_price
                };
                p.max_drawdown = p.max_drawdown.max(adverse);

                // Stop-loss takes priority over take-profit.
                if stop_breached(p, price) {
                    triggers.stop_loss = true;
                    Some(CloseReason::StopLoss)
                } else if profit_reached(p, price) {
                    triggers.take_profit = true;
                    Some(CloseReason::TakeProfit)
                } else {
                    None
                }
            }
        };

        if let Some(reason) = close {
            let closed = self.remove_and_record(instrument, price, reason, None)?;

            match reason {
                CloseReason::StopLoss => self.alerts.push(Alert::new(
                    AlertSeverity::Warning,
                    format!("stop-loss triggered for {}", instrument),
                    json!({
                        "instrument": instrument,
                        "exit_price": price,
                        "realized_pnl": closed.realized_pnl,
                    }),
                )),
                CloseReason::TakeProfit => self.alerts.push(Alert::new(
                    AlertSeverity::Info,
                    format!("take-profit triggered for {}", instrument),
                    json!({
                        "instrument": instrument,
                        "exit_price": price,
                        "realized_pnl": closed.realized_pnl,
                    }),
                )),
                _ => {}
            }
        }

        Ok(triggers)
    }

    /// Process a batch of price ticks
    ///
    /// Untracked instruments are skipped; the response contains one entry
    /// per instrument that was tracked when its tick arrived.
    pub fn update_prices(
        &self,
        prices: &HashMap<String, f64>,
    ) -> Result<HashMap<String, PriceTriggers>, RiskError> {
        let mut results = HashMap::new();
        for (instrument, &price) in prices {
            if !self.positions.contains_key(instrument) {
                continue;
            }
            results.insert(instrument.clone(), self.update_price(instrument, price)?);
        }
        Ok(results)
    }

    /// Manually close a position at the given price
    pub fn close_position(
        &self,
        instrument: &str,
        exit_price: f64,
    ) -> Result<ClosedPosition, RiskError> {
        if !(exit_price > 0.0) || !exit_price.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "exit_price",
                reason: format!("must be positive and finite, got {}", exit_price),
            });
        }
        self.remove_and_record(instrument, exit_price, CloseReason::Manual, None)
    }

    /// Force-close every tracked position at its last observed price
    ///
    /// Each closure carries the same `reason` string; a single emergency
    /// alert summarizes the liquidation.
    pub fn emergency_stop(&self, reason: &str) -> Vec<ClosedPosition> {
        let instruments: Vec<String> = self
            .positions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            let exit_price = match self.positions.get(&instrument) {
                Some(p) => p.current_price,
                None => continue,
            };
            match self.remove_and_record(
                &instrument,
                exit_price,
                CloseReason::Emergency,
                Some(reason),
            ) {
                Ok(c) => closed.push(c),
                Err(_) => continue,
            }
        }

        let total_realized: f64 = closed.iter().map(|c| c.realized_pnl).sum();
        self.alerts.push(Alert::new(
            AlertSeverity::Emergency,
            format!("emergency stop: {}", reason),
            json!({
                "positions_closed": closed.len(),
                "realized_pnl": total_realized,
                "reason": reason,
            }),
        ));

        closed
    }

    /// Check realized daily loss against the configured limit
    ///
    /// A breach emits a critical alert and triggers an emergency stop.
    /// Returns whether the limit was breached.
    pub fn check_daily_loss_limit(&self, portfolio_value: f64) -> Result<bool, RiskError> {
        if !(portfolio_value > 0.0) || !portfolio_value.is_finite() {
            return Err(RiskError::InvalidParameter {
                name: "portfolio_value",
                reason: format!("must be positive and finite, got {}", portfolio_value),
            });
        }

        let pnl = *self.daily_pnl.read();
        let max_daily_loss = self.limits.read().max_daily_loss;
        let loss_fraction = -pnl / portfolio_value;

        if loss_fraction >= max_daily_loss {
            self.alerts.push(Alert::new(
                AlertSeverity::Critical,
                format!(
                    "daily loss limit breached: {:.2}% of portfolio (limit {:.2}%)",
                    loss_fraction * 100.0,
                    max_daily_loss * 100.0
                ),
                json!({
                    "daily_pnl": pnl,
                    "portfolio_value": portfolio_value,
                    "loss_fraction": loss_fraction,
                    "limit": max_daily_loss,
                }),
            ));
            self.emergency_stop("daily loss limit breached");
            return Ok(true);
        }

        Ok(false)
    }

    /// Check position concentration against the configured limit
    ///
    /// A breach emits a warning alert but never closes positions. Returns
    /// the current Herfindahl index.
    pub fn check_concentration(&self) -> f64 {
        let herfindahl = self.herfindahl_index();
        let max_concentration = self.limits.read().max_concentration;

        if herfindahl > max_concentration {
            self.alerts.push(Alert::new(
                AlertSeverity::Warning,
                format!(
                    "concentration {:.3} exceeds limit {:.3}",
                    herfindahl, max_concentration
                ),
                json!({
                    "herfindahl": herfindahl,
                    "limit": max_concentration,
                    "open_positions": self.positions.len(),
                }),
            ));
        }

        herfindahl
    }

    /// Herfindahl index over current position values
    ///
    /// 1.0 for a single position, 1/N for N equal positions, 0.0 with no
    /// open positions.
    pub fn herfindahl_index(&self) -> f64 {
        let values: Vec<f64> = self.positions.iter().map(|p| p.market_value()).collect();
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        values.iter().map(|v| (v / total).powi(2)).sum()
    }

    /// Realized P&L since the last reset
    pub fn daily_pnl(&self) -> f64 {
        *self.daily_pnl.read()
    }

    /// Reset the daily P&L accumulator (called at the start of a session)
    pub fn reset_daily_pnl(&self) {
        *self.daily_pnl.write() = 0.0;
        info!("daily P&L reset");
    }

    /// Snapshot of all open positions
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.iter().map(|p| p.value().clone()).collect()
    }

    /// Snapshot of one open position
    pub fn position(&self, instrument: &str) -> Option<Position> {
        self.positions.get(instrument).map(|p| p.value().clone())
    }

    /// Closed-position history for this session
    pub fn closed_positions(&self) -> Vec<ClosedPosition> {
        self.closed.read().clone()
    }

    /// Number of open positions
    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Current limits
    pub fn limits(&self) -> RiskLimits {
        self.limits.read().clone()
    }

    /// Replace the limit set wholesale
    pub fn replace_limits(&self, limits: RiskLimits) -> Result<(), RiskError> {
        limits.validate()?;
        *self.limits.write() = limits;
        Ok(())
    }

    fn remove_and_record(
        &self,
        instrument: &str,
        exit_price: f64,
        reason: CloseReason,
        detail: Option<&str>,
    ) -> Result<ClosedPosition, RiskError> {
        let (_, position) = self
            .positions
            .remove(instrument)
            .ok_or_else(|| RiskError::UnknownInstrument(instrument.to_string()))?;

        let realized_pnl = (exit_price - position.entry_price) * position.quantity;
        let closed = ClosedPosition {
            instrument: position.instrument,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            realized_pnl,
            reason,
            detail: detail.map(str::to_string),
            closed_at: Utc::now(),
        };

        *self.daily_pnl.write() += realized_pnl;
        self.closed.write().push(closed.clone());

        if realized_pnl < 0.0 {
            warn!(
                instrument,
                exit_price, realized_pnl, ?reason, "position closed at a loss"
            );
        } else {
            info!(instrument, exit_price, realized_pnl, ?reason, "position closed");
        }

        Ok(closed)
    }
}

fn stop_breached(p: &Position, price: f64) -> bool {
    match p.stop_loss {
        Some(stop) if p.is_long() => price <= stop,
        Some(stop) => price >= stop,
        None => false,
    }
}

fn profit_reached(p: &Position, price: f64) -> bool {
    match p.take_profit {
        Some(tp) if p.is_long() => price >= tp,
        Some(tp) => price <= tp,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (RiskController, Arc<AlertLog>) {
        let alerts = Arc::new(AlertLog::new(100));
        let controller = RiskController::new(RiskLimits::default(), alerts.clone()).unwrap();
        (controller, alerts)
    }

    #[test]
    fn test_stop_loss_fires_once() {
        let (c, alerts) = controller();
        c.arm_position("BTC", 45_000.0, 1.0, Some(0.05), None, false)
            .unwrap();

        // Stop sits at 42750; 42000 breaches it.
        let first = c.update_price("BTC", 42_000.0).unwrap();
        assert!(first.stop_loss);
        assert_eq!(c.open_position_count(), 0);
        assert_eq!(alerts.len(), 1);

        // Same price again: the position is gone, no second alert.
        let second = c.update_price("BTC", 42_000.0).unwrap();
        assert_eq!(second, PriceTriggers::default());
        assert_eq!(alerts.len(), 1);

        let closed = c.closed_positions();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, CloseReason::StopLoss);
        assert!((closed[0].realized_pnl - (-3_000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_take_profit_long() {
        let (c, alerts) = controller();
        c.arm_position("ETH", 2_000.0, 10.0, Some(0.05), Some(0.10), false)
            .unwrap();

        let triggers = c.update_price("ETH", 2_200.0).unwrap();
        assert!(triggers.take_profit);
        assert!(!triggers.stop_loss);
        assert_eq!(alerts.snapshot()[0].severity, AlertSeverity::Info);
        assert!((c.daily_pnl() - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_stop_ratchets_and_triggers() {
        let (c, _) = controller();
        c.arm_position("SOL", 100.0, 50.0, Some(0.10), None, true)
            .unwrap();

        // Expected stop levels: 90, 99, 99 (no new high at 105), 108.
        let t1 = c.update_price("SOL", 100.0).unwrap();
        assert!(!t1.trailing_stop);
        assert_eq!(c.position("SOL").unwrap().stop_loss, Some(90.0));

        let t2 = c.update_price("SOL", 110.0).unwrap();
        assert!(t2.trailing_stop);
        assert!((c.position("SOL").unwrap().stop_loss.unwrap() - 99.0).abs() < 1e-9);

        let t3 = c.update_price("SOL", 105.0).unwrap();
        assert!(!t3.trailing_stop);
        assert!((c.position("SOL").unwrap().stop_loss.unwrap() - 99.0).abs() < 1e-9);

        let t4 = c.update_price("SOL", 120.0).unwrap();
        assert!(t4.trailing_stop);
        assert!((c.position("SOL").unwrap().stop_loss.unwrap() - 108.0).abs() < 1e-9);

        // 90 < 108: the ratcheted stop fires.
        let t5 = c.update_price("SOL", 90.0).unwrap();
        assert!(t5.stop_loss);
        assert_eq!(c.open_position_count(), 0);
    }

    #[test]
    fn test_short_position_triggers_invert() {
        let (c, _) = controller();
        c.arm_position("BTC", 50_000.0, -1.0, Some(0.05), Some(0.10), false)
            .unwrap();

        let p = c.position("BTC").unwrap();
        assert_eq!(p.stop_loss, Some(52_500.0));
        assert_eq!(p.take_profit, Some(45_000.0));

        // Price rising against a short breaches the stop.
        let triggers = c.update_price("BTC", 53_000.0).unwrap();
        assert!(triggers.stop_loss);
        assert!((c.closed_positions()[0].realized_pnl - (-3_000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_rejected_for_shorts() {
        let (c, _) = controller();
        let result = c.arm_position("BTC", 50_000.0, -1.0, Some(0.05), None, true);
        assert!(result.is_err());

        let result = c.arm_position("BTC", 50_000.0, 1.0, None, None, true);
        assert!(result.is_err());
    }

    #[test]
    fn test_gap_through_stop_closes_at_tick_price() {
        let (c, _) = controller();
        c.arm_position("DOGE", 100.0, 1000.0, Some(0.05), Some(0.10), false)
            .unwrap();

        // Price gaps far below the 95 stop; the close uses the actual tick
        // price, not the stop level.
        let triggers = c.update_price("DOGE", 50.0).unwrap();
        assert!(triggers.stop_loss);
        assert!(!triggers.take_profit);

        let closed = &c.closed_positions()[0];
        assert_eq!(closed.exit_price, 50.0);
        assert!((closed.realized_pnl - (-50_000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_batch_update_skips_untracked() {
        let (c, _) = controller();
        c.arm_position("A", 100.0, 1.0, Some(0.05), None, false)
            .unwrap();

        let mut prices = HashMap::new();
        prices.insert("A".to_string(), 101.0);
        prices.insert("B".to_string(), 50.0);

        let results = c.update_prices(&prices).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("A"));
    }

    #[test]
    fn test_herfindahl_bounds() {
        let (c, _) = controller();
        assert_eq!(c.herfindahl_index(), 0.0);

        c.arm_position("A", 100.0, 10.0, None, None, false).unwrap();
        assert!((c.herfindahl_index() - 1.0).abs() < 1e-12);

        c.arm_position("B", 100.0, 10.0, None, None, false).unwrap();
        c.arm_position("C", 100.0, 10.0, None, None, false).unwrap();
        c.arm_position("D", 100.0, 10.0, None, None, false).unwrap();

        // 4 equal positions: exactly 1/4.
        assert!((c.herfindahl_index() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_concentration_alert() {
        let (c, alerts) = controller();
        c.arm_position("A", 100.0, 10.0, None, None, false).unwrap();

        // Single position: Herfindahl 1.0 > max_concentration 0.25.
        let h = c.check_concentration();
        assert!((h - 1.0).abs() < 1e-12);
        assert_eq!(alerts.max_severity(), Some(AlertSeverity::Warning));

        // Warning only: the position stays open.
        assert_eq!(c.open_position_count(), 1);
    }

    #[test]
    fn test_daily_loss_limit_triggers_emergency_stop() {
        let (c, alerts) = controller();
        c.arm_position("A", 100.0, 100.0, None, None, false).unwrap();
        c.arm_position("B", 200.0, 50.0, None, None, false).unwrap();

        // Realize a 6% loss on a 100k portfolio.
        c.arm_position("C", 1_000.0, 10.0, None, None, false).unwrap();
        c.close_position("C", 400.0).unwrap();
        assert!((c.daily_pnl() - (-6_000.0)).abs() < 1e-9);

        let breached = c.check_daily_loss_limit(100_000.0).unwrap();
        assert!(breached);

        // Every remaining position was force-closed.
        assert_eq!(c.open_position_count(), 0);
        assert_eq!(alerts.max_severity(), Some(AlertSeverity::Emergency));

        let emergency: Vec<_> = c
            .closed_positions()
            .into_iter()
            .filter(|p| p.reason == CloseReason::Emergency)
            .collect();
        assert_eq!(emergency.len(), 2);
        for p in &emergency {
            assert_eq!(p.detail.as_deref(), Some("daily loss limit breached"));
        }
    }

    #[test]
    fn test_daily_loss_under_limit() {
        let (c, _) = controller();
        c.arm_position("A", 1_000.0, 10.0, None, None, false).unwrap();
        c.close_position("A", 960.0).unwrap(); // -400 on 100k = 0.4%

        assert!(!c.check_daily_loss_limit(100_000.0).unwrap());
    }

    #[test]
    fn test_manual_close_unknown_instrument() {
        let (c, _) = controller();
        assert!(matches!(
            c.close_position("NOPE", 100.0),
            Err(RiskError::UnknownInstrument(_))
        ));
    }

    #[test]
    fn test_rearming_same_instrument_rejected() {
        let (c, _) = controller();
        c.arm_position("A", 100.0, 1.0, None, None, false).unwrap();
        assert!(c.arm_position("A", 100.0, 1.0, None, None, false).is_err());
    }

    #[test]
    fn test_drawdown_tracking() {
        let (c, _) = controller();
        c.arm_position("A", 100.0, 1.0, None, None, false).unwrap();

        c.update_price("A", 120.0).unwrap();
        c.update_price("A", 96.0).unwrap();

        let p = c.position("A").unwrap();
        assert_eq!(p.highest_price, 120.0);
        // Peak 120 to 96 is a 20% adverse move.
        assert!((p.max_drawdown - 0.2).abs() < 1e-12);
        assert!((p.unrealized_pnl - (-4.0)).abs() < 1e-12);
    }
}
