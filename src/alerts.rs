//! Alert types and the in-memory alert log
//!
//! The risk controller and the monitoring loop append alerts here; callers
//! poll or drain the log. There is no callback registration: readers take a
//! snapshot, and `drain` atomically swaps in an empty list so it is safe to
//! call concurrently with new appends.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Alert severity levels, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational (e.g. take-profit hit)
    Info,

    /// Warning (e.g. stop-loss hit, concentration limit exceeded)
    Warning,

    /// Critical (e.g. daily loss limit breached)
    Critical,

    /// Emergency (e.g. forced liquidation of all positions)
    Emergency,
}

impl AlertSeverity {
    /// Whether this severity demands action from the caller
    pub fn requires_action(&self) -> bool {
        *self >= AlertSeverity::Critical
    }
}

/// A single risk alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub id: Uuid,

    /// When the alert was raised
    pub timestamp: DateTime<Utc>,

    /// Alert severity
    pub severity: AlertSeverity,

    /// Human-readable message
    pub message: String,

    /// Structured detail payload
    pub details: serde_json::Value,

    /// Whether the caller is expected to act on this alert
    pub action_required: bool,
}

impl Alert {
    /// Create a new alert; `action_required` follows from the severity
    pub fn new(severity: AlertSeverity, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            details,
            action_required: severity.requires_action(),
        }
    }
}

/// Append-only, bounded alert log
///
/// Oldest alerts are dropped once `max_size` is reached.
pub struct AlertLog {
    entries: RwLock<Vec<Alert>>,
    max_size: usize,
}

impl AlertLog {
    /// Create a new alert log holding at most `max_size` entries
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_size,
        }
    }

    /// Append an alert, logging it at a level matching its severity
    pub fn push(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Info => info!(alert = %alert.message, "risk alert"),
            AlertSeverity::Warning => warn!(alert = %alert.message, "risk alert"),
            AlertSeverity::Critical | AlertSeverity::Emergency => {
                error!(alert = %alert.message, severity = ?alert.severity, "risk alert")
            }
        }

        let mut entries = self.entries.write();
        entries.push(alert);

        // Keep maximum size
        if entries.len() > self.max_size {
            let overflow = entries.len() - self.max_size;
            entries.drain(..overflow);
        }
    }

    /// Clone the current contents without clearing them
    pub fn snapshot(&self) -> Vec<Alert> {
        self.entries.read().clone()
    }

    /// Take all alerts, leaving the log empty
    pub fn drain(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.entries.write())
    }

    /// Number of alerts currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Most severe alert currently held, if any
    pub fn max_severity(&self) -> Option<AlertSeverity> {
        self.entries.read().iter().map(|a| a.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_action_required() {
        let info = Alert::new(AlertSeverity::Info, "take profit", json!({}));
        assert!(!info.action_required);

        let critical = Alert::new(AlertSeverity::Critical, "daily loss", json!({}));
        assert!(critical.action_required);

        let emergency = Alert::new(AlertSeverity::Emergency, "liquidation", json!({}));
        assert!(emergency.action_required);
    }

    #[test]
    fn test_alert_log_snapshot_and_drain() {
        let log = AlertLog::new(100);
        log.push(Alert::new(AlertSeverity::Info, "one", json!({})));
        log.push(Alert::new(AlertSeverity::Warning, "two", json!({})));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(log.len(), 2); // snapshot does not clear

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_alert_log_bounded() {
        let log = AlertLog::new(3);
        for i in 0..10 {
            log.push(Alert::new(AlertSeverity::Info, format!("alert {}", i), json!({})));
        }

        let entries = log.snapshot();
        assert_eq!(entries.len(), 3);
        // Most recent entries are kept
        assert_eq!(entries[2].message, "alert 9");
    }

    #[test]
    fn test_max_severity() {
        let log = AlertLog::new(10);
        assert_eq!(log.max_severity(), None);

        log.push(Alert::new(AlertSeverity::Info, "info", json!({})));
        log.push(Alert::new(AlertSeverity::Emergency, "emergency", json!({})));
        log.push(Alert::new(AlertSeverity::Warning, "warning", json!({})));

        assert_eq!(log.max_severity(), Some(AlertSeverity::Emergency));
    }
}
