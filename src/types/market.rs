//! Collaborator input types: price bars, entry signals, and advisory overrides.

use serde::{Deserialize, Serialize};

use super::position::PositionSide;

/// One OHLCV sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time (ms)
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Directional entry signal. Only `detected` and `side` drive the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<PositionSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Signal {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn detected(side: PositionSide, strength: f64, reason: &str) -> Self {
        Self {
            detected: true,
            side: Some(side),
            strength: Some(strength),
            reason: Some(reason.to_string()),
        }
    }

    /// Side to enter on, or `None` when the signal is absent or malformed.
    pub fn actionable_side(&self) -> Option<PositionSide> {
        if !self.detected {
            return None;
        }
        if let Some(strength) = self.strength {
            if !strength.is_finite() {
                return None;
            }
        }
        self.side
    }
}

/// Advisory parameter override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub trading_enabled: bool,
    #[serde(default)]
    pub preferred_side: Option<PositionSide>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub min_profit_dollars: Option<f64>,
    #[serde(default)]
    pub max_profit_dollars: Option<f64>,
    #[serde(default)]
    pub max_trade_seconds: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Default for Override {
    fn default() -> Self {
        Self {
            trading_enabled: true,
            preferred_side: None,
            stop_loss_pct: None,
            take_profit_pct: None,
            min_profit_dollars: None,
            max_profit_dollars: None,
            max_trade_seconds: None,
            reason: None,
        }
    }
}

impl Override {
    /// Whether a signal on `side` passes the preferred-side filter.
    pub fn allows_side(&self, side: PositionSide) -> bool {
        self.preferred_side.map(|preferred| preferred == side).unwrap_or(true)
    }
}
