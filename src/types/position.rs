//! Position Types
//!
//! A single leveraged paper position, its exit-rule tags, and the
//! decision returned by the exit ladder.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Position side (long or short).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Sign applied to a raw price move: +1 for long, -1 for short.
    pub fn direction(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    /// Parse a side from loose user input ("long", "BUY", "short", "sell").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Some(PositionSide::Long),
            "short" | "sell" => Some(PositionSide::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Lifecycle status. `Open -> Closed` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "open"),
            PositionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Exit-rule tag recorded on a closed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    /// Price crossed the stop level
    StopLoss,
    /// Net P&L reached the max profit lock
    MaxProfit,
    /// Net P&L reached the minimum profit target
    TakeProfit,
    /// Small win captured after the quick-exit grace period
    QuickGrab,
    /// Flat-or-better exit after the breakeven window
    Breakeven,
    /// Losing trade cut before the hard timeout
    UnderwaterCut,
    /// Hard timeout reached while in profit
    TimeoutProfit,
    /// Hard timeout reached while losing
    TimeoutLoss,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop-loss",
            ExitReason::MaxProfit => "max-profit",
            ExitReason::TakeProfit => "take-profit",
            ExitReason::QuickGrab => "quick-grab",
            ExitReason::Breakeven => "breakeven",
            ExitReason::UnderwaterCut => "underwater-cut",
            ExitReason::TimeoutProfit => "timeout-profit",
            ExitReason::TimeoutLoss => "timeout-loss",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Position
// =============================================================================

/// A leveraged paper position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Unique position ID, never reused
    pub id: String,
    /// Long or short
    pub side: PositionSide,
    /// Fill price at entry
    pub entry_price: f64,
    /// When the position was opened (ms)
    pub entry_time: i64,
    /// Margin posted
    pub collateral: f64,
    /// Notional multiplier
    pub leverage: f64,
    /// Adverse price level that forces an exit
    pub stop_loss: f64,
    /// Favourable price level for reporting
    pub take_profit: f64,
    /// Net P&L (USD) at which take-profit fires
    pub min_profit_target: f64,
    /// Net P&L (USD) at which the max profit lock fires
    pub max_profit_target: f64,
    pub status: PositionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_pnl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<f64>,
    /// Net realized P&L
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ExitReason>,
}

impl Position {
    /// Notional exposure.
    pub fn position_size(&self) -> f64 {
        self.collateral * self.leverage
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Realized net P&L, zero while open.
    pub fn realized_pnl(&self) -> f64 {
        self.pnl.unwrap_or(0.0)
    }

    /// Seconds held as of `now` (ms), or until exit if closed.
    pub fn elapsed_secs(&self, now: i64) -> i64 {
        let end = self.exit_time.unwrap_or(now);
        (end - self.entry_time).max(0) / 1000
    }
}

// =============================================================================
// Exit Decision
// =============================================================================

/// P&L components for a position marked at a price.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlBreakdown {
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
}

/// Result of running the exit ladder on one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitDecision {
    pub should_close: bool,
    pub reason: Option<ExitReason>,
    pub pnl: PnlBreakdown,
    pub elapsed_secs: i64,
}

impl ExitDecision {
    pub fn hold(pnl: PnlBreakdown, elapsed_secs: i64) -> Self {
        Self {
            should_close: false,
            reason: None,
            pnl,
            elapsed_secs,
        }
    }

    pub fn close(reason: ExitReason, pnl: PnlBreakdown, elapsed_secs: i64) -> Self {
        Self {
            should_close: true,
            reason: Some(reason),
            pnl,
            elapsed_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reason_serialization() {
        assert_eq!(serde_json::to_string(&ExitReason::StopLoss).unwrap(), "\"stop-loss\"");
        assert_eq!(serde_json::to_string(&ExitReason::UnderwaterCut).unwrap(), "\"underwater-cut\"");
        assert_eq!(serde_json::to_string(&ExitReason::TimeoutLoss).unwrap(), "\"timeout-loss\"");
    }

    #[test]
    fn test_exit_reason_display_matches_serde() {
        for reason in [
            ExitReason::StopLoss,
            ExitReason::MaxProfit,
            ExitReason::TakeProfit,
            ExitReason::QuickGrab,
            ExitReason::Breakeven,
            ExitReason::UnderwaterCut,
            ExitReason::TimeoutProfit,
            ExitReason::TimeoutLoss,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason));
        }
    }

    #[test]
    fn test_side_parse() {
        assert_eq!(PositionSide::parse("LONG"), Some(PositionSide::Long));
        assert_eq!(PositionSide::parse(" sell "), Some(PositionSide::Short));
        assert_eq!(PositionSide::parse("sideways"), None);
    }

    #[test]
    fn test_side_direction() {
        assert_eq!(PositionSide::Long.direction(), 1.0);
        assert_eq!(PositionSide::Short.direction(), -1.0);
    }

    #[test]
    fn test_position_status_display() {
        assert_eq!(PositionStatus::Open.to_string(), "open");
        assert_eq!(PositionStatus::Closed.to_string(), "closed");
    }
}
