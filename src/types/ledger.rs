//! Ledger Types
//!
//! The persisted ledger record. This is the single object written to the
//! local ledger file and replicated to the remote versioned store.

use serde::{Deserialize, Serialize};

use super::position::{Position, PositionStatus};

/// Rolling window for the hourly trade counter.
pub const HOUR_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Balance and position history for one paper trading stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    /// Cash available for new collateral (open collateral already removed)
    pub balance: f64,
    /// Fixed reference balance for conservation checks
    pub initial_balance: f64,
    /// Balance snapshot at the last daily reset
    pub daily_start_balance: f64,
    /// Net P&L realized since the last daily reset
    pub daily_pnl: f64,
    #[serde(default)]
    pub consecutive_losses: u32,
    /// Append-only, in opening order
    #[serde(default)]
    pub positions: Vec<Position>,
    /// Last daily reset (ms)
    pub last_reset: i64,
    #[serde(default)]
    pub trades_this_hour: u32,
    /// Start of the current hourly window (ms)
    pub last_hour_reset: i64,
    /// Risk cooldown end (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_until: Option<i64>,
}

impl LedgerState {
    /// Fresh ledger with the full initial balance available.
    pub fn new(initial_balance: f64, now: i64) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            daily_start_balance: initial_balance,
            daily_pnl: 0.0,
            consecutive_losses: 0,
            positions: Vec::new(),
            last_reset: now,
            trades_this_hour: 0,
            last_hour_reset: now,
            paused_until: None,
        }
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.status == PositionStatus::Open)
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.status == PositionStatus::Closed)
    }

    pub fn open_count(&self) -> usize {
        self.open_positions().count()
    }

    pub fn find(&self, id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Collateral currently locked in open positions.
    pub fn locked_collateral(&self) -> f64 {
        self.open_positions().map(|p| p.collateral).sum()
    }

    /// Cash that can back a new position.
    ///
    /// Collateral is debited from `balance` on open, so this is `balance`
    /// itself; kept as a named query for risk checks.
    pub fn available_balance(&self) -> f64 {
        self.balance
    }

    /// Balance plus collateral still held in open positions.
    pub fn equity(&self) -> f64 {
        self.balance + self.locked_collateral()
    }

    /// Sum of net P&L across closed positions.
    pub fn realized_pnl(&self) -> f64 {
        self.closed_positions().map(|p| p.realized_pnl()).sum()
    }

    /// Difference between equity and `initial + realized`. Zero when the
    /// ledger is consistent.
    pub fn conservation_drift(&self) -> f64 {
        self.equity() - (self.initial_balance + self.realized_pnl())
    }

    /// Whether the risk cooldown is active at `now`.
    pub fn is_paused(&self, now: i64) -> bool {
        self.paused_until.map(|until| until > now).unwrap_or(false)
    }

    /// Hourly trade count as seen at `now`, treating an elapsed window as empty.
    pub fn effective_trades_this_hour(&self, now: i64) -> u32 {
        if now - self.last_hour_reset > HOUR_WINDOW_MS {
            0
        } else {
            self.trades_this_hour
        }
    }

    pub fn summary(&self) -> LedgerSummary {
        let closed: Vec<&Position> = self.closed_positions().collect();
        let winning_trades = closed.iter().filter(|p| p.realized_pnl() > 0.0).count() as u64;
        let losing_trades = closed.iter().filter(|p| p.realized_pnl() < 0.0).count() as u64;
        let total_trades = closed.len() as u64;

        LedgerSummary {
            balance: self.balance,
            equity: self.equity(),
            realized_pnl: self.realized_pnl(),
            daily_pnl: self.daily_pnl,
            open_positions: self.open_count(),
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: if total_trades > 0 {
                winning_trades as f64 / total_trades as f64
            } else {
                0.0
            },
            consecutive_losses: self.consecutive_losses,
            paused_until: self.paused_until,
        }
    }
}

/// Point-in-time ledger statistics for status logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub balance: f64,
    pub equity: f64,
    pub realized_pnl: f64,
    pub daily_pnl: f64,
    pub open_positions: usize,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// 0.0 - 1.0
    pub win_rate: f64,
    pub consecutive_losses: u32,
    pub paused_until: Option<i64>,
}
