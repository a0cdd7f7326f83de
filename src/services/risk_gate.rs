//! Risk gate: admission checks for new positions.
//!
//! Pure predicates over ledger state. Checks run in a fixed order and the
//! first failing check decides the outcome.

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::types::LedgerState;

/// Why a new position was refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DenyReason {
    /// Loss-streak cooldown is active
    Paused { until: i64 },
    /// Too many positions already open
    MaxOpenPositions { open: usize, max: u32 },
    /// Daily P&L magnitude reached the loss cap
    DailyLossLimit { daily_pnl: f64, max: f64 },
    /// Hourly trade budget spent
    HourlyTradeLimit { trades: u32, max: u32 },
    /// Not enough free balance for one more trade
    InsufficientBalance { available: f64, required: f64 },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::Paused { until } => write!(f, "paused until {}", until),
            DenyReason::MaxOpenPositions { open, max } => {
                write!(f, "max open positions reached ({}/{})", open, max)
            }
            DenyReason::DailyLossLimit { daily_pnl, max } => {
                write!(f, "daily loss limit reached ({:.2} / {:.2})", daily_pnl, max)
            }
            DenyReason::HourlyTradeLimit { trades, max } => {
                write!(f, "hourly trade limit reached ({}/{})", trades, max)
            }
            DenyReason::InsufficientBalance { available, required } => write!(
                f,
                "insufficient balance ({:.2} available, {:.2} required)",
                available, required
            ),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl RiskCheck {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Decide whether a new position may open at `now`.
pub fn can_open_position(ledger: &LedgerState, config: &RiskConfig, now: i64) -> RiskCheck {
    if let Some(until) = ledger.paused_until {
        if until > now {
            return RiskCheck::deny(DenyReason::Paused { until });
        }
    }

    let open = ledger.open_count();
    if open >= config.max_open_positions as usize {
        return RiskCheck::deny(DenyReason::MaxOpenPositions {
            open,
            max: config.max_open_positions,
        });
    }

    if ledger.daily_pnl.abs() >= config.max_daily_loss_dollars {
        return RiskCheck::deny(DenyReason::DailyLossLimit {
            daily_pnl: ledger.daily_pnl,
            max: config.max_daily_loss_dollars,
        });
    }

    let trades = ledger.effective_trades_this_hour(now);
    if trades >= config.max_trades_per_hour {
        return RiskCheck::deny(DenyReason::HourlyTradeLimit {
            trades,
            max: config.max_trades_per_hour,
        });
    }

    let available = ledger.available_balance();
    if available < config.risk_per_trade {
        return RiskCheck::deny(DenyReason::InsufficientBalance {
            available,
            required: config.risk_per_trade,
        });
    }

    RiskCheck::allow()
}
