//! Ledger Service
//!
//! Owns the balance and position history for the paper trading stream:
//! - Opening positions (collateral debit, hourly counter)
//! - Exactly-once settlement of closes
//! - Loss streak tracking and risk cooldown
//! - Daily and hourly window resets
//!
//! Every mutation is written to the local ledger file before returning.
//! Remote replication is driven by the caller after a mutation succeeds.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{RiskConfig, TradingParams};
use crate::services::ledger_file::LedgerFile;
use crate::services::position_engine::PositionEngine;
use crate::types::{ExitReason, LedgerState, Position, HOUR_WINDOW_MS};

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Position already recorded: {0}")]
    DuplicatePosition(String),

    #[error("Position is not open: {0}")]
    NotOpen(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: f64, available: f64 },

    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

/// Mutable ledger with local persistence.
pub struct Ledger {
    state: LedgerState,
    file: Option<LedgerFile>,
    engine: PositionEngine,
    risk: RiskConfig,
    /// Set when the last write to disk failed
    dirty: bool,
}

impl Ledger {
    /// Load from `file`, falling back to a fresh ledger when it is missing or corrupt.
    pub fn load(file: LedgerFile, risk: RiskConfig, trading: TradingParams, now: i64) -> Self {
        let state = match file.load() {
            Some(state) => {
                info!(
                    "Loaded ledger from {} ({} positions, balance {:.2})",
                    file.path().display(),
                    state.positions.len(),
                    state.balance
                );
                state
            }
            None => {
                info!(
                    "Starting fresh ledger with balance {:.2}",
                    risk.initial_balance
                );
                LedgerState::new(risk.initial_balance, now)
            }
        };

        Self {
            state,
            file: Some(file),
            engine: PositionEngine::new(trading),
            risk,
            dirty: false,
        }
    }

    /// Ledger without a backing file.
    pub fn in_memory(risk: RiskConfig, trading: TradingParams, now: i64) -> Self {
        Self {
            state: LedgerState::new(risk.initial_balance, now),
            file: None,
            engine: PositionEngine::new(trading),
            risk,
            dirty: false,
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn engine(&self) -> &PositionEngine {
        &self.engine
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    /// Whether the last disk write failed and is pending a retry.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the whole record, e.g. with the replicated copy on startup.
    pub fn replace_state(&mut self, state: LedgerState) {
        self.state = state;
        self.persist();
    }

    /// Append a freshly created position and lock its collateral.
    pub fn open_position(&mut self, position: Position) -> Result<(), LedgerError> {
        if !position.is_open() {
            return Err(LedgerError::NotOpen(position.id));
        }
        if self.state.find(&position.id).is_some() {
            return Err(LedgerError::DuplicatePosition(position.id));
        }
        if !position.collateral.is_finite()
            || position.collateral <= 0.0
            || !position.entry_price.is_finite()
            || position.entry_price <= 0.0
        {
            return Err(LedgerError::InvalidPosition(format!(
                "collateral {} at entry {}",
                position.collateral, position.entry_price
            )));
        }
        if position.collateral > self.state.balance {
            return Err(LedgerError::InsufficientBalance {
                needed: position.collateral,
                available: self.state.balance,
            });
        }

        info!(
            "Opened {} {} @ {:.2} (collateral {:.2}, {}x, stop {:.2})",
            position.side,
            position.id,
            position.entry_price,
            position.collateral,
            position.leverage,
            position.stop_loss
        );

        self.state.balance -= position.collateral;
        self.state.trades_this_hour += 1;
        self.state.positions.push(position);
        self.persist();
        Ok(())
    }

    /// Settle position `id` at `exit_price`.
    ///
    /// Returns the closed position, or `None` when `id` is unknown, already
    /// closed, or `exit_price` is not a positive finite price. P&L is
    /// applied at most once per position.
    pub fn close_position(
        &mut self,
        id: &str,
        exit_price: f64,
        reason: ExitReason,
        now: i64,
    ) -> Option<Position> {
        let index = match self.state.positions.iter().position(|p| p.id == id) {
            Some(i) => i,
            None => {
                warn!("Close requested for unknown position {}", id);
                return None;
            }
        };
        if self.state.positions[index].is_closed() {
            debug!("Position {} already closed, ignoring", id);
            return None;
        }
        if !exit_price.is_finite() || exit_price <= 0.0 {
            warn!("Refusing to settle {} at invalid price {}", id, exit_price);
            return None;
        }

        let closed = self
            .engine
            .close(&self.state.positions[index], exit_price, reason, now);
        let net_pnl = closed.realized_pnl();

        self.state.balance += closed.collateral + net_pnl;
        self.state.daily_pnl += net_pnl;

        if net_pnl < 0.0 {
            self.state.consecutive_losses += 1;
            if self.state.consecutive_losses >= self.risk.max_consecutive_losses {
                let until = now + self.risk.pause_after_losses_minutes * 60 * 1000;
                self.state.paused_until = Some(until);
                warn!(
                    "{} consecutive losses, pausing entries for {} minutes",
                    self.state.consecutive_losses, self.risk.pause_after_losses_minutes
                );
            }
        } else {
            self.state.consecutive_losses = 0;
        }

        info!(
            "Closed {} {} @ {:.2} [{}] net {:.2} (gross {:.2}, fees {:.2}), balance {:.2}",
            closed.side,
            closed.id,
            exit_price,
            reason,
            net_pnl,
            closed.gross_pnl.unwrap_or(0.0),
            closed.fees.unwrap_or(0.0),
            self.state.balance
        );

        self.state.positions[index] = closed.clone();
        self.persist();
        Some(closed)
    }

    /// Start a new trading day.
    pub fn reset_daily(&mut self, now: i64) {
        self.state.daily_start_balance = self.state.balance;
        self.state.daily_pnl = 0.0;
        self.state.consecutive_losses = 0;
        self.state.last_reset = now;
        info!("Daily reset, start balance {:.2}", self.state.balance);
        self.persist();
    }

    /// Roll the hourly trade window and the UTC day if due. Returns true
    /// when anything changed.
    pub fn refresh_windows(&mut self, now: i64) -> bool {
        let mut changed = false;

        if now - self.state.last_hour_reset > HOUR_WINDOW_MS {
            self.state.trades_this_hour = 0;
            self.state.last_hour_reset = now;
            changed = true;
        }

        if utc_day(now) != utc_day(self.state.last_reset) {
            // reset_daily persists
            self.reset_daily(now);
            return true;
        }

        if changed {
            self.persist();
        }
        changed
    }

    /// Retry a failed disk write.
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist();
        }
    }

    fn persist(&mut self) {
        let Some(ref file) = self.file else {
            return;
        };
        match file.save(&self.state) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                error!("Failed to persist ledger to {}: {}", file.path().display(), e);
                self.dirty = true;
            }
        }
    }
}

fn utc_day(ms: i64) -> Option<chrono::NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}
