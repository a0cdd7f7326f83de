//! Position Engine
//!
//! Pure computation for a single position: entry levels on open, the
//! first-match-wins exit ladder while open, and settlement on close.
//! Status transitions are guarded by the ledger, not here.

use uuid::Uuid;

use crate::config::TradingParams;
use crate::types::{
    ExitDecision, ExitReason, PnlBreakdown, Position, PositionSide, PositionStatus,
};

/// Stateless engine over a set of trading parameters.
#[derive(Debug, Clone)]
pub struct PositionEngine {
    params: TradingParams,
}

impl PositionEngine {
    pub fn new(params: TradingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TradingParams {
        &self.params
    }

    /// Build a new open position at `entry_price`.
    pub fn create(&self, side: PositionSide, entry_price: f64, collateral: f64, now: i64) -> Position {
        let sl = self.params.stop_loss_pct / 100.0;
        let tp = self.params.take_profit_pct / 100.0;

        let (stop_loss, take_profit) = match side {
            PositionSide::Long => (entry_price * (1.0 - sl), entry_price * (1.0 + tp)),
            PositionSide::Short => (entry_price * (1.0 + sl), entry_price * (1.0 - tp)),
        };

        Position {
            id: Uuid::new_v4().to_string(),
            side,
            entry_price,
            entry_time: now,
            collateral,
            leverage: self.params.leverage,
            stop_loss,
            take_profit,
            min_profit_target: self.params.min_profit_dollars,
            max_profit_target: self.params.max_profit_dollars,
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            gross_pnl: None,
            fees: None,
            pnl: None,
            reason: None,
        }
    }

    /// Mark a position at `price`. Shared by `evaluate` and `close`.
    pub fn mark(&self, position: &Position, price: f64) -> PnlBreakdown {
        let size = position.position_size();
        let signed_move = if position.entry_price > 0.0 {
            position.side.direction() * (price - position.entry_price) / position.entry_price
        } else {
            0.0
        };
        let gross_pnl = size * signed_move;
        let fees = size * self.params.fee_rate * 2.0;

        PnlBreakdown {
            gross_pnl,
            fees,
            net_pnl: gross_pnl - fees,
        }
    }

    /// Run the exit ladder for `position` at `current_price`.
    pub fn evaluate(&self, position: &Position, current_price: f64, now: i64) -> ExitDecision {
        let elapsed = position.elapsed_secs(now);
        let pnl = self.mark(position, current_price);

        if position.is_closed() {
            return ExitDecision::hold(pnl, elapsed);
        }

        match self.exit_reason(position, current_price, elapsed, pnl.net_pnl) {
            Some(reason) => ExitDecision::close(reason, pnl, elapsed),
            None => ExitDecision::hold(pnl, elapsed),
        }
    }

    fn exit_reason(
        &self,
        position: &Position,
        price: f64,
        elapsed: i64,
        net_pnl: f64,
    ) -> Option<ExitReason> {
        let p = &self.params;

        let stopped = match position.side {
            PositionSide::Long => price <= position.stop_loss,
            PositionSide::Short => price >= position.stop_loss,
        };
        if stopped {
            return Some(ExitReason::StopLoss);
        }
        if net_pnl >= position.max_profit_target {
            return Some(ExitReason::MaxProfit);
        }
        if net_pnl >= position.min_profit_target {
            return Some(ExitReason::TakeProfit);
        }
        if elapsed >= p.quick_exit_seconds && net_pnl >= p.quick_grab_dollars {
            return Some(ExitReason::QuickGrab);
        }
        if elapsed >= p.breakeven_seconds && net_pnl >= 0.0 {
            return Some(ExitReason::Breakeven);
        }
        if elapsed >= p.underwater_cut_seconds && net_pnl < p.underwater_min_loss {
            return Some(ExitReason::UnderwaterCut);
        }
        if elapsed >= p.max_trade_seconds {
            return Some(if net_pnl >= 0.0 {
                ExitReason::TimeoutProfit
            } else {
                ExitReason::TimeoutLoss
            });
        }
        None
    }

    /// Settle `position` at `exit_price`.
    pub fn close(&self, position: &Position, exit_price: f64, reason: ExitReason, now: i64) -> Position {
        let pnl = self.mark(position, exit_price);

        Position {
            status: PositionStatus::Closed,
            exit_price: Some(exit_price),
            exit_time: Some(now),
            gross_pnl: Some(pnl.gross_pnl),
            fees: Some(pnl.fees),
            pnl: Some(pnl.net_pnl),
            reason: Some(reason),
            ..position.clone()
        }
    }
}
