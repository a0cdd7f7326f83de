//! Integration tests for the ledger, risk gate and position engine working together.

use paperbot::config::{RiskConfig, TradingParams};
use paperbot::services::{can_open_position, DenyReason, Ledger, LedgerFile};
use paperbot::types::{ExitReason, LedgerState, PositionSide};
use tempfile::TempDir;

const T0: i64 = 1_700_000_000_000;
const MINUTE: i64 = 60_000;

fn ledger_with(risk: RiskConfig) -> Ledger {
    Ledger::in_memory(risk, TradingParams::default(), T0)
}

fn assert_conserved(state: &LedgerState) {
    assert!(
        state.conservation_drift().abs() < 1e-6,
        "equity {} != initial {} + realized {}",
        state.equity(),
        state.initial_balance,
        state.realized_pnl()
    );
}

/// Timeout tag matching the direction of the move.
fn timeout_reason(side: PositionSide, entry: f64, exit: f64) -> ExitReason {
    let favourable = match side {
        PositionSide::Long => exit >= entry,
        PositionSide::Short => exit <= entry,
    };
    if favourable {
        ExitReason::TimeoutProfit
    } else {
        ExitReason::TimeoutLoss
    }
}

/// Open at `entry` and immediately settle at `exit`. Returns net P&L.
fn round_trip(ledger: &mut Ledger, side: PositionSide, entry: f64, exit: f64, now: i64) -> f64 {
    let collateral = ledger.risk().risk_per_trade;
    let position = ledger.engine().create(side, entry, collateral, now);
    let id = position.id.clone();
    ledger.open_position(position).unwrap();
    let reason = timeout_reason(side, entry, exit);
    let closed = ledger.close_position(&id, exit, reason, now).unwrap();
    closed.pnl.unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_stop_loss_scenario() {
    let mut ledger = ledger_with(RiskConfig::default());

    let position = ledger
        .engine()
        .create(PositionSide::Long, 70_000.0, 500.0, T0);
    assert!((position.stop_loss - 69_895.0).abs() < 1e-6);
    let id = position.id.clone();
    ledger.open_position(position).unwrap();
    assert_eq!(ledger.state().balance, 1500.0);

    let open = ledger.state().find(&id).unwrap().clone();
    let decision = ledger.engine().evaluate(&open, 69_890.0, T0 + MINUTE);
    assert!(decision.should_close);
    assert_eq!(decision.reason, Some(ExitReason::StopLoss));

    let closed = ledger
        .close_position(&id, 69_890.0, ExitReason::StopLoss, T0 + MINUTE)
        .unwrap();
    let net = closed.pnl.unwrap();
    let expected_gross = 37_500.0 * (-110.0 / 70_000.0);
    assert!((closed.gross_pnl.unwrap() - expected_gross).abs() < 1e-9);
    assert!((closed.fees.unwrap() - 30.0).abs() < 1e-9);
    assert!((net - (expected_gross - 30.0)).abs() < 1e-9);

    let state = ledger.state();
    assert!((state.balance - (2000.0 - 500.0 + (500.0 + net))).abs() < 1e-9);
    assert_eq!(state.consecutive_losses, 1);
    assert_conserved(state);
}

#[test]
fn test_three_losses_pause_entries() {
    let mut ledger = ledger_with(RiskConfig::default());

    let mut now = T0;
    for _ in 0..3 {
        assert!(can_open_position(ledger.state(), ledger.risk(), now).allowed);
        round_trip(&mut ledger, PositionSide::Long, 70_000.0, 69_990.0, now);
        now += MINUTE;
    }
    let last_close = now - MINUTE;

    let state = ledger.state();
    assert_eq!(state.consecutive_losses, 3);
    assert_eq!(state.paused_until, Some(last_close + 30 * MINUTE));

    let check = can_open_position(state, ledger.risk(), last_close + 29 * MINUTE);
    assert!(!check.allowed);
    assert_eq!(
        check.reason,
        Some(DenyReason::Paused {
            until: last_close + 30 * MINUTE
        })
    );

    let after = can_open_position(state, ledger.risk(), last_close + 31 * MINUTE);
    assert!(!matches!(after.reason, Some(DenyReason::Paused { .. })));
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn test_conservation_over_sequence() {
    let risk = RiskConfig {
        max_open_positions: 3,
        risk_per_trade: 100.0,
        ..RiskConfig::default()
    };
    let mut ledger = ledger_with(risk);

    // Deterministic pseudo-random walk
    let mut seed: u64 = 42;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as f64 / (1u64 << 31) as f64
    };

    let mut now = T0;
    let mut open_ids = Vec::new();
    for step in 0..60 {
        now += MINUTE;
        let price = 70_000.0 * (1.0 + (next() - 0.5) * 0.01);

        if open_ids.len() < 3 && step % 3 != 2 {
            let side = if next() > 0.5 { PositionSide::Long } else { PositionSide::Short };
            let position = ledger.engine().create(side, price, 100.0, now);
            open_ids.push(position.id.clone());
            ledger.open_position(position).unwrap();
        } else if !open_ids.is_empty() {
            let id = open_ids.remove(0);
            let open = ledger.state().find(&id).unwrap();
            let reason = timeout_reason(open.side, open.entry_price, price);
            ledger.close_position(&id, price, reason, now).unwrap();
        }

        assert_conserved(ledger.state());
    }

    let state = ledger.state();
    assert_eq!(state.open_count(), open_ids.len());
    assert!((state.locked_collateral() - 100.0 * open_ids.len() as f64).abs() < 1e-9);
}

#[test]
fn test_close_is_idempotent() {
    let mut ledger = ledger_with(RiskConfig::default());
    let position = ledger.engine().create(PositionSide::Short, 70_000.0, 500.0, T0);
    let id = position.id.clone();
    ledger.open_position(position).unwrap();

    assert!(ledger.close_position(&id, 69_900.0, ExitReason::TakeProfit, T0 + MINUTE).is_some());
    let after_first = ledger.state().clone();

    assert!(ledger.close_position(&id, 60_000.0, ExitReason::TakeProfit, T0 + 2 * MINUTE).is_none());
    assert_eq!(ledger.state(), &after_first);
    assert!(ledger.close_position("missing", 1.0, ExitReason::TimeoutLoss, T0).is_none());
}

#[test]
fn test_invalid_close_price_leaves_ledger_untouched() {
    let mut ledger = ledger_with(RiskConfig::default());
    let position = ledger.engine().create(PositionSide::Long, 70_000.0, 500.0, T0);
    let id = position.id.clone();
    ledger.open_position(position).unwrap();
    let before = ledger.state().clone();

    assert!(ledger.close_position(&id, f64::NAN, ExitReason::StopLoss, T0 + MINUTE).is_none());
    assert!(ledger.close_position(&id, 0.0, ExitReason::StopLoss, T0 + MINUTE).is_none());
    assert_eq!(ledger.state(), &before);
    assert_conserved(ledger.state());
    assert!(!ledger.state().summary().equity.is_nan());

    ledger.close_position(&id, 70_100.0, ExitReason::TakeProfit, T0 + MINUTE).unwrap();
    assert_conserved(ledger.state());
    assert_eq!(ledger.state().open_count(), 0);
}

#[test]
fn test_daily_loss_cap_holds_until_reset() {
    let risk = RiskConfig {
        risk_per_trade: 100.0,
        max_consecutive_losses: 10,
        max_trades_per_hour: 20,
        ..RiskConfig::default()
    };
    let mut ledger = ledger_with(risk);

    let mut now = T0;
    while ledger.state().daily_pnl.abs() < ledger.risk().max_daily_loss_dollars {
        assert!(can_open_position(ledger.state(), ledger.risk(), now).allowed);
        round_trip(&mut ledger, PositionSide::Long, 70_000.0, 69_000.0, now);
        now += MINUTE;
    }

    for offset in [0, MINUTE, 30 * MINUTE, 90 * MINUTE] {
        ledger.refresh_windows(now + offset);
        let check = can_open_position(ledger.state(), ledger.risk(), now + offset);
        assert!(
            matches!(check.reason, Some(DenyReason::DailyLossLimit { .. })),
            "expected daily loss denial, got {:?}",
            check
        );
    }

    ledger.reset_daily(now + 2 * 60 * MINUTE);
    assert!(can_open_position(ledger.state(), ledger.risk(), now + 2 * 60 * MINUTE).allowed);
    assert_conserved(ledger.state());
}

#[test]
fn test_insufficient_balance_rejected() {
    let mut ledger = ledger_with(RiskConfig::default());
    let position = ledger.engine().create(PositionSide::Long, 70_000.0, 5_000.0, T0);
    assert!(ledger.open_position(position).is_err());
    assert_eq!(ledger.state().balance, 2000.0);
    assert!(ledger.state().positions.is_empty());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_ledger_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    let mut ledger = Ledger::load(
        LedgerFile::new(&path),
        RiskConfig::default(),
        TradingParams::default(),
        T0,
    );
    round_trip(&mut ledger, PositionSide::Long, 70_000.0, 70_100.0, T0);
    let open = ledger.engine().create(PositionSide::Short, 70_100.0, 500.0, T0 + MINUTE);
    ledger.open_position(open).unwrap();
    let before = ledger.state().clone();
    drop(ledger);

    let reloaded = Ledger::load(
        LedgerFile::new(&path),
        RiskConfig::default(),
        TradingParams::default(),
        T0 + 2 * MINUTE,
    );
    assert_eq!(reloaded.state(), &before);
    assert_eq!(reloaded.state().open_count(), 1);
    assert_conserved(reloaded.state());
}

#[test]
fn test_corrupt_ledger_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, "{\"balance\": ").unwrap();

    let ledger = Ledger::load(
        LedgerFile::new(&path),
        RiskConfig::default(),
        TradingParams::default(),
        T0,
    );
    assert_eq!(ledger.state(), &LedgerState::new(2000.0, T0));
    assert!(dir.path().join("ledger.json.corrupt").exists());
}
