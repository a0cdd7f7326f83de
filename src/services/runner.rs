//! Decision Loop
//!
//! Drives one paper trading stream on a fixed interval. Each tick:
//! 1. roll the hourly and daily windows
//! 2. fetch bars and mark the latest close
//! 3. evaluate every open position and settle the ones that trigger
//! 4. consult the advisory override, the signal, and the risk gate
//! 5. open at most one new position
//!
//! Every ledger mutation is persisted locally first, then pushed to the
//! replicator. A final push runs on shutdown; open positions stay open.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::services::advisory::{OverrideRead, OverrideSource};
use crate::services::ledger::Ledger;
use crate::services::market_data::{MarketData, MarketDataError};
use crate::services::position_engine::PositionEngine;
use crate::services::replicator::{PushOutcome, Replicator};
use crate::services::risk_gate::{can_open_position, DenyReason};
use crate::services::signal::SignalSource;
use crate::types::{Bar, LedgerSummary, Override, Position};

/// Process-wide loop counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopContext {
    pub tick_count: u64,
    /// Last time a detected signal was seen (ms)
    pub last_signal_at: Option<i64>,
    /// Last successful replication push (ms)
    pub last_sync_at: Option<i64>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub tick: u64,
    /// Latest close, `None` when bars were unavailable
    pub price: Option<f64>,
    pub closed: Vec<Position>,
    pub opened: Option<Position>,
    /// Set when a signal was actionable but the risk gate refused it
    pub denied: Option<DenyReason>,
    /// Trading disabled by the advisory override
    pub trading_disabled: bool,
    /// Override could not be read; entries skipped this tick
    pub override_malformed: bool,
    /// Number of replication pushes the remote accepted
    pub pushes: u32,
}

pub struct DecisionLoop {
    ledger: Ledger,
    replicator: Option<Replicator>,
    market: Arc<dyn MarketData>,
    signals: Arc<dyn SignalSource>,
    overrides: Arc<dyn OverrideSource>,
    poll_interval: Duration,
    sync_interval_ms: i64,
    context: LoopContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl DecisionLoop {
    pub fn new(
        ledger: Ledger,
        replicator: Option<Replicator>,
        market: Arc<dyn MarketData>,
        signals: Arc<dyn SignalSource>,
        overrides: Arc<dyn OverrideSource>,
        poll_interval_secs: u64,
        sync_interval_secs: u64,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            ledger,
            replicator,
            market,
            signals,
            overrides,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            sync_interval_ms: sync_interval_secs as i64 * 1000,
            context: LoopContext::default(),
            shutdown_tx,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn context(&self) -> &LoopContext {
        &self.context
    }

    pub fn summary(&self) -> LedgerSummary {
        self.ledger.state().summary()
    }

    /// Sender that stops [`run`](Self::run) when a value is sent.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run until Ctrl-C or a shutdown signal, then push the final state.
    pub async fn run(&mut self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Decision loop started (every {}s, replication: {})",
            self.poll_interval.as_secs(),
            self.replicator
                .as_ref()
                .map(|r| r.store_name().to_string())
                .unwrap_or_else(|| "off".to_string())
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now().timestamp_millis();
                    self.tick(now).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Decision loop received shutdown signal");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down");
                    break;
                }
            }
        }

        self.shutdown(Utc::now().timestamp_millis()).await;
    }

    /// Flush local state and push it one last time.
    pub async fn shutdown(&mut self, now: i64) {
        self.ledger.flush();
        self.sync(now).await;

        let summary = self.summary();
        info!(
            "Stopped after {} ticks: balance {:.2}, equity {:.2}, realized {:.2}, {} open",
            self.context.tick_count,
            summary.balance,
            summary.equity,
            summary.realized_pnl,
            summary.open_positions
        );
    }

    /// Run one decision cycle at `now` (ms).
    pub async fn tick(&mut self, now: i64) -> TickSummary {
        self.context.tick_count += 1;
        let mut summary = TickSummary {
            tick: self.context.tick_count,
            ..TickSummary::default()
        };

        self.ledger.flush();
        if self.ledger.refresh_windows(now) {
            summary.pushes += self.sync(now).await;
        }

        let (bars, price) = match self.latest_bars().await {
            Ok(found) => found,
            Err(e) => {
                warn!("Skipping tick: {}", e);
                summary.pushes += self.periodic_sync(now).await;
                return summary;
            }
        };
        summary.price = Some(price);

        let advisory = match self.overrides.current().await {
            OverrideRead::Absent => Override::default(),
            OverrideRead::Valid(ov) => {
                if let Some(ref reason) = ov.reason {
                    debug!("Advisory override active: {}", reason);
                }
                ov
            }
            OverrideRead::Malformed(reason) => {
                warn!("Advisory override unreadable, no entries this tick: {}", reason);
                summary.override_malformed = true;
                Override::default()
            }
        };
        let engine = PositionEngine::new(self.ledger.engine().params().with_override(&advisory));

        // Exits before entries
        summary.closed = self.settle_exits(&engine, price, now);
        if !summary.closed.is_empty() {
            summary.pushes += self.sync(now).await;
        }

        if summary.override_malformed {
            debug!("Skipping entries after unreadable override");
        } else if !advisory.trading_enabled {
            debug!("Trading disabled by advisory override, skipping entries");
            summary.trading_disabled = true;
        } else {
            match self
                .try_enter(&engine, &advisory, &bars, price, now, &mut summary)
                .await
            {
                Ok(Some(position)) => {
                    summary.opened = Some(position);
                    summary.pushes += self.sync(now).await;
                }
                Ok(None) => {}
                Err(e) => warn!("Entry skipped: {}", e),
            }
        }

        summary.pushes += self.periodic_sync(now).await;

        let state = self.ledger.state();
        info!(
            "Tick {}: price {:.2}, open {}, closed {}, balance {:.2}, daily {:.2}",
            summary.tick,
            price,
            state.open_count(),
            summary.closed.len(),
            state.balance,
            state.daily_pnl
        );

        summary
    }

    /// Recent bars and the latest close.
    async fn latest_bars(&self) -> Result<(Vec<Bar>, f64), AppError> {
        let bars = self.market.fetch_bars().await?;

        let close = bars
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| MarketDataError::Parse("no bars returned".to_string()))?;
        if !close.is_finite() || close <= 0.0 {
            return Err(MarketDataError::Parse(format!("invalid close {}", close)).into());
        }
        Ok((bars, close))
    }

    fn settle_exits(&mut self, engine: &PositionEngine, price: f64, now: i64) -> Vec<Position> {
        let exits: Vec<_> = self
            .ledger
            .state()
            .open_positions()
            .filter_map(|position| {
                let decision = engine.evaluate(position, price, now);
                decision.reason.filter(|_| decision.should_close).map(|reason| {
                    debug!(
                        "Exit triggered for {} after {}s: {} (net {:.2})",
                        position.id, decision.elapsed_secs, reason, decision.pnl.net_pnl
                    );
                    (position.id.clone(), reason)
                })
            })
            .collect();

        exits
            .into_iter()
            .filter_map(|(id, reason)| self.ledger.close_position(&id, price, reason, now))
            .collect()
    }

    async fn try_enter(
        &mut self,
        engine: &PositionEngine,
        advisory: &Override,
        bars: &[Bar],
        price: f64,
        now: i64,
        summary: &mut TickSummary,
    ) -> Result<Option<Position>, AppError> {
        let signal = self.signals.signal(bars).await.map_err(AppError::Signal)?;
        if signal.detected {
            self.context.last_signal_at = Some(now);
        }

        let side = match signal.actionable_side() {
            Some(side) => side,
            None => {
                if signal.detected {
                    warn!("Ignoring malformed signal: {:?}", signal);
                }
                return Ok(None);
            }
        };
        if !advisory.allows_side(side) {
            debug!("Signal {} filtered by preferred side", side);
            return Ok(None);
        }

        let check = can_open_position(self.ledger.state(), self.ledger.risk(), now);
        if !check.allowed {
            if let Some(reason) = check.reason {
                info!("Entry on {} signal denied: {}", side, reason);
                summary.denied = Some(reason);
            }
            return Ok(None);
        }

        let position = engine.create(side, price, self.ledger.risk().risk_per_trade, now);
        info!(
            "{} signal ({}), opening at {:.2}",
            side,
            signal.reason.as_deref().unwrap_or("no reason"),
            price
        );
        self.ledger.open_position(position.clone())?;
        Ok(Some(position))
    }

    async fn periodic_sync(&mut self, now: i64) -> u32 {
        let due = match self.context.last_sync_at {
            Some(last) => now - last >= self.sync_interval_ms,
            None => true,
        };
        if due {
            self.sync(now).await
        } else {
            0
        }
    }

    /// Push the ledger to the remote store. Returns 1 when the remote
    /// accepted a write.
    async fn sync(&mut self, now: i64) -> u32 {
        match self.push().await {
            Ok(Some(PushOutcome::Pushed(version))) => {
                debug!("Replicated ledger at version {}", version);
                self.context.last_sync_at = Some(now);
                1
            }
            Ok(_) => 0,
            Err(e) => {
                error!("Replication push failed: {}", e);
                0
            }
        }
    }

    async fn push(&mut self) -> Result<Option<PushOutcome>, AppError> {
        let Some(ref mut replicator) = self.replicator else {
            return Ok(None);
        };
        Ok(Some(replicator.push(self.ledger.state()).await?))
    }
}
