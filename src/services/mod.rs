pub mod advisory;
pub mod ledger;
pub mod ledger_file;
pub mod market_data;
pub mod position_engine;
pub mod replicator;
pub mod risk_gate;
pub mod runner;
pub mod signal;
pub mod versioned_store;

pub use advisory::{FileOverrideSource, OverrideRead, OverrideSource, StaticOverride};
pub use ledger::{Ledger, LedgerError};
pub use ledger_file::LedgerFile;
pub use market_data::{MarketData, MarketDataError};
pub use position_engine::PositionEngine;
pub use replicator::{PushOutcome, ReplicationError, Replicator};
pub use risk_gate::{can_open_position, DenyReason, RiskCheck};
pub use runner::{DecisionLoop, LoopContext, TickSummary};
pub use signal::{EmaCrossSignal, SignalSource};
pub use versioned_store::{HttpStore, MemoryStore, RedisStore, StoreError, Version, Versioned, VersionedStore};
