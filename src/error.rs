use thiserror::Error;

use crate::services::ledger::LedgerError;
use crate::services::market_data::MarketDataError;
use crate::services::replicator::ReplicationError;

/// Errors raised inside a decision loop tick.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error("Signal source failed: {0}")]
    Signal(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
