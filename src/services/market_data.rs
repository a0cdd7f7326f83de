//! Market data collaborator interface.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Bar;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of price bars for the traded instrument.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Recent bars, oldest first.
    async fn fetch_bars(&self) -> Result<Vec<Bar>, MarketDataError>;
}
