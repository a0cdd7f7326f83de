use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use crate::types::Override;

/// Exit ladder and entry parameters for the position engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingParams {
    /// Stop distance from entry, in percent (0.15 = 0.15%).
    pub stop_loss_pct: f64,
    /// Take-profit distance from entry, in percent.
    pub take_profit_pct: f64,
    /// Notional multiplier applied to collateral.
    pub leverage: f64,
    /// Fee rate per side, as a fraction of notional.
    pub fee_rate: f64,
    /// Net P&L (USD) that triggers take-profit.
    pub min_profit_dollars: f64,
    /// Net P&L (USD) that triggers the max profit lock.
    pub max_profit_dollars: f64,
    pub quick_exit_seconds: i64,
    pub quick_grab_dollars: f64,
    pub breakeven_seconds: i64,
    pub underwater_cut_seconds: i64,
    /// Net P&L (USD, negative) below which the underwater cut fires.
    pub underwater_min_loss: f64,
    pub max_trade_seconds: i64,
}

impl Default for TradingParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.15,
            take_profit_pct: 0.30,
            leverage: 75.0,
            fee_rate: 0.0004,
            min_profit_dollars: 25.0,
            max_profit_dollars: 100.0,
            quick_exit_seconds: 120,
            quick_grab_dollars: 8.0,
            breakeven_seconds: 600,
            underwater_cut_seconds: 900,
            underwater_min_loss: -15.0,
            max_trade_seconds: 1800,
        }
    }
}

impl TradingParams {
    /// Apply the parameter deltas of an advisory override.
    ///
    /// Each delta is range-checked; out-of-range values are dropped with a
    /// warning and the current value is kept. The profit targets are also
    /// checked against each other so `min <= max` always holds.
    pub fn with_override(&self, ov: &Override) -> Self {
        let mut params = self.clone();

        if let Some(v) = ov.stop_loss_pct {
            if v > 0.0 && v <= 10.0 {
                params.stop_loss_pct = v;
            } else {
                warn!("Ignoring override stopLossPct={} (allowed 0-10)", v);
            }
        }
        if let Some(v) = ov.take_profit_pct {
            if v > 0.0 && v <= 20.0 {
                params.take_profit_pct = v;
            } else {
                warn!("Ignoring override takeProfitPct={} (allowed 0-20)", v);
            }
        }
        // The min in effect once this override lands
        let next_min = ov
            .min_profit_dollars
            .filter(|v| *v > 0.0 && v.is_finite())
            .unwrap_or(params.min_profit_dollars);
        if let Some(v) = ov.max_profit_dollars {
            if v.is_finite() && v > 0.0 && v >= next_min {
                params.max_profit_dollars = v;
            } else {
                warn!(
                    "Ignoring override maxProfitDollars={} (must be at least {})",
                    v, next_min
                );
            }
        }
        if let Some(v) = ov.min_profit_dollars {
            if v > 0.0 && v <= params.max_profit_dollars {
                params.min_profit_dollars = v;
            } else {
                warn!(
                    "Ignoring override minProfitDollars={} (allowed 0-{})",
                    v, params.max_profit_dollars
                );
            }
        }
        if let Some(v) = ov.max_trade_seconds {
            if (60..=86_400).contains(&v) {
                params.max_trade_seconds = v;
            } else {
                warn!("Ignoring override maxTradeSeconds={} (allowed 60-86400)", v);
            }
        }

        params
    }
}

/// Risk limits consulted by the risk gate and the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub initial_balance: f64,
    /// Collateral committed per trade (USD).
    pub risk_per_trade: f64,
    pub max_open_positions: u32,
    pub max_daily_loss_dollars: f64,
    pub max_trades_per_hour: u32,
    pub max_consecutive_losses: u32,
    pub pause_after_losses_minutes: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_balance: 2000.0,
            risk_per_trade: 500.0,
            max_open_positions: 1,
            max_daily_loss_dollars: 200.0,
            max_trades_per_hour: 6,
            max_consecutive_losses: 3,
            pause_after_losses_minutes: 30,
        }
    }
}

/// Remote store backend for ledger replication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationBackend {
    /// Local file only
    None,
    /// In-process store (testing and dry runs)
    Memory,
    /// HTTP object with ETag / If-Match versioning
    Http { url: String, token: Option<String> },
    /// Redis keys with Lua compare-and-swap
    Redis { url: String, key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationConfig {
    pub backend: ReplicationBackend,
    /// Periodic push interval.
    pub sync_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub symbol: String,
    pub bar_interval: String,
    pub bar_limit: u32,
    pub ema_fast: usize,
    pub ema_slow: usize,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub poll_interval_secs: u64,
    pub ledger_path: String,
    /// Optional JSON file with an advisory override, re-read each tick.
    pub override_path: Option<String>,
    pub trading: TradingParams,
    pub risk: RiskConfig,
    pub replication: ReplicationConfig,
    pub market: MarketDataConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = TradingParams::default();
        let trading = TradingParams {
            stop_loss_pct: parse_or(&env_map, "STOP_LOSS_PCT", defaults.stop_loss_pct)?,
            take_profit_pct: parse_or(&env_map, "TAKE_PROFIT_PCT", defaults.take_profit_pct)?,
            leverage: parse_or(&env_map, "LEVERAGE", defaults.leverage)?,
            fee_rate: parse_or(&env_map, "FEE_RATE", defaults.fee_rate)?,
            min_profit_dollars: parse_or(&env_map, "MIN_PROFIT_DOLLARS", defaults.min_profit_dollars)?,
            max_profit_dollars: parse_or(&env_map, "MAX_PROFIT_DOLLARS", defaults.max_profit_dollars)?,
            quick_exit_seconds: parse_or(&env_map, "QUICK_EXIT_SECONDS", defaults.quick_exit_seconds)?,
            quick_grab_dollars: parse_or(&env_map, "QUICK_GRAB_DOLLARS", defaults.quick_grab_dollars)?,
            breakeven_seconds: parse_or(&env_map, "BREAKEVEN_SECONDS", defaults.breakeven_seconds)?,
            underwater_cut_seconds: parse_or(
                &env_map,
                "UNDERWATER_CUT_SECONDS",
                defaults.underwater_cut_seconds,
            )?,
            underwater_min_loss: parse_or(&env_map, "UNDERWATER_MIN_LOSS", defaults.underwater_min_loss)?,
            max_trade_seconds: parse_or(&env_map, "MAX_TRADE_SECONDS", defaults.max_trade_seconds)?,
        };

        let risk_defaults = RiskConfig::default();
        let risk = RiskConfig {
            initial_balance: parse_or(&env_map, "INITIAL_BALANCE", risk_defaults.initial_balance)?,
            risk_per_trade: parse_or(&env_map, "RISK_PER_TRADE", risk_defaults.risk_per_trade)?,
            max_open_positions: parse_or(&env_map, "MAX_OPEN_POSITIONS", risk_defaults.max_open_positions)?,
            max_daily_loss_dollars: parse_or(
                &env_map,
                "MAX_DAILY_LOSS_DOLLARS",
                risk_defaults.max_daily_loss_dollars,
            )?,
            max_trades_per_hour: parse_or(&env_map, "MAX_TRADES_PER_HOUR", risk_defaults.max_trades_per_hour)?,
            max_consecutive_losses: parse_or(
                &env_map,
                "MAX_CONSECUTIVE_LOSSES",
                risk_defaults.max_consecutive_losses,
            )?,
            pause_after_losses_minutes: parse_or(
                &env_map,
                "PAUSE_AFTER_LOSSES_MINUTES",
                risk_defaults.pause_after_losses_minutes,
            )?,
        };

        let backend = match env_map
            .get("REPLICATION_BACKEND")
            .map(|s| s.as_str())
            .unwrap_or("none")
        {
            "none" => ReplicationBackend::None,
            "memory" => ReplicationBackend::Memory,
            "http" => ReplicationBackend::Http {
                url: require(&env_map, "REPLICATION_URL")?,
                token: env_map.get("REPLICATION_TOKEN").cloned(),
            },
            "redis" => ReplicationBackend::Redis {
                url: env_map
                    .get("REDIS_URL")
                    .cloned()
                    .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
                key: env_map
                    .get("REPLICATION_KEY")
                    .cloned()
                    .unwrap_or_else(|| "paperbot:ledger".to_string()),
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "REPLICATION_BACKEND".to_string(),
                    format!("must be none, memory, http, or redis, got {}", other),
                ))
            }
        };

        let market = MarketDataConfig {
            base_url: env_map
                .get("MARKET_DATA_URL")
                .cloned()
                .unwrap_or_else(|| "https://api.binance.com/api/v3".to_string()),
            symbol: env_map
                .get("SYMBOL")
                .cloned()
                .unwrap_or_else(|| "BTCUSDT".to_string()),
            bar_interval: env_map
                .get("BAR_INTERVAL")
                .cloned()
                .unwrap_or_else(|| "1m".to_string()),
            bar_limit: parse_or(&env_map, "BAR_LIMIT", 100)?,
            ema_fast: parse_or(&env_map, "EMA_FAST", 9)?,
            ema_slow: parse_or(&env_map, "EMA_SLOW", 21)?,
        };

        let config = Config {
            poll_interval_secs: parse_or(&env_map, "POLL_INTERVAL_SECS", 10)?,
            ledger_path: env_map
                .get("LEDGER_PATH")
                .cloned()
                .unwrap_or_else(|| ".paperbot/ledger.json".to_string()),
            override_path: env_map.get("OVERRIDE_PATH").cloned().filter(|s| !s.is_empty()),
            trading,
            risk,
            replication: ReplicationConfig {
                backend,
                sync_interval_secs: parse_or(&env_map, "SYNC_INTERVAL_SECS", 300)?,
            },
            market,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trading;
        let r = &self.risk;

        if t.stop_loss_pct <= 0.0 {
            return Err(invalid("STOP_LOSS_PCT", "must be positive"));
        }
        if t.take_profit_pct <= 0.0 {
            return Err(invalid("TAKE_PROFIT_PCT", "must be positive"));
        }
        if t.leverage < 1.0 {
            return Err(invalid("LEVERAGE", "must be at least 1"));
        }
        if !(0.0..0.1).contains(&t.fee_rate) {
            return Err(invalid("FEE_RATE", "must be in [0, 0.1)"));
        }
        if t.min_profit_dollars > t.max_profit_dollars {
            return Err(invalid("MIN_PROFIT_DOLLARS", "must not exceed MAX_PROFIT_DOLLARS"));
        }
        if t.underwater_min_loss > 0.0 {
            return Err(invalid("UNDERWATER_MIN_LOSS", "must be zero or negative"));
        }
        if t.max_trade_seconds <= 0 {
            return Err(invalid("MAX_TRADE_SECONDS", "must be positive"));
        }
        if r.initial_balance <= 0.0 {
            return Err(invalid("INITIAL_BALANCE", "must be positive"));
        }
        if r.risk_per_trade <= 0.0 || r.risk_per_trade > r.initial_balance {
            return Err(invalid("RISK_PER_TRADE", "must be positive and not exceed INITIAL_BALANCE"));
        }
        if r.max_consecutive_losses == 0 {
            return Err(invalid("MAX_CONSECUTIVE_LOSSES", "must be at least 1"));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("POLL_INTERVAL_SECS", "must be positive"));
        }
        if self.market.ema_fast == 0 || self.market.ema_fast >= self.market.ema_slow {
            return Err(invalid("EMA_FAST", "must be positive and below EMA_SLOW"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string(), message.to_string())
}

fn require(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("cannot parse {:?}", raw))
        }),
        None => Ok(default),
    }
}
