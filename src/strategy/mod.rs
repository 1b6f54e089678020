// Strategy parameters and the data handed to the signal engine
pub mod signals;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ExchangeContext, Market, Mode};

pub use signals::{ActionType, SignalAction, SignalState};

const DEFAULT_PERIOD_MINUTES: u32 = 15;

/// One (symbol, timeframe) pairing plus its execution policy.
///
/// Created by strategy discovery and never mutated during a pipeline pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyParams {
    /// Data key ending in the timeframe, e.g. `ohlcv_15m`
    pub base_data_key: String,
    pub symbol: String,
    #[serde(default = "default_true")]
    pub sl_exit_in_bar: bool,
    #[serde(default)]
    pub tp_exit_in_bar: bool,
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_exchange_name")]
    pub exchange_name: String,
    #[serde(default)]
    pub market: Market,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_settlement_currency")]
    pub settlement_currency: String,
}

fn default_true() -> bool {
    true
}

fn default_position_size_pct() -> f64 {
    1.0
}

fn default_leverage() -> u32 {
    1
}

fn default_exchange_name() -> String {
    "binance".to_string()
}

fn default_settlement_currency() -> String {
    "USDT".to_string()
}

impl StrategyParams {
    /// Params with every policy field at its default
    pub fn new(base_data_key: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            base_data_key: base_data_key.into(),
            symbol: symbol.into(),
            sl_exit_in_bar: true,
            tp_exit_in_bar: false,
            position_size_pct: default_position_size_pct(),
            leverage: default_leverage(),
            exchange_name: default_exchange_name(),
            market: Market::default(),
            mode: Mode::default(),
            settlement_currency: default_settlement_currency(),
        }
    }

    pub fn context(&self) -> ExchangeContext {
        ExchangeContext {
            exchange_name: self.exchange_name.clone(),
            market: self.market,
            mode: self.mode,
        }
    }

    /// Timeframe segment of `base_data_key` (`ohlcv_15m` -> `15m`, `trade_1h` -> `1h`)
    pub fn timeframe(&self) -> &str {
        self.base_data_key
            .rsplit('_')
            .next()
            .unwrap_or(&self.base_data_key)
    }

    /// Period length in minutes. Unparseable timeframes fall back to 15 minutes.
    pub fn period_minutes(&self) -> u32 {
        match parse_timeframe_minutes(self.timeframe()) {
            Some(minutes) => minutes,
            None => {
                tracing::warn!(
                    symbol = %self.symbol,
                    base_data_key = %self.base_data_key,
                    "Unrecognised timeframe, assuming {} minutes",
                    DEFAULT_PERIOD_MINUTES
                );
                DEFAULT_PERIOD_MINUTES
            }
        }
    }
}

/// Parse `15m`, `4h`, `1d` into minutes
pub fn parse_timeframe_minutes(timeframe: &str) -> Option<u32> {
    let split = timeframe.len().checked_sub(1)?;
    if !timeframe.is_char_boundary(split) {
        return None;
    }
    let (count, unit) = timeframe.split_at(split);
    let count: u32 = count.parse().ok()?;
    let minutes = match unit {
        "m" => count,
        "h" => count.checked_mul(60)?,
        "d" => count.checked_mul(60 * 24)?,
        _ => return None,
    };
    (minutes > 0).then_some(minutes)
}

/// One OHLCV bar as returned by `fetch_ohlcv`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One row of a backtest result, keyed by column name
pub type BacktestRow = HashMap<String, Option<f64>>;

/// Tabular backtest output. Opaque to the execution layer, which only hands
/// it back to the signal parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BacktestFrame {
    pub rows: Vec<BacktestRow>,
}

impl BacktestFrame {
    pub fn new(rows: Vec<BacktestRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row by index; negative indices count from the end (`-1` is the latest bar)
    pub fn row(&self, index: isize) -> Option<&BacktestRow> {
        let resolved = if index < 0 {
            self.rows.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.rows.get(resolved)
    }
}
