// Recording test double for both callback traits
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ExchangeCallbacks, StrategyCallbacks};
use crate::error::{CallbackError, CallbackResult};
use crate::models::*;
use crate::strategy::{BacktestFrame, BacktestRow, OhlcvBar, SignalState, StrategyParams};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: &'static str,
    pub payload: Value,
}

struct MockState {
    calls: Vec<RecordedCall>,
    failures: HashMap<&'static str, String>,
    ohlcv_failures: HashSet<String>,
    strategy_params: Vec<StrategyParams>,
    positions: Vec<PositionStructure>,
    balance: BalanceStructure,
    market_info: MarketInfo,
    tickers: HashMap<String, TickerInfo>,
    signal_states: HashMap<isize, SignalState>,
    ohlcv: Vec<OhlcvBar>,
}

pub(crate) struct MockCallbacks {
    state: Mutex<MockState>,
}

impl MockCallbacks {
    pub fn new() -> Self {
        let mut tickers = HashMap::new();
        tickers.insert(
            "BTC/USDT".to_string(),
            TickerInfo {
                symbol: "BTC/USDT".to_string(),
                last: Some(50000.0),
                close: Some(50000.0),
                ..Default::default()
            },
        );

        let mut free = HashMap::new();
        free.insert("USDT".to_string(), 10000.0);

        let bar = |minutes: i64, close: f64| OhlcvBar {
            timestamp: Utc.timestamp_opt(1_700_000_000 + minutes * 60, 0).unwrap(),
            open: close,
            high: close + 100.0,
            low: close - 100.0,
            close,
            volume: 1000.0,
        };

        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                failures: HashMap::new(),
                ohlcv_failures: HashSet::new(),
                strategy_params: vec![StrategyParams::new("ohlcv_15m", "BTC/USDT")],
                positions: Vec::new(),
                balance: BalanceStructure {
                    free: free.clone(),
                    used: HashMap::new(),
                    total: free,
                    timestamp: None,
                },
                market_info: MarketInfo {
                    symbol: "BTC/USDT".to_string(),
                    linear: true,
                    settle: "USDT".to_string(),
                    precision_amount: 0.001,
                    min_amount: 0.001,
                    contract_size: 1.0,
                    leverage: 1,
                },
                tickers,
                signal_states: HashMap::new(),
                ohlcv: vec![bar(0, 50050.0), bar(15, 50150.0)],
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, method: &'static str, payload: Value) -> CallbackResult<()> {
        let mut state = self.state();
        state.calls.push(RecordedCall { method, payload });
        match state.failures.get(method) {
            Some(message) => Err(CallbackError::new(message.clone())),
            None => Ok(()),
        }
    }

    // --- Configuration ---

    pub fn fail(&self, method: &'static str, message: &str) {
        self.state().failures.insert(method, message.to_string());
    }

    /// Fail `fetch_ohlcv` for one symbol only
    pub fn fail_ohlcv_for(&self, symbol: &str) {
        self.state().ohlcv_failures.insert(symbol.to_string());
    }

    pub fn set_positions(&self, positions: Vec<PositionStructure>) {
        self.state().positions = positions;
    }

    pub fn set_free_balance(&self, currency: &str, amount: f64) {
        self.state().balance.free.insert(currency.to_string(), amount);
    }

    pub fn set_market_info(&self, precision_amount: f64, min_amount: f64) {
        let mut state = self.state();
        state.market_info.precision_amount = precision_amount;
        state.market_info.min_amount = min_amount;
    }

    pub fn set_ticker(&self, symbol: &str, last: Option<f64>, close: Option<f64>) {
        self.state().tickers.insert(
            symbol.to_string(),
            TickerInfo {
                symbol: symbol.to_string(),
                last,
                close,
                ..Default::default()
            },
        );
    }

    pub fn set_signal(&self, index: isize, signal: SignalState) {
        self.state().signal_states.insert(index, signal);
    }

    pub fn set_strategy_params(&self, params: Vec<StrategyParams>) {
        self.state().strategy_params = params;
    }

    // --- Inspection ---

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.state().calls.iter().map(|c| c.method).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn payloads(&self, method: &str) -> Vec<Value> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.payload.clone())
            .collect()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[async_trait]
impl StrategyCallbacks for MockCallbacks {
    async fn get_strategy_params(&self) -> CallbackResult<Vec<StrategyParams>> {
        self.record("get_strategy_params", Value::Null)?;
        Ok(self.state().strategy_params.clone())
    }

    async fn run_backtest(
        &self,
        params: &StrategyParams,
        ohlcv: &[OhlcvBar],
    ) -> CallbackResult<BacktestFrame> {
        self.record(
            "run_backtest",
            json!({ "symbol": params.symbol, "bars": ohlcv.len() }),
        )?;
        let rows = ohlcv
            .iter()
            .map(|bar| {
                let mut row = BacktestRow::new();
                row.insert("close".to_string(), Some(bar.close));
                row
            })
            .collect();
        Ok(BacktestFrame::new(rows))
    }

    async fn parse_signal(
        &self,
        _frame: &BacktestFrame,
        params: &StrategyParams,
        index: isize,
    ) -> CallbackResult<SignalState> {
        self.record(
            "parse_signal",
            json!({ "symbol": params.symbol, "index": index }),
        )?;
        Ok(self
            .state()
            .signal_states
            .get(&index)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ExchangeCallbacks for MockCallbacks {
    async fn fetch_balance(&self, ctx: &ExchangeContext) -> CallbackResult<BalanceResponse> {
        self.record("fetch_balance", to_json(ctx))?;
        Ok(BalanceResponse {
            balance: self.state().balance.clone(),
        })
    }

    async fn fetch_tickers(
        &self,
        _ctx: &ExchangeContext,
        symbols: Option<&str>,
    ) -> CallbackResult<TickersResponse> {
        self.record("fetch_tickers", json!({ "symbols": symbols }))?;
        Ok(TickersResponse {
            tickers: self.state().tickers.clone(),
        })
    }

    async fn fetch_ohlcv(&self, request: &OhlcvRequest) -> CallbackResult<Vec<OhlcvBar>> {
        self.record("fetch_ohlcv", to_json(request))?;
        let state = self.state();
        if state.ohlcv_failures.contains(&request.symbol) {
            return Err(CallbackError::new(format!("No data for {}", request.symbol)));
        }
        Ok(state.ohlcv.clone())
    }

    async fn fetch_market_info(
        &self,
        _ctx: &ExchangeContext,
        symbol: &str,
    ) -> CallbackResult<MarketInfo> {
        self.record("fetch_market_info", json!({ "symbol": symbol }))?;
        Ok(self.state().market_info.clone())
    }

    async fn fetch_positions(
        &self,
        _ctx: &ExchangeContext,
        symbols: Option<&[String]>,
    ) -> CallbackResult<PositionsResponse> {
        self.record("fetch_positions", json!({ "symbols": symbols }))?;
        Ok(PositionsResponse {
            positions: self.state().positions.clone(),
        })
    }

    async fn fetch_open_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.record("fetch_open_orders", to_json(query))?;
        Ok(OrdersResponse::default())
    }

    async fn fetch_closed_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.record("fetch_closed_orders", to_json(query))?;
        Ok(OrdersResponse::default())
    }

    async fn fetch_my_trades(&self, query: &OrderQuery) -> CallbackResult<TradesResponse> {
        self.record("fetch_my_trades", to_json(query))?;
        Ok(TradesResponse::default())
    }

    async fn create_limit_order(
        &self,
        request: &LimitOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.record("create_limit_order", to_json(request))?;
        Ok(OrderResponse { order: None })
    }

    async fn create_market_order(
        &self,
        request: &MarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.record("create_market_order", to_json(request))?;
        Ok(OrderResponse { order: None })
    }

    async fn create_stop_market_order(
        &self,
        request: &StopMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.record("create_stop_market_order", to_json(request))?;
        Ok(OrderResponse { order: None })
    }

    async fn create_take_profit_market_order(
        &self,
        request: &TakeProfitMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.record("create_take_profit_market_order", to_json(request))?;
        Ok(OrderResponse { order: None })
    }

    async fn close_position(
        &self,
        request: &ClosePositionRequest,
    ) -> CallbackResult<ClosePositionResponse> {
        self.record("close_position", to_json(request))?;
        Ok(ClosePositionResponse::default())
    }

    async fn cancel_all_orders(
        &self,
        request: &CancelAllOrdersRequest,
    ) -> CallbackResult<CancelAllOrdersResponse> {
        self.record("cancel_all_orders", to_json(request))?;
        Ok(CancelAllOrdersResponse {
            result: Value::Array(Vec::new()),
        })
    }

    async fn cancel_order(&self, request: &CancelOrderRequest) -> CallbackResult<OrderResponse> {
        self.record("cancel_order", to_json(request))?;
        Ok(OrderResponse { order: None })
    }

    async fn set_leverage(&self, request: &SetLeverageRequest) -> CallbackResult<GenericResponse> {
        self.record("set_leverage", to_json(request))?;
        Ok(GenericResponse::default())
    }

    async fn set_margin_mode(
        &self,
        request: &SetMarginModeRequest,
    ) -> CallbackResult<GenericResponse> {
        self.record("set_margin_mode", to_json(request))?;
        Ok(GenericResponse::default())
    }
}

/// Open position fixture
pub(crate) fn position(symbol: &str, contracts: f64, side: PositionSide) -> PositionStructure {
    PositionStructure {
        symbol: symbol.to_string(),
        contracts: Some(contracts),
        side: Some(side),
        ..Default::default()
    }
}
