//! Per-symbol caching proxy over the exchange callbacks.
//!
//! One `ScopedCallbacks` lives for exactly one pipeline pass of one symbol.
//! It memoizes `fetch_positions([symbol])`, collapses repeated
//! `cancel_all_orders(symbol)` calls, and drops what it knows after any
//! successful mutation. Failed calls leave the cache untouched.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::callbacks::{ExchangeCallbacks, StrategyCallbacks};
use crate::error::CallbackResult;
use crate::models::*;
use crate::strategy::{BacktestFrame, OhlcvBar, SignalState, StrategyParams};

#[derive(Debug, Default)]
struct ProxyState {
    positions_cache: Option<PositionsResponse>,
    cancelled_all: bool,
}

/// How much a successful mutation invalidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invalidation {
    /// May have created a resting order: forget positions and the cancel-all marker
    Strict,
    /// Changes positions only
    PositionsOnly,
}

pub struct ScopedCallbacks<'a, C: ?Sized> {
    inner: &'a C,
    symbol: String,
    state: Mutex<ProxyState>,
}

impl<'a, C: ?Sized> ScopedCallbacks<'a, C> {
    pub fn new(inner: &'a C, symbol: impl Into<String>) -> Self {
        Self {
            inner,
            symbol: symbol.into(),
            state: Mutex::new(ProxyState::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn inner(&self) -> &'a C {
        self.inner
    }

    pub fn has_cached_positions(&self) -> bool {
        self.state().positions_cache.is_some()
    }

    pub fn cancelled_all(&self) -> bool {
        self.state().cancelled_all
    }

    fn state(&self) -> MutexGuard<'_, ProxyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_scoped(&self, symbols: Option<&[String]>) -> bool {
        matches!(symbols, Some([only]) if *only == self.symbol)
    }

    fn invalidate(&self, level: Invalidation) {
        let mut state = self.state();
        state.positions_cache = None;
        if level == Invalidation::Strict {
            state.cancelled_all = false;
        }
        tracing::debug!(symbol = %self.symbol, ?level, "Proxy cache invalidated");
    }

    fn after_mutation<T>(&self, result: CallbackResult<T>, level: Invalidation) -> CallbackResult<T> {
        if result.is_ok() {
            self.invalidate(level);
        }
        result
    }
}

#[async_trait]
impl<'a, C> ExchangeCallbacks for ScopedCallbacks<'a, C>
where
    C: ExchangeCallbacks + ?Sized,
{
    async fn fetch_balance(&self, ctx: &ExchangeContext) -> CallbackResult<BalanceResponse> {
        self.inner.fetch_balance(ctx).await
    }

    async fn fetch_tickers(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&str>,
    ) -> CallbackResult<TickersResponse> {
        self.inner.fetch_tickers(ctx, symbols).await
    }

    async fn fetch_ohlcv(&self, request: &OhlcvRequest) -> CallbackResult<Vec<OhlcvBar>> {
        self.inner.fetch_ohlcv(request).await
    }

    async fn fetch_market_info(
        &self,
        ctx: &ExchangeContext,
        symbol: &str,
    ) -> CallbackResult<MarketInfo> {
        self.inner.fetch_market_info(ctx, symbol).await
    }

    async fn fetch_positions(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&[String]>,
    ) -> CallbackResult<PositionsResponse> {
        let scoped = self.is_scoped(symbols);

        if scoped {
            let cached = self.state().positions_cache.clone();
            if let Some(positions) = cached {
                tracing::debug!(symbol = %self.symbol, "Positions served from proxy cache");
                return Ok(positions);
            }
        }

        let response = self.inner.fetch_positions(ctx, symbols).await?;
        if scoped {
            self.state().positions_cache = Some(response.clone());
        }
        Ok(response)
    }

    async fn fetch_open_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.inner.fetch_open_orders(query).await
    }

    async fn fetch_closed_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.inner.fetch_closed_orders(query).await
    }

    async fn fetch_my_trades(&self, query: &OrderQuery) -> CallbackResult<TradesResponse> {
        self.inner.fetch_my_trades(query).await
    }

    async fn create_limit_order(
        &self,
        request: &LimitOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        let result = self.inner.create_limit_order(request).await;
        self.after_mutation(result, Invalidation::Strict)
    }

    async fn create_market_order(
        &self,
        request: &MarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        let result = self.inner.create_market_order(request).await;
        self.after_mutation(result, Invalidation::PositionsOnly)
    }

    async fn create_stop_market_order(
        &self,
        request: &StopMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        let result = self.inner.create_stop_market_order(request).await;
        self.after_mutation(result, Invalidation::Strict)
    }

    async fn create_take_profit_market_order(
        &self,
        request: &TakeProfitMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        let result = self.inner.create_take_profit_market_order(request).await;
        self.after_mutation(result, Invalidation::Strict)
    }

    async fn close_position(
        &self,
        request: &ClosePositionRequest,
    ) -> CallbackResult<ClosePositionResponse> {
        let result = self.inner.close_position(request).await;
        self.after_mutation(result, Invalidation::PositionsOnly)
    }

    async fn cancel_all_orders(
        &self,
        request: &CancelAllOrdersRequest,
    ) -> CallbackResult<CancelAllOrdersResponse> {
        let targeted = request.symbol.as_deref() == Some(self.symbol.as_str());

        if targeted && self.cancelled_all() {
            tracing::debug!(symbol = %self.symbol, "cancel_all_orders already done this pass, skipping");
            return Ok(CancelAllOrdersResponse {
                result: serde_json::Value::Array(Vec::new()),
            });
        }

        let response = self.inner.cancel_all_orders(request).await?;
        if targeted {
            self.state().cancelled_all = true;
        }
        Ok(response)
    }

    async fn cancel_order(&self, request: &CancelOrderRequest) -> CallbackResult<OrderResponse> {
        self.inner.cancel_order(request).await
    }

    async fn set_leverage(&self, request: &SetLeverageRequest) -> CallbackResult<GenericResponse> {
        self.inner.set_leverage(request).await
    }

    async fn set_margin_mode(
        &self,
        request: &SetMarginModeRequest,
    ) -> CallbackResult<GenericResponse> {
        self.inner.set_margin_mode(request).await
    }
}

#[async_trait]
impl<'a, C> StrategyCallbacks for ScopedCallbacks<'a, C>
where
    C: StrategyCallbacks + ?Sized,
{
    async fn get_strategy_params(&self) -> CallbackResult<Vec<StrategyParams>> {
        self.inner.get_strategy_params().await
    }

    async fn run_backtest(
        &self,
        params: &StrategyParams,
        ohlcv: &[OhlcvBar],
    ) -> CallbackResult<BacktestFrame> {
        self.inner.run_backtest(params, ohlcv).await
    }

    async fn parse_signal(
        &self,
        frame: &BacktestFrame,
        params: &StrategyParams,
        index: isize,
    ) -> CallbackResult<SignalState> {
        self.inner.parse_signal(frame, params, index).await
    }
}
