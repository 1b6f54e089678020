//! Injectable boundary between the execution layer and the outside world.
//!
//! `ExchangeCallbacks` covers the exchange account, `StrategyCallbacks` covers
//! strategy discovery and the signal engine. Anything implementing both is a
//! `Callbacks`. Timeouts and retries belong to implementations, not to callers.

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::error::CallbackResult;
use crate::models::*;
use crate::strategy::{BacktestFrame, OhlcvBar, SignalState, StrategyParams};

pub use http::HttpCallbacks;

/// Exchange account operations
#[async_trait]
pub trait ExchangeCallbacks: Send + Sync {
    // --- Queries ---

    async fn fetch_balance(&self, ctx: &ExchangeContext) -> CallbackResult<BalanceResponse>;

    async fn fetch_tickers(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&str>,
    ) -> CallbackResult<TickersResponse>;

    async fn fetch_ohlcv(&self, request: &OhlcvRequest) -> CallbackResult<Vec<OhlcvBar>>;

    async fn fetch_market_info(
        &self,
        ctx: &ExchangeContext,
        symbol: &str,
    ) -> CallbackResult<MarketInfo>;

    async fn fetch_positions(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&[String]>,
    ) -> CallbackResult<PositionsResponse>;

    async fn fetch_open_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse>;

    async fn fetch_closed_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse>;

    async fn fetch_my_trades(&self, query: &OrderQuery) -> CallbackResult<TradesResponse>;

    // --- Order execution ---

    async fn create_limit_order(
        &self,
        request: &LimitOrderRequest,
    ) -> CallbackResult<OrderResponse>;

    async fn create_market_order(
        &self,
        request: &MarketOrderRequest,
    ) -> CallbackResult<OrderResponse>;

    async fn create_stop_market_order(
        &self,
        request: &StopMarketOrderRequest,
    ) -> CallbackResult<OrderResponse>;

    async fn create_take_profit_market_order(
        &self,
        request: &TakeProfitMarketOrderRequest,
    ) -> CallbackResult<OrderResponse>;

    async fn close_position(
        &self,
        request: &ClosePositionRequest,
    ) -> CallbackResult<ClosePositionResponse>;

    async fn cancel_all_orders(
        &self,
        request: &CancelAllOrdersRequest,
    ) -> CallbackResult<CancelAllOrdersResponse>;

    async fn cancel_order(&self, request: &CancelOrderRequest) -> CallbackResult<OrderResponse>;

    // --- Account settings ---

    async fn set_leverage(&self, request: &SetLeverageRequest) -> CallbackResult<GenericResponse>;

    async fn set_margin_mode(
        &self,
        request: &SetMarginModeRequest,
    ) -> CallbackResult<GenericResponse>;
}

/// Strategy discovery and signal production
#[async_trait]
pub trait StrategyCallbacks: Send + Sync {
    async fn get_strategy_params(&self) -> CallbackResult<Vec<StrategyParams>>;

    async fn run_backtest(
        &self,
        params: &StrategyParams,
        ohlcv: &[OhlcvBar],
    ) -> CallbackResult<BacktestFrame>;

    /// Parse the bar at `index` (`-1` latest, `-2` previous) into trading intents
    async fn parse_signal(
        &self,
        frame: &BacktestFrame,
        params: &StrategyParams,
        index: isize,
    ) -> CallbackResult<SignalState>;
}

/// Full callback surface consumed by the bot
pub trait Callbacks: ExchangeCallbacks + StrategyCallbacks {}

impl<T: ExchangeCallbacks + StrategyCallbacks + ?Sized> Callbacks for T {}

/// Pairs an exchange implementation with a separate strategy source
pub struct CompositeCallbacks<E, S> {
    exchange: E,
    strategy: S,
}

impl<E, S> CompositeCallbacks<E, S> {
    pub fn new(exchange: E, strategy: S) -> Self {
        Self { exchange, strategy }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

#[async_trait]
impl<E, S> StrategyCallbacks for CompositeCallbacks<E, S>
where
    E: Send + Sync,
    S: StrategyCallbacks,
{
    async fn get_strategy_params(&self) -> CallbackResult<Vec<StrategyParams>> {
        self.strategy.get_strategy_params().await
    }

    async fn run_backtest(
        &self,
        params: &StrategyParams,
        ohlcv: &[OhlcvBar],
    ) -> CallbackResult<BacktestFrame> {
        self.strategy.run_backtest(params, ohlcv).await
    }

    async fn parse_signal(
        &self,
        frame: &BacktestFrame,
        params: &StrategyParams,
        index: isize,
    ) -> CallbackResult<SignalState> {
        self.strategy.parse_signal(frame, params, index).await
    }
}

#[async_trait]
impl<E, S> ExchangeCallbacks for CompositeCallbacks<E, S>
where
    E: ExchangeCallbacks,
    S: Send + Sync,
{
    async fn fetch_balance(&self, ctx: &ExchangeContext) -> CallbackResult<BalanceResponse> {
        self.exchange.fetch_balance(ctx).await
    }

    async fn fetch_tickers(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&str>,
    ) -> CallbackResult<TickersResponse> {
        self.exchange.fetch_tickers(ctx, symbols).await
    }

    async fn fetch_ohlcv(&self, request: &OhlcvRequest) -> CallbackResult<Vec<OhlcvBar>> {
        self.exchange.fetch_ohlcv(request).await
    }

    async fn fetch_market_info(
        &self,
        ctx: &ExchangeContext,
        symbol: &str,
    ) -> CallbackResult<MarketInfo> {
        self.exchange.fetch_market_info(ctx, symbol).await
    }

    async fn fetch_positions(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&[String]>,
    ) -> CallbackResult<PositionsResponse> {
        self.exchange.fetch_positions(ctx, symbols).await
    }

    async fn fetch_open_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.exchange.fetch_open_orders(query).await
    }

    async fn fetch_closed_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.exchange.fetch_closed_orders(query).await
    }

    async fn fetch_my_trades(&self, query: &OrderQuery) -> CallbackResult<TradesResponse> {
        self.exchange.fetch_my_trades(query).await
    }

    async fn create_limit_order(
        &self,
        request: &LimitOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.exchange.create_limit_order(request).await
    }

    async fn create_market_order(
        &self,
        request: &MarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.exchange.create_market_order(request).await
    }

    async fn create_stop_market_order(
        &self,
        request: &StopMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.exchange.create_stop_market_order(request).await
    }

    async fn create_take_profit_market_order(
        &self,
        request: &TakeProfitMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.exchange.create_take_profit_market_order(request).await
    }

    async fn close_position(
        &self,
        request: &ClosePositionRequest,
    ) -> CallbackResult<ClosePositionResponse> {
        self.exchange.close_position(request).await
    }

    async fn cancel_all_orders(
        &self,
        request: &CancelAllOrdersRequest,
    ) -> CallbackResult<CancelAllOrdersResponse> {
        self.exchange.cancel_all_orders(request).await
    }

    async fn cancel_order(&self, request: &CancelOrderRequest) -> CallbackResult<OrderResponse> {
        self.exchange.cancel_order(request).await
    }

    async fn set_leverage(&self, request: &SetLeverageRequest) -> CallbackResult<GenericResponse> {
        self.exchange.set_leverage(request).await
    }

    async fn set_margin_mode(
        &self,
        request: &SetMarginModeRequest,
    ) -> CallbackResult<GenericResponse> {
        self.exchange.set_margin_mode(request).await
    }
}
