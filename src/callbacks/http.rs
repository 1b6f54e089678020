use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{ExchangeCallbacks, StrategyCallbacks};
use crate::config::GatewayConfig;
use crate::error::{BotError, CallbackEnvelope, CallbackError, CallbackResult};
use crate::models::*;
use crate::strategy::{BacktestFrame, OhlcvBar, SignalState, StrategyParams};

type GatewayRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Callbacks served by an HTTP gateway that speaks the `{success, data, message}` envelope.
///
/// Cloneable; clones share the rate limiter and connection pool.
#[derive(Clone)]
pub struct HttpCallbacks {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_backoff: Duration,
    rate_limiter: Arc<GatewayRateLimiter>,
}

#[derive(Serialize)]
struct TickersQuery<'a> {
    #[serde(flatten)]
    context: &'a ExchangeContext,
    symbols: Option<&'a str>,
}

#[derive(Serialize)]
struct MarketInfoQuery<'a> {
    #[serde(flatten)]
    context: &'a ExchangeContext,
    symbol: &'a str,
}

#[derive(Serialize)]
struct PositionsQuery<'a> {
    #[serde(flatten)]
    context: &'a ExchangeContext,
    symbols: Option<String>,
}

#[derive(Serialize)]
struct BacktestBody<'a> {
    params: &'a StrategyParams,
    ohlcv: &'a [OhlcvBar],
}

#[derive(Serialize)]
struct SignalBody<'a> {
    frame: &'a BacktestFrame,
    params: &'a StrategyParams,
    index: isize,
}

impl HttpCallbacks {
    pub fn new(config: &GatewayConfig) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BotError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            rate_limiter,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff * 2u32.saturating_pow(attempt - 1)
    }

    /// Rate-limited request with retry on 429, 5xx and transport errors.
    /// GET sends `payload` as a query string, everything else as a JSON body.
    async fn call<P, T>(
        &self,
        method: Method,
        path: &str,
        payload: &P,
    ) -> CallbackResult<CallbackEnvelope<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            self.rate_limiter.until_ready().await;

            let request = self.client.request(method.clone(), &url);
            let request = if method == Method::GET {
                request.query(payload)
            } else {
                request.json(payload)
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<CallbackEnvelope<T>>().await.map_err(|e| {
                            CallbackError::new(format!("Invalid response from {}: {}", path, e))
                        });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("HTTP {} from {}", status, path);
                        if attempt < self.max_retries {
                            let backoff = self.backoff(attempt);
                            tracing::warn!(
                                path,
                                status = status.as_u16(),
                                "Gateway returned {}, retrying in {:?} (attempt {}/{})",
                                status,
                                backoff,
                                attempt,
                                self.max_retries
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        continue;
                    }

                    // Other 4xx: no retry. Prefer the envelope message when the body has one.
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let message = serde_json::from_str::<CallbackEnvelope<serde_json::Value>>(&body)
                        .ok()
                        .and_then(|envelope| envelope.message)
                        .unwrap_or(body);
                    return Err(CallbackError::new(format!(
                        "Gateway error ({}) on {}: {}",
                        status, path, message
                    )));
                }
                Err(e) => {
                    last_error = format!("Network error on {}: {}", path, e);
                    if attempt < self.max_retries {
                        let backoff = self.backoff(attempt);
                        tracing::warn!(
                            path,
                            "Network error: {}, retrying in {:?} (attempt {}/{})",
                            e,
                            backoff,
                            attempt,
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(CallbackError::new(format!(
            "{} (gave up after {} attempts)",
            last_error, self.max_retries
        )))
    }

    async fn get<P, T>(&self, path: &str, query: &P) -> CallbackResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::GET, path, query).await?.into_result()
    }

    async fn post<P, T>(&self, path: &str, body: &P) -> CallbackResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::POST, path, body).await?.into_result()
    }

    /// POST where a successful response may omit `data`
    async fn post_or_default<P, T>(&self, path: &str, body: &P) -> CallbackResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        self.call(Method::POST, path, body)
            .await?
            .into_result_or_default()
    }
}

#[async_trait]
impl ExchangeCallbacks for HttpCallbacks {
    async fn fetch_balance(&self, ctx: &ExchangeContext) -> CallbackResult<BalanceResponse> {
        self.get("/balance", ctx).await
    }

    async fn fetch_tickers(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&str>,
    ) -> CallbackResult<TickersResponse> {
        let query = TickersQuery {
            context: ctx,
            symbols,
        };
        self.get("/tickers", &query).await
    }

    async fn fetch_ohlcv(&self, request: &OhlcvRequest) -> CallbackResult<Vec<OhlcvBar>> {
        self.get("/ohlcv", request).await
    }

    async fn fetch_market_info(
        &self,
        ctx: &ExchangeContext,
        symbol: &str,
    ) -> CallbackResult<MarketInfo> {
        let query = MarketInfoQuery {
            context: ctx,
            symbol,
        };
        self.get("/market_info", &query).await
    }

    async fn fetch_positions(
        &self,
        ctx: &ExchangeContext,
        symbols: Option<&[String]>,
    ) -> CallbackResult<PositionsResponse> {
        let query = PositionsQuery {
            context: ctx,
            symbols: symbols.map(|s| s.join(",")),
        };
        self.get("/positions", &query).await
    }

    async fn fetch_open_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.get("/open_orders", query).await
    }

    async fn fetch_closed_orders(&self, query: &OrderQuery) -> CallbackResult<OrdersResponse> {
        self.get("/closed_orders", query).await
    }

    async fn fetch_my_trades(&self, query: &OrderQuery) -> CallbackResult<TradesResponse> {
        self.get("/my_trades", query).await
    }

    async fn create_limit_order(
        &self,
        request: &LimitOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.post("/order/limit", request).await
    }

    async fn create_market_order(
        &self,
        request: &MarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.post("/order/market", request).await
    }

    async fn create_stop_market_order(
        &self,
        request: &StopMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.post("/order/stop_market", request).await
    }

    async fn create_take_profit_market_order(
        &self,
        request: &TakeProfitMarketOrderRequest,
    ) -> CallbackResult<OrderResponse> {
        self.post("/order/take_profit_market", request).await
    }

    async fn close_position(
        &self,
        request: &ClosePositionRequest,
    ) -> CallbackResult<ClosePositionResponse> {
        self.post_or_default("/position/close", request).await
    }

    async fn cancel_all_orders(
        &self,
        request: &CancelAllOrdersRequest,
    ) -> CallbackResult<CancelAllOrdersResponse> {
        self.post_or_default("/orders/cancel_all", request).await
    }

    async fn cancel_order(&self, request: &CancelOrderRequest) -> CallbackResult<OrderResponse> {
        self.post("/order/cancel", request).await
    }

    async fn set_leverage(&self, request: &SetLeverageRequest) -> CallbackResult<GenericResponse> {
        self.post_or_default("/account/leverage", request).await
    }

    async fn set_margin_mode(
        &self,
        request: &SetMarginModeRequest,
    ) -> CallbackResult<GenericResponse> {
        self.post_or_default("/account/margin_mode", request).await
    }
}

#[async_trait]
impl StrategyCallbacks for HttpCallbacks {
    async fn get_strategy_params(&self) -> CallbackResult<Vec<StrategyParams>> {
        self.get("/strategy/params", &()).await
    }

    async fn run_backtest(
        &self,
        params: &StrategyParams,
        ohlcv: &[OhlcvBar],
    ) -> CallbackResult<BacktestFrame> {
        self.post("/strategy/backtest", &BacktestBody { params, ohlcv })
            .await
    }

    async fn parse_signal(
        &self,
        frame: &BacktestFrame,
        params: &StrategyParams,
        index: isize,
    ) -> CallbackResult<SignalState> {
        let body = SignalBody {
            frame,
            params,
            index,
        };
        self.post("/strategy/signal", &body).await
    }
}
