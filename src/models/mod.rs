use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Enums shared by requests and snapshots
// ============================================================================

/// Exchange-side order direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Position direction as produced by the signal engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side used to open a position in this direction
    pub fn entry_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Side used to reduce or close a position in this direction
    pub fn exit_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    #[default]
    Future,
    Spot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Sandbox,
    Live,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// Which account a call targets. Sent with every exchange request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeContext {
    pub exchange_name: String,
    pub market: Market,
    pub mode: Mode,
}

// ============================================================================
// Snapshots returned by the exchange
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceStructure {
    pub free: HashMap<String, f64>,
    #[serde(default)]
    pub used: HashMap<String, f64>,
    #[serde(default)]
    pub total: HashMap<String, f64>,
    pub timestamp: Option<i64>,
}

impl BalanceStructure {
    /// Free balance for a currency, zero when absent
    pub fn free_for(&self, currency: &str) -> f64 {
        self.free.get(currency).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStructure {
    pub id: String,
    pub client_order_id: Option<String>,
    pub timestamp: Option<i64>,
    pub status: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: OrderSide,
    pub price: Option<f64>,
    pub amount: Option<f64>,
    pub filled: Option<f64>,
    pub remaining: Option<f64>,
    pub average: Option<f64>,
    pub trigger_price: Option<f64>,
    pub reduce_only: Option<bool>,
    pub post_only: Option<bool>,
    pub time_in_force: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStructure {
    pub symbol: String,
    pub timestamp: Option<i64>,
    pub contracts: Option<f64>,
    pub contract_size: Option<f64>,
    pub side: Option<PositionSide>,
    pub notional: Option<f64>,
    pub leverage: Option<f64>,
    pub entry_price: Option<f64>,
    pub mark_price: Option<f64>,
    pub liquidation_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub margin_mode: Option<String>,
}

impl PositionStructure {
    /// An open position for `symbol` holds a positive contract count
    pub fn is_open_for(&self, symbol: &str) -> bool {
        self.symbol == symbol && self.contracts.is_some_and(|c| c > 0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerInfo {
    pub symbol: String,
    pub timestamp: Option<i64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub last: Option<f64>,
    pub base_volume: Option<f64>,
    pub quote_volume: Option<f64>,
}

impl TickerInfo {
    /// Last traded price, falling back to close
    pub fn reference_price(&self) -> Option<f64> {
        self.last.or(self.close)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStructure {
    pub id: String,
    pub timestamp: Option<i64>,
    pub symbol: String,
    pub order: Option<String>,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub cost: f64,
}

/// Market metadata. `precision_amount` is always a step size, never a count of decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    #[serde(default)]
    pub linear: bool,
    #[serde(default)]
    pub settle: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub precision_amount: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_amount: f64,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
}

fn default_contract_size() -> f64 {
    1.0
}

fn default_leverage() -> u32 {
    1
}

/// Accept numbers, numeric strings and null. Anything else becomes NaN so that
/// the sizing checks can reject it instead of failing the whole response.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        serde_json::Value::Null => 0.0,
        _ => f64::NAN,
    })
}

// ============================================================================
// Response wrappers
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: BalanceStructure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickersResponse {
    pub tickers: HashMap<String, TickerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order: Option<OrderStructure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<OrderStructure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionsResponse {
    pub positions: Vec<PositionStructure>,
}

impl PositionsResponse {
    pub fn open_position(&self, symbol: &str) -> Option<&PositionStructure> {
        self.positions.iter().find(|p| p.is_open_for(symbol))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosePositionResponse {
    pub remaining_positions: Vec<PositionStructure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAllOrdersResponse {
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradesResponse {
    pub trades: Vec<TradeStructure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericResponse {
    pub result: serde_json::Value,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub price: f64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: Option<String>,
    #[serde(rename = "timeInForce")]
    pub time_in_force: Option<String>,
    #[serde(rename = "postOnly", default)]
    pub post_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: Option<String>,
}

/// Body shared by stop-market and take-profit-market orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerOrderRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    #[serde(rename = "reduceOnly", default = "default_reduce_only")]
    pub reduce_only: bool,
    #[serde(rename = "triggerPrice")]
    pub trigger_price: Option<f64>,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: Option<String>,
    #[serde(rename = "timeInForce")]
    pub time_in_force: Option<String>,
}

fn default_reduce_only() -> bool {
    true
}

pub type StopMarketOrderRequest = TriggerOrderRequest;
pub type TakeProfitMarketOrderRequest = TriggerOrderRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePositionRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: String,
    pub side: Option<PositionSide>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAllOrdersRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub id: String,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLeverageRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub leverage: u32,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMarginModeRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    #[serde(rename = "marginMode")]
    pub margin_mode: MarginMode,
    pub symbol: Option<String>,
}

/// Query for order and trade history endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderQuery {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: Option<String>,
    pub since: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcvRequest {
    #[serde(flatten)]
    pub context: ExchangeContext,
    pub symbol: String,
    pub timeframe: String,
    pub since: Option<i64>,
    pub limit: Option<u32>,
    pub enable_cache: bool,
    pub enable_test: bool,
}
